//! Modelo mínimo del plan: steps, tags y su orden.
//!
//! El parseo del archivo de plan vive fuera de este crate; aquí sólo están los
//! nodos inmutables que el engine consume (id, nombre, requires/conflicts).
use sha2::{Digest, Sha256};

use crate::constants::TAG_MARKER;

/// Cambio desplegable con su metadata de dependencias.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub id: String,
    pub name: String,
    pub requires: Vec<String>,
    pub conflicts: Vec<String>,
    /// Tag bajo el cual quedó el step en el plan (si alguno).
    pub tag: Option<String>,
}

impl Step {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_dependencies(name, Vec::new(), Vec::new())
    }

    pub fn with_dependencies(name: impl Into<String>, requires: Vec<String>, conflicts: Vec<String>) -> Self {
        let name = name.into();
        let id = step_id(&name, &requires, &conflicts);
        Self { id, name, requires, conflicts, tag: None }
    }

    pub fn under_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }
}

/// Marcador de release; referencia el último step desplegado bajo él.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    pub id: String,
    pub name: String,
    pub step_id: String,
    pub step_name: String,
}

impl Tag {
    pub fn new(name: impl Into<String>, step: &Step) -> Self {
        let name = name.into();
        let name = name.trim_start_matches(TAG_MARKER).to_string();
        let id = tag_id(&name, &step.id);
        Self { id, name, step_id: step.id.clone(), step_name: step.name.clone() }
    }

    /// Nombre de visualización (`@name`).
    pub fn formatted_name(&self) -> String {
        format!("{TAG_MARKER}{}", self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanNode {
    Step(Step),
    Tag(Tag),
}

impl PlanNode {
    pub fn id(&self) -> &str {
        match self {
            Self::Step(s) => &s.id,
            Self::Tag(t) => &t.id,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Step(s) => &s.name,
            Self::Tag(t) => &t.name,
        }
    }
}

/// Secuencia ordenada de nodos, en el orden de despliegue.
#[derive(Debug, Clone, Default)]
pub struct Plan {
    nodes: Vec<PlanNode>,
}

impl Plan {
    pub fn new(nodes: Vec<PlanNode>) -> Self {
        Self { nodes }
    }

    pub fn node_at(&self, position: usize) -> Option<&PlanNode> {
        self.nodes.get(position)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PlanNode> {
        self.nodes.iter()
    }

    pub fn step_named(&self, name: &str) -> Option<&Step> {
        self.nodes.iter().find_map(|n| match n {
                              PlanNode::Step(s) if s.name == name => Some(s),
                              _ => None,
                          })
    }
}

// Id derivado del contenido: mismo nombre y dependencias => mismo id.
fn step_id(name: &str, requires: &[String], conflicts: &[String]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(b"step ");
    hasher.update(name.as_bytes());
    for r in requires {
        hasher.update(b"\nrequires ");
        hasher.update(r.as_bytes());
    }
    for c in conflicts {
        hasher.update(b"\nconflicts ");
        hasher.update(c.as_bytes());
    }
    format!("{:x}", hasher.finalize())
}

fn tag_id(name: &str, step_id: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(b"tag ");
    hasher.update(name.as_bytes());
    hasher.update(b"\nstep ");
    hasher.update(step_id.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_id_is_stable_and_content_derived() {
        let a = Step::with_dependencies("users", vec!["roles".into()], vec![]);
        let b = Step::with_dependencies("users", vec!["roles".into()], vec![]);
        let c = Step::new("users");
        assert_eq!(a.id, b.id);
        assert_ne!(a.id, c.id);
        assert_eq!(a.id.len(), 64);
    }

    #[test]
    fn tag_formats_with_marker_and_references_step() {
        let step = Step::new("users");
        let tag = Tag::new("@alpha", &step);
        assert_eq!(tag.name, "alpha");
        assert_eq!(tag.formatted_name(), "@alpha");
        assert_eq!(tag.step_id, step.id);
        assert_eq!(Tag::new("alpha", &step).id, tag.id);
    }

    #[test]
    fn plan_lookup_by_position_and_name() {
        let users = Step::new("users");
        let widgets = Step::new("widgets");
        let alpha = Tag::new("alpha", &widgets);
        let plan = Plan::new(vec![PlanNode::Step(users.clone()),
                                  PlanNode::Step(widgets.clone()),
                                  PlanNode::Tag(alpha.clone())]);
        assert_eq!(plan.len(), 3);
        assert_eq!(plan.node_at(2).map(|n| n.name()), Some("alpha"));
        assert!(plan.node_at(3).is_none());
        assert_eq!(plan.step_named("widgets"), Some(&widgets));
        assert!(plan.step_named("alpha").is_none());
    }
}
