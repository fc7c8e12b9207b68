use std::collections::HashMap;
use std::path::{Path, PathBuf};

use log::debug;
use serde::{Deserialize, Serialize};
use sqitch_core::{AppOptions, ConnectionOptions, DeployedStepRecord, DeployedTagRecord, Engine, EngineError, EventRecord};
use sqitch_pg::PgEngine;

const USAGE: &str = "Uso: sqitch-cli <init|status|target|deploy-file <PATH>> \
                     [--conf <FILE>] [--client <BIN>] [--username <U>] [--db-name <DB>] \
                     [--host <H>] [--port <P>] [--schema <S>] [--actor <NAME>] [--json]";

/// Archivo de configuración leído si existe (`core.pg.host=...`).
const DEFAULT_CONF: &str = "sqitch.conf";

#[derive(Debug, Default)]
struct Args {
    command: String,
    path: Option<PathBuf>,
    conf: Option<PathBuf>,
    explicit: ConnectionOptions,
    actor: Option<String>,
    json: bool,
}

/// Salida de `status --json`.
#[derive(Debug, Serialize, Deserialize)]
struct StatusReport {
    destination: Option<String>,
    latest_item: Option<String>,
    latest_step: Option<DeployedStepRecord>,
    latest_tag: Option<DeployedTagRecord>,
    events: Vec<EventRecord>,
}

impl StatusReport {
    fn collect(engine: &mut dyn Engine) -> Result<Self, EngineError> {
        Ok(Self { destination: engine.destination(),
                  latest_item: engine.latest_item()?,
                  latest_step: engine.latest_step_record()?,
                  latest_tag: engine.latest_tag_record()?,
                  events: engine.events()? })
    }
}

fn parse_args(args: &[String]) -> Option<Args> {
    let mut parsed = Args { command: args.first()?.clone(), ..Default::default() };
    let mut i = 1;
    while i < args.len() {
        if args[i] == "--json" {
            parsed.json = true;
            i += 1;
            continue;
        }
        let value = args.get(i + 1).cloned();
        match args[i].as_str() {
            "--conf" => parsed.conf = value.map(PathBuf::from),
            "--client" => parsed.explicit.client = value,
            "--username" => parsed.explicit.username = value,
            "--db-name" => parsed.explicit.db_name = value,
            "--host" => parsed.explicit.host = value,
            "--port" => parsed.explicit.port = value,
            "--schema" => parsed.explicit.sqitch_schema = value,
            "--actor" => parsed.actor = value,
            other if parsed.path.is_none() && !other.starts_with("--") => {
                parsed.path = Some(PathBuf::from(other));
                i += 1;
                continue;
            }
            _ => {}
        }
        i += 2;
    }
    Some(parsed)
}

/// Lee pares `clave=valor` con el parser de dotenvy; sin archivo, mapa vacío.
fn load_conf(path: &Path, required: bool) -> Result<HashMap<String, String>, EngineError> {
    if !required && !path.exists() {
        return Ok(HashMap::new());
    }
    let iter = dotenvy::from_filename_iter(path).map_err(|e| EngineError::Config(format!("{}: {e}", path.display())))?;
    let mut map = HashMap::new();
    for item in iter {
        let (key, value) = item.map_err(|e| EngineError::Config(format!("{}: {e}", path.display())))?;
        map.insert(key, value);
    }
    debug!("conf:loaded path={} keys={}", path.display(), map.len());
    Ok(map)
}

fn run(args: Args) -> Result<i32, EngineError> {
    let file = match &args.conf {
        Some(path) => load_conf(path, true)?,
        None => load_conf(Path::new(DEFAULT_CONF), false)?,
    };
    // Sin flag de password: sólo llega por `core.pg.password`.
    let app = AppOptions { actor: args.actor, ..Default::default() };
    let mut engine = PgEngine::from_layers(&args.explicit, &file, &app)?;

    match args.command.as_str() {
        "init" => {
            engine.initialize()?;
            println!("initialized {} in schema {}", describe(&engine), engine.config().sqitch_schema());
        }
        "status" => {
            if !engine.initialized()? {
                eprintln!("[sqitch status] {} no está inicializado", describe(&engine));
                return Ok(4);
            }
            let report = StatusReport::collect(&mut engine)?;
            if args.json {
                let out = serde_json::to_string_pretty(&report).map_err(|e| EngineError::io("status json", e.into()))?;
                println!("{out}");
                return Ok(0);
            }
            match &report.latest_item {
                Some(item) => println!("latest: {item}"),
                None => println!("latest: (nothing deployed)"),
            }
            for e in &report.events {
                println!("{} {:<7} {} ({})", e.logged_at.to_rfc3339(), e.event.as_str(), e.node, e.logged_by);
            }
        }
        "target" => {
            println!("destination: {}", describe(&engine));
            println!("client: {}", engine.client_command().join(" "));
        }
        "deploy-file" => {
            let Some(path) = args.path else {
                eprintln!("{USAGE}");
                return Ok(2);
            };
            engine.run_file(&path)?;
            println!("ran {}", path.display());
        }
        _ => {
            eprintln!("{USAGE}");
            return Ok(2);
        }
    }
    Ok(0)
}

fn describe(engine: &PgEngine) -> String {
    engine.destination().unwrap_or_else(|| "(default database)".to_string())
}

fn main() {
    sqitch_pg::init_dotenv();
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
                             .with_writer(std::io::stderr)
                             .init();

    let argv: Vec<String> = std::env::args().skip(1).collect();
    let Some(args) = parse_args(&argv) else {
        eprintln!("{USAGE}");
        std::process::exit(2);
    };
    match run(args) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("error [{}]: {e}", e.ident());
            std::process::exit(5);
        }
    }
}
