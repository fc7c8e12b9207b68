//! Invocación del cliente nativo de la base de datos.
//!
//! El engine arma el argv y el entorno acotado (credenciales); el runner sólo
//! lanza el proceso y espera. Las variables de `env` se pasan al hijo y nunca
//! tocan el entorno del proceso actual.
use std::io::{Read, Write};
use std::process::{Command, Stdio};

use log::debug;

use crate::errors::EngineError;

/// Resultado de una invocación (stdout/stderr capturados).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutput {
    pub stdout: String,
    pub stderr: String,
    /// `None` si el proceso terminó por señal.
    pub status: Option<i32>,
}

impl RunOutput {
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }

    /// Convierte una salida no exitosa en `EngineError::Client`.
    pub fn into_result(self, client: &str) -> Result<RunOutput, EngineError> {
        if self.success() {
            Ok(self)
        } else {
            Err(EngineError::Client { client: client.to_string(),
                                      status: self.status.unwrap_or(-1),
                                      stderr: self.stderr.trim_end().to_string() })
        }
    }
}

/// Contrato del colaborador que ejecuta procesos.
pub trait ProcessRunner {
    /// Ejecuta `argv[0]` con el resto como argumentos. `env` se agrega sólo al
    /// entorno del hijo; `stdin`, si existe, se vuelca completo a su entrada.
    fn run(&self, argv: &[String], env: &[(String, String)], stdin: Option<&mut dyn Read>) -> Result<RunOutput, EngineError>;
}

/// Runner real sobre `std::process::Command` (bloqueante).
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl ProcessRunner for SystemRunner {
    fn run(&self, argv: &[String], env: &[(String, String)], stdin: Option<&mut dyn Read>) -> Result<RunOutput, EngineError> {
        let (program, args) = argv.split_first()
                                  .ok_or_else(|| EngineError::Config("empty client command".into()))?;
        let env_keys: Vec<&str> = env.iter().map(|(k, _)| k.as_str()).collect();
        debug!("run:start argv={argv:?} env_keys={env_keys:?}");

        let mut cmd = Command::new(program);
        cmd.args(args)
           .stdout(Stdio::piped())
           .stderr(Stdio::piped())
           .stdin(if stdin.is_some() { Stdio::piped() } else { Stdio::null() });
        for (key, value) in env {
            cmd.env(key, value);
        }

        // El input se lee completo antes de lanzar el proceso; la escritura va
        // en otro hilo para no bloquear mientras el hijo llena stdout.
        let input = match stdin {
            Some(reader) => {
                let mut buf = Vec::new();
                reader.read_to_end(&mut buf)
                      .map_err(|e| EngineError::io("cannot read script input", e))?;
                Some(buf)
            }
            None => None,
        };

        let mut child = cmd.spawn()
                           .map_err(|e| EngineError::io(format!("cannot execute {program}"), e))?;
        let writer = match (input, child.stdin.take()) {
            (Some(buf), Some(mut pipe)) => Some(std::thread::spawn(move || pipe.write_all(&buf))),
            _ => None,
        };
        let output = child.wait_with_output()
                          .map_err(|e| EngineError::io(format!("error waiting for {program}"), e))?;
        if let Some(handle) = writer {
            // Un hijo que cierra stdin antes de tiempo (BrokenPipe) se refleja
            // en su estado de salida; no es un error propio.
            let _ = handle.join();
        }

        let out = RunOutput { stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                              stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                              status: output.status.code() };
        debug!("run:done program={program} status={:?}", out.status);
        Ok(out)
    }
}
