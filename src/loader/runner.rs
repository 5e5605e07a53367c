//! Child-process execution of units and the pipe protocol.
//!
//! A unit runs as `command... <source>` (empty command executes the file
//! directly, so the shebang decides the interpreter). The mode and
//! identity travel in the environment:
//!
//! | variable        | meaning                                   |
//! |-----------------|-------------------------------------------|
//! | `PREVUE_MODE`   | `load` or `render`                        |
//! | `PREVUE_MODULE` | dotted namespace name of the unit         |
//! | `PREVUE_SOURCE` | absolute path of the unit                 |
//! | `PREVUE_KEY`    | artifact key being rendered (render mode) |
//!
//! The child answers on stdout, one JSON record per line:
//!
//! ```text
//! {"register": {"symbol": "x", "name": "wide", "group": "cards"}}
//! {"bind": "proj.helpers"}
//! {"layout": [["Hello"], ["World"]]}
//! ```
//!
//! Lines that do not parse as records are ignored, so units may print
//! freely. A non-zero exit is a unit failure; stderr rides along in the
//! diagnostic.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use serde::Deserialize;

use crate::registry::{Layout, LayoutProducer, RenderError, WindowOptions};

use super::error::LoadError;

pub const ENV_MODE: &str = "PREVUE_MODE";
pub const ENV_MODULE: &str = "PREVUE_MODULE";
pub const ENV_SOURCE: &str = "PREVUE_SOURCE";
pub const ENV_KEY: &str = "PREVUE_KEY";

/// One `register` record from a unit.
#[derive(Debug, Clone, Deserialize)]
pub struct Registration {
    /// Name of the declaring symbol; qualified by the unit's namespace.
    pub symbol: String,
    /// Optional user-supplied disambiguator, appended as `:name`.
    #[serde(default)]
    pub name: Option<String>,
    /// Optional group the artifact belongs to.
    #[serde(default)]
    pub group: Option<String>,
    /// Optional window options for the consumer.
    #[serde(default)]
    pub window: Option<WindowOptions>,
}

/// Everything a unit reported while loading.
#[derive(Debug, Default)]
pub struct LoadOutcome {
    pub registrations: Vec<Registration>,
    /// Dotted names the unit brought in transitively.
    pub bindings: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct Record {
    #[serde(default)]
    register: Option<Registration>,
    #[serde(default)]
    bind: Option<String>,
    #[serde(default)]
    layout: Option<serde_json::Value>,
}

/// Executes units in short-lived child processes.
#[derive(Debug, Clone)]
pub struct UnitRunner {
    command: Vec<String>,
}

impl UnitRunner {
    /// `command` is the interpreter argv; empty means direct execution.
    pub fn new(command: Vec<String>) -> Self {
        Self { command }
    }

    fn command_for(&self, source: &Path, module: &str, mode: &str) -> Command {
        let mut cmd = match self.command.split_first() {
            Some((program, rest)) => {
                let mut cmd = Command::new(program);
                cmd.args(rest);
                cmd.arg(source);
                cmd
            }
            None => Command::new(source),
        };
        if let Some(dir) = source.parent() {
            cmd.current_dir(dir);
        }
        cmd.env(ENV_MODE, mode)
            .env(ENV_MODULE, module)
            .env(ENV_SOURCE, source)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        cmd
    }

    fn records(stdout: &[u8]) -> Vec<Record> {
        let mut records = Vec::new();
        for line in String::from_utf8_lossy(stdout).lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<Record>(line) {
                Ok(record) => records.push(record),
                Err(_) => {
                    crate::debug_event!("runner", "ignored output line", "{line}");
                }
            }
        }
        records
    }

    /// Execute a unit's top-level code once and collect what it reports.
    pub fn execute_load(&self, source: &Path, module: &str) -> Result<LoadOutcome, LoadError> {
        let output = self
            .command_for(source, module, "load")
            .output()
            .map_err(|source_err| LoadError::Spawn {
                path: source.to_path_buf(),
                source: source_err,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(LoadError::Execution {
                unit: module.to_string(),
                reason: if stderr.is_empty() {
                    format!("exit status {}", output.status)
                } else {
                    stderr
                },
            });
        }

        let mut outcome = LoadOutcome::default();
        for record in Self::records(&output.stdout) {
            if let Some(registration) = record.register {
                outcome.registrations.push(registration);
            }
            if let Some(name) = record.bind {
                outcome.bindings.push(name);
            }
        }
        Ok(outcome)
    }

    /// Re-execute a unit to render one artifact.
    pub fn render(&self, source: &Path, module: &str, key: &str) -> Result<Layout, RenderError> {
        let output = self
            .command_for(source, module, "render")
            .env(ENV_KEY, key)
            .output()
            .map_err(|source_err| RenderError::Spawn {
                key: key.to_string(),
                source: source_err,
            })?;

        if !output.status.success() {
            return Err(RenderError::Failed {
                key: key.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        // Last layout record wins
        Self::records(&output.stdout)
            .into_iter()
            .rev()
            .find_map(|r| r.layout)
            .map(Layout)
            .ok_or_else(|| RenderError::NoLayout {
                key: key.to_string(),
            })
    }
}

/// The registry-facing producer: re-invokes the owning unit on demand.
#[derive(Debug, Clone)]
pub struct RunnerProducer {
    runner: UnitRunner,
    source: PathBuf,
    module: String,
    key: String,
}

impl RunnerProducer {
    pub fn new(runner: UnitRunner, source: PathBuf, module: String, key: String) -> Self {
        Self {
            runner,
            source,
            module,
            key,
        }
    }
}

impl LayoutProducer for RunnerProducer {
    fn produce(&self) -> Result<Layout, RenderError> {
        self.runner.render(&self.source, &self.module, &self.key)
    }
}
