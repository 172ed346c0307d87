//! Agent invocation: argument list, subprocess launch and exit classification

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;

use tokio::process::Command;

use crate::util::{self, KEY_FLAG};

/// Entity type reported for every heartbeat
pub const ENTITY_TYPE: &str = "app";

/// Category reported for every heartbeat
pub const CATEGORY: &str = "designing";

/// What the coordinator asks the agent to report
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeartbeatRequest {
    /// Document title reported as the entity
    pub entity: String,

    /// Enclosing project, omitted when empty
    pub project: Option<String>,

    /// Whether the triggering event was a save
    pub is_write: bool,
}

/// Classified exit of the agent process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationOutcome {
    /// 0: heartbeat accepted
    Success,
    /// 102: upstream API error
    ApiError,
    /// 103: local config could not be parsed
    ConfigError,
    /// 104: invalid credential
    AuthError,
    /// anything else; `None` when the process was killed by a signal
    Unknown(Option<i32>),
}

impl InvocationOutcome {
    pub fn from_exit_code(code: i32) -> Self {
        match code {
            0 => InvocationOutcome::Success,
            102 => InvocationOutcome::ApiError,
            103 => InvocationOutcome::ConfigError,
            104 => InvocationOutcome::AuthError,
            other => InvocationOutcome::Unknown(Some(other)),
        }
    }

    pub fn from_status(code: Option<i32>) -> Self {
        match code {
            Some(code) => Self::from_exit_code(code),
            None => InvocationOutcome::Unknown(None),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, InvocationOutcome::Success)
    }
}

/// Build the ordered agent argument list.
///
/// Entity, plugin, entity type and category are always present; key,
/// project and `--write` only when they apply.
pub fn build_args(request: &HeartbeatRequest, api_key: &str, user_agent: &str) -> Vec<String> {
    let mut args = vec![
        "--entity".to_string(),
        util::quote(&request.entity),
        "--plugin".to_string(),
        util::quote(user_agent),
        "--entity-type".to_string(),
        ENTITY_TYPE.to_string(),
        "--category".to_string(),
        CATEGORY.to_string(),
    ];

    if !api_key.is_empty() {
        args.push(KEY_FLAG.to_string());
        args.push(util::quote(api_key));
    }

    if let Some(project) = request.project.as_deref().filter(|p| !p.is_empty()) {
        args.push("--project".to_string());
        args.push(util::quote(project));
    }

    if request.is_write {
        args.push("--write".to_string());
    }

    args
}

/// A prepared agent launch
#[derive(Debug, Clone)]
pub struct Invocation {
    pub binary: PathBuf,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
    pub entity: String,
}

/// How a launch ended
#[derive(Debug, Clone)]
pub enum InvocationReport {
    /// The process ran to completion
    Exited {
        entity: String,
        code: Option<i32>,
        stdout: String,
        stderr: String,
    },
    /// The process could not be started
    LaunchFailed { entity: String, error: String },
}

impl Invocation {
    /// Command line for the debug log, key masked
    pub fn command_line(&self) -> String {
        util::format_command_line(&self.binary.to_string_lossy(), &self.args)
    }

    /// Run the agent to completion, capturing its output
    pub async fn run(self) -> InvocationReport {
        let output = Command::new(&self.binary)
            .args(&self.args)
            .envs(&self.env)
            .stdin(Stdio::null())
            .output()
            .await;

        match output {
            Ok(output) => InvocationReport::Exited {
                entity: self.entity,
                code: output.status.code(),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            },
            Err(e) => {
                let error = format!("{}: {}", self.command_line(), e);
                InvocationReport::LaunchFailed {
                    entity: self.entity,
                    error,
                }
            }
        }
    }
}
