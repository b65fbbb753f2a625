use std::path::PathBuf;
use std::process::Command;

use camino::Utf8Path;
use serde::Serialize;
use tracing::debug;

use crate::error::GwError;

/// What a remote command printed and how it exited.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            success: true,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failed(stderr: impl Into<String>) -> Self {
        Self {
            success: false,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }
}

/// Remote execution and secure copy against a data server.
pub trait RemoteShell: Send + Sync {
    /// Run `command` on `server`. `Err` only when the command could not be
    /// launched at all; a nonzero exit is reported through `CommandOutput`.
    fn execute(&self, server: &str, command: &str) -> Result<CommandOutput, GwError>;

    /// Copy `remote_path` on `server` to `local_path`.
    fn copy(
        &self,
        server: &str,
        remote_path: &str,
        local_path: &Utf8Path,
    ) -> Result<CommandOutput, GwError>;
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolInfo {
    pub ssh: Option<String>,
    pub scp: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SystemRemoteShell {
    ssh_program: String,
    scp_program: String,
}

impl SystemRemoteShell {
    pub const DEFAULT_SSH: &'static str = "gsissh";
    pub const DEFAULT_SCP: &'static str = "gsiscp";

    pub fn new() -> Self {
        Self::with_programs(Self::DEFAULT_SSH, Self::DEFAULT_SCP)
    }

    pub fn with_programs(ssh_program: impl Into<String>, scp_program: impl Into<String>) -> Self {
        Self {
            ssh_program: ssh_program.into(),
            scp_program: scp_program.into(),
        }
    }

    pub fn tool_info(&self) -> ToolInfo {
        ToolInfo {
            ssh: find_in_path(&self.ssh_program).map(|path| path.display().to_string()),
            scp: find_in_path(&self.scp_program).map(|path| path.display().to_string()),
        }
    }

    fn run_cmd(
        &self,
        server: &str,
        program: &str,
        args: &[String],
    ) -> Result<CommandOutput, GwError> {
        debug!(program, ?args, "running command in subprocess");
        let output = Command::new(program)
            .args(args)
            .output()
            .map_err(|err| GwError::RemoteExec {
                server: server.to_string(),
                message: format!("{program}: {err}"),
            })?;
        let result = CommandOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        };
        debug!(
            retval = ?output.status.code(),
            stdout = %result.stdout.trim(),
            stderr = %result.stderr.trim(),
            "command finished"
        );
        Ok(result)
    }
}

impl Default for SystemRemoteShell {
    fn default() -> Self {
        Self::new()
    }
}

impl RemoteShell for SystemRemoteShell {
    fn execute(&self, server: &str, command: &str) -> Result<CommandOutput, GwError> {
        let args = vec![server.to_string(), command.to_string()];
        self.run_cmd(server, &self.ssh_program, &args)
    }

    fn copy(
        &self,
        server: &str,
        remote_path: &str,
        local_path: &Utf8Path,
    ) -> Result<CommandOutput, GwError> {
        let args = vec![format!("{server}:{remote_path}"), local_path.to_string()];
        self.run_cmd(server, &self.scp_program, &args)
    }
}

/// Quote `value` for a POSIX shell on the remote side.
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

fn find_in_path(name: &str) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    for path in std::env::split_paths(&path_var) {
        let plain = path.join(name);
        if plain.exists() {
            return Some(plain);
        }
    }
    None
}
