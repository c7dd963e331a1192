//! Script/command execution and reboot through the host shell.

use async_trait::async_trait;
use std::io::{self, Write};
use std::process::{ExitStatus, Stdio};
use tokio::process::Command;
use tracing::{debug, warn};

#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    #[error("failed to prepare script file: {0}")]
    Script(#[source] io::Error),
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("{program} exited with {status}")]
    Status { program: String, status: ExitStatus },
}

/// Captured output (stdout then stderr) and the failure, if any. Output is kept even
/// when the program failed.
#[derive(Debug)]
pub struct ExecOutcome {
    pub output: String,
    pub error: Option<ExecError>,
}

impl ExecOutcome {
    fn failed(error: ExecError) -> Self {
        Self {
            output: String::new(),
            error: Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

#[async_trait]
pub trait Executor: Send + Sync {
    async fn run_script(&self, script: &str) -> ExecOutcome;
    async fn run_command(&self, command: &str) -> ExecOutcome;
    async fn reboot(&self) -> Result<(), ExecError>;
}

/// `sh`/`cmd` backed executor.
#[derive(Debug, Default, Clone, Copy)]
pub struct ShellExecutor;

async fn run_captured(mut cmd: Command, program: &str) -> ExecOutcome {
    cmd.stdin(Stdio::null()).kill_on_drop(true);
    let out = match cmd.output().await {
        Ok(out) => out,
        Err(source) => {
            return ExecOutcome::failed(ExecError::Spawn {
                program: program.to_string(),
                source,
            })
        }
    };
    let mut output = String::from_utf8_lossy(&out.stdout).into_owned();
    output.push_str(&String::from_utf8_lossy(&out.stderr));
    debug!(program, status = %out.status, bytes = output.len(), "process finished");
    let error = (!out.status.success()).then(|| ExecError::Status {
        program: program.to_string(),
        status: out.status,
    });
    ExecOutcome { output, error }
}

#[cfg(unix)]
fn write_script(script: &str) -> io::Result<tempfile::TempPath> {
    use std::os::unix::fs::PermissionsExt;

    let mut file = tempfile::Builder::new().suffix(".sh").tempfile()?;
    file.write_all(script.as_bytes())?;
    file.as_file()
        .set_permissions(std::fs::Permissions::from_mode(0o700))?;
    // Close the handle before exec, otherwise Linux reports ETXTBSY.
    Ok(file.into_temp_path())
}

#[cfg(windows)]
fn write_script(script: &str) -> io::Result<tempfile::TempPath> {
    let mut file = tempfile::Builder::new().suffix(".bat").tempfile()?;
    file.write_all(b"@echo off\r\n")?;
    file.write_all(script.as_bytes())?;
    Ok(file.into_temp_path())
}

#[async_trait]
impl Executor for ShellExecutor {
    async fn run_script(&self, script: &str) -> ExecOutcome {
        let path = match write_script(script) {
            Ok(p) => p,
            Err(e) => return ExecOutcome::failed(ExecError::Script(e)),
        };

        #[cfg(unix)]
        let cmd = if script.starts_with("#!") {
            Command::new(&*path)
        } else {
            let mut c = Command::new("sh");
            c.arg(&*path);
            c
        };
        #[cfg(windows)]
        let cmd = {
            let mut c = Command::new("cmd");
            c.arg("/C").arg(&*path);
            c
        };

        let outcome = run_captured(cmd, "script").await;
        if let Err(e) = path.close() {
            warn!("failed to remove script file: {e}");
        }
        outcome
    }

    async fn run_command(&self, command: &str) -> ExecOutcome {
        #[cfg(unix)]
        let (program, flag) = ("sh", "-c");
        #[cfg(windows)]
        let (program, flag) = ("cmd", "/C");

        let mut cmd = Command::new(program);
        cmd.arg(flag).arg(command);
        run_captured(cmd, program).await
    }

    async fn reboot(&self) -> Result<(), ExecError> {
        #[cfg(unix)]
        let args: &[&str] = &["-r", "now"];
        #[cfg(windows)]
        let args: &[&str] = &["/r", "/t", "0"];

        let status = Command::new("shutdown")
            .args(args)
            .status()
            .await
            .map_err(|source| ExecError::Spawn {
                program: "shutdown".into(),
                source,
            })?;
        if status.success() {
            Ok(())
        } else {
            Err(ExecError::Status {
                program: "shutdown".into(),
                status,
            })
        }
    }
}
