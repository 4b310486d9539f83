use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::trace;

use super::expand_env;
use super::HealthProbe;
use crate::ProbeError;

/// Runs a CLI check such as `redis-cli ping` or `pg_isready`.
///
/// The child is killed if the check is abandoned (timeout or session close).
pub struct CommandProbe {
    program: String,
    args: Vec<String>,
    expect: String,
}

impl CommandProbe {
    pub fn new(
        program: impl Into<String>,
        args: Vec<String>,
        expect: impl Into<String>,
    ) -> Self {
        Self {
            program: program.into(),
            args,
            expect: expect.into(),
        }
    }
}

#[async_trait]
impl HealthProbe for CommandProbe {
    async fn check(&self) -> Result<(), ProbeError> {
        let args: Vec<String> = self.args.iter().map(|a| expand_env(a)).collect();
        trace!("probing with {} {}", self.program, args.join(" "));

        let output = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| ProbeError::Command {
                program: self.program.clone(),
                reason: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(ProbeError::Command {
                program: self.program.clone(),
                reason: format!(
                    "exit status {}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        if stdout.contains(&self.expect) {
            Ok(())
        } else {
            Err(ProbeError::UnexpectedResponse {
                expected: self.expect.clone(),
            })
        }
    }
}
