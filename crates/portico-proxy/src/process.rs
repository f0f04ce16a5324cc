//! Bounded external command execution.

use std::time::Duration;

use tokio::process::Command;

/// Captured result of a finished command.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub success: bool,
    /// stdout and stderr, concatenated and trimmed.
    pub output: String,
}

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("empty command line")]
    Empty,

    #[error("could not start {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("{program} timed out after {secs}s")]
    TimedOut { program: String, secs: u64 },
}

/// Run `argv` with a timeout. The child is killed if the timeout elapses.
///
/// A non-zero exit is not an error here; callers read `success`.
pub async fn run(argv: &[String], timeout: Duration) -> Result<CommandOutput, CommandError> {
    let (program, args) = argv.split_first().ok_or(CommandError::Empty)?;

    let child = Command::new(program)
        .args(args)
        .kill_on_drop(true)
        .output();

    let output = match tokio::time::timeout(timeout, child).await {
        Err(_) => {
            return Err(CommandError::TimedOut {
                program: program.clone(),
                secs: timeout.as_secs(),
            })
        }
        Ok(Err(source)) => {
            return Err(CommandError::Spawn {
                program: program.clone(),
                source,
            })
        }
        Ok(Ok(output)) => output,
    };

    let combined = String::from_utf8_lossy(&output.stdout).to_string()
        + &String::from_utf8_lossy(&output.stderr);

    Ok(CommandOutput {
        success: output.status.success(),
        output: combined.trim().to_string(),
    })
}
