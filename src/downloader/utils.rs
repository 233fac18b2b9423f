// Subprocess helpers shared by provider implementations

use std::process::{ExitStatus, Stdio};

use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command as TokioCommand;
use tokio::time::{timeout, Duration};

use super::errors::ProviderError;

/// Collected output of a finished command
#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout_lines: Vec<String>,
    pub stderr: String,
}

fn spawn(program: &str, args: &[String]) -> Result<tokio::process::Child, ProviderError> {
    TokioCommand::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        // Dropping the future (host shutdown, request abandoned) must not orphan the child
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ProviderError::ToolNotFound(program.to_string()),
            _ => ProviderError::ExecutionError {
                message: format!("Failed to start {}: {}", program, e),
                reason: None,
            },
        })
}

/// Run command with timeout, handing each stdout line to `on_line` as it arrives
pub async fn run_streaming_with_timeout<F>(
    program: &str,
    args: &[String],
    timeout_secs: u64,
    mut on_line: F,
) -> Result<CommandOutput, ProviderError>
where
    F: FnMut(&str) + Send,
{
    let mut child = spawn(program, args)?;

    let stdout_pipe = child.stdout.take().ok_or_else(|| ProviderError::ExecutionError {
        message: format!("Failed to capture stdout from {}", program),
        reason: None,
    })?;
    let mut stderr_pipe = child.stderr.take().ok_or_else(|| ProviderError::ExecutionError {
        message: format!("Failed to capture stderr from {}", program),
        reason: None,
    })?;

    let stderr_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        let _ = stderr_pipe.read_to_end(&mut buf).await;
        String::from_utf8_lossy(&buf).into_owned()
    });

    let run = async {
        let mut lines = BufReader::new(stdout_pipe).lines();
        let mut stdout_lines = Vec::new();
        while let Ok(Some(line)) = lines.next_line().await {
            on_line(&line);
            stdout_lines.push(line);
        }
        let status = child.wait().await;
        (status, stdout_lines)
    };

    match timeout(Duration::from_secs(timeout_secs), run).await {
        Ok((status_res, stdout_lines)) => {
            let status = status_res.map_err(|e| ProviderError::ExecutionError {
                message: format!("Failed to wait for {}: {}", program, e),
                reason: None,
            })?;
            let stderr = stderr_task.await.unwrap_or_default();
            Ok(CommandOutput {
                status,
                stdout_lines,
                stderr,
            })
        }
        Err(_) => {
            stderr_task.abort();
            // `child` is dropped with kill_on_drop here
            Err(ProviderError::Timeout(timeout_secs))
        }
    }
}

/// Run command with timeout and collect all output
pub async fn run_output_with_timeout(
    program: &str,
    args: &[String],
    timeout_secs: u64,
) -> Result<CommandOutput, ProviderError> {
    run_streaming_with_timeout(program, args, timeout_secs, |_| {}).await
}
