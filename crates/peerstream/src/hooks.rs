//! User supplied shell hooks

use std::io;
use std::process::ExitStatus;

use tokio::process::Command;

/// Run `line` through the shell and wait for it
pub async fn run_hook(line: &str) -> io::Result<ExitStatus> {
    shell(line).status().await
}

/// Run `command`, optionally followed by one argument, in the background.
/// Failures are logged and otherwise ignored.
pub fn spawn_hook(command: &str, arg: Option<&str>) {
    let line = hook_line(command, arg);
    tracing::info!("Running hook: {}", line);
    tokio::spawn(async move {
        match run_hook(&line).await {
            Ok(status) if !status.success() => {
                tracing::warn!("Hook `{}` exited with {}", line, status);
            }
            Ok(_) => {}
            Err(e) => tracing::warn!("Failed to run hook `{}`: {}", line, e),
        }
    });
}

fn hook_line(command: &str, arg: Option<&str>) -> String {
    match arg {
        Some(arg) => format!("{} {}", command, arg),
        None => command.to_string(),
    }
}

#[cfg(unix)]
fn shell(line: &str) -> Command {
    let mut command = Command::new("sh");
    command.arg("-c").arg(line);
    command
}

#[cfg(windows)]
fn shell(line: &str) -> Command {
    let mut command = Command::new("cmd");
    command.arg("/C").arg(line);
    command
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hook_line() {
        assert_eq!(hook_line("notify", None), "notify");
        assert_eq!(
            hook_line("mpv", Some("http://localhost:8888/")),
            "mpv http://localhost:8888/"
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_hook_reports_status() {
        assert!(run_hook("exit 0").await.unwrap().success());
        assert_eq!(run_hook("exit 3").await.unwrap().code(), Some(3));
    }
}
