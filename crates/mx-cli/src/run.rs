//! Supervised subprocess execution.
//!
//! The child is registered with the session for its whole lifetime, so an
//! abort (timeout, failure, or anything else) tears it down with the rest.

use std::process::{Command, ExitStatus};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Args;
use mx_config::log_cli_debug;
use mx_system::Session;

const POLL_INTERVAL: Duration = Duration::from_millis(20);

#[derive(Args)]
pub struct RunArgs {
    /// Abort when the command runs longer than this many milliseconds
    #[arg(long, value_name = "MS")]
    timeout_ms: Option<u64>,

    /// Command and its arguments
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
    command: Vec<String>,
}

pub fn cmd_run(session: &mut Session, args: RunArgs) -> Result<()> {
    let (program, rest) = args.command.split_first().context("no command given")?;
    let command_line = args.command.join(" ");

    let mut command = Command::new(program);
    command.args(rest);
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        // Lead a new group so teardown reaches grandchildren too.
        command.process_group(0);
    }

    let child = command
        .spawn()
        .with_context(|| format!("failed to start {program}"))?;
    let pid = session
        .subprocesses
        .register_child(child, args.command.clone());
    session
        .console
        .logv(Some(&format!("started {command_line} as {pid}")));

    let deadline = args
        .timeout_ms
        .map(|ms| Instant::now() + Duration::from_millis(ms));

    loop {
        let entry = session
            .subprocesses
            .get_mut(pid)
            .with_context(|| format!("subprocess {pid} is no longer tracked"))?;

        if let Some(status) = entry.exit_status() {
            session.subprocesses.deregister(pid);
            log_cli_debug!("Subprocess exited", pid = pid, success = status.success());
            if status.success() {
                return Ok(());
            }
            session.abort(exit_code(status), Some(&command_line));
        }

        if let Some(deadline) = deadline {
            if Instant::now() >= deadline {
                let ms = args.timeout_ms.unwrap_or_default();
                session.abort(format!("timed out after {ms} ms"), Some(&command_line));
            }
        }

        std::thread::sleep(POLL_INTERVAL);
    }
}

/// Exit status to propagate: the child's own code, or 128 + signal number
/// when it was killed by a signal.
fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    1
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn status_of(script: &str) -> ExitStatus {
        Command::new("sh").args(["-c", script]).status().unwrap()
    }

    #[test]
    fn test_exit_code_plain() {
        assert_eq!(exit_code(status_of("exit 0")), 0);
        assert_eq!(exit_code(status_of("exit 7")), 7);
    }

    #[test]
    fn test_exit_code_signal() {
        assert_eq!(exit_code(status_of("kill -KILL $$")), 128 + libc::SIGKILL);
    }
}
