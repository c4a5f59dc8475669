//! Unix signal delivery.
//!
//! A target that leads its own process group is signalled through the group
//! so that anything it spawned goes down with it. Any other target is
//! signalled on its own.

use nix::errno::Errno;
use nix::sys::signal::{kill, killpg, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::{getpgid, Pid};

use mx_config::{log_process_debug, log_process_warn};

use super::{ProcessSignals, Subprocess};
use crate::console::Console;
use crate::error::{Result, SystemError};

/// Where a signal for a pid ends up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalTarget {
    Group(Pid),
    Process(Pid),
}

/// Pick the group when `pid` leads it, the bare process otherwise.
pub fn signal_target(pid: Pid, pgid: Pid) -> SignalTarget {
    if pgid == pid {
        SignalTarget::Group(pgid)
    } else {
        SignalTarget::Process(pid)
    }
}

fn signal_error(pid: u32, signal: Signal, err: Errno) -> SystemError {
    SystemError::Signal {
        pid,
        signal: signal.as_str().to_string(),
        reason: err.to_string(),
    }
}

/// Resolve a raw signal number meant for `pid`.
pub fn parse_signal(pid: u32, signal: i32) -> Result<Signal> {
    Signal::try_from(signal).map_err(|e| SystemError::Signal {
        pid,
        signal: signal.to_string(),
        reason: e.to_string(),
    })
}

/// Deliver `signal` to `pid`, or to its group when it is the group leader.
pub fn deliver(console: &mut Console, pid: u32, signal: Signal) -> Result<()> {
    let target = Pid::from_raw(pid as i32);
    let pgid = getpgid(Some(target)).map_err(|e| signal_error(pid, signal, e))?;

    console.logvv(Some(&format!(
        "[{} sending {} to {}]",
        std::process::id(),
        signal.as_str(),
        pid
    )));

    let sent = match signal_target(target, pgid) {
        SignalTarget::Group(group) => {
            log_process_debug!("Signalling process group", pgid = group.as_raw(), signal = signal.as_str());
            killpg(group, signal)
        }
        SignalTarget::Process(process) => {
            log_process_debug!("Signalling process", pid = process.as_raw(), signal = signal.as_str());
            kill(process, signal)
        }
    };
    sent.map_err(|e| signal_error(pid, signal, e))
}

/// Send `signal` to `pid` (or its group, see [`signal_target`]).
///
/// Failures are reported on the console and turned into `false`.
pub fn kill_process(console: &mut Console, pid: u32, signal: Signal) -> bool {
    match deliver(console, pid, signal) {
        Ok(()) => true,
        Err(e) => {
            console.log(Some(&format!("Error killing subprocess {}: {}", pid, e)));
            false
        }
    }
}

/// Liveness of a pid that may or may not be our child.
pub(crate) fn worker_alive(pid: Pid) -> bool {
    match waitpid(pid, Some(WaitPidFlag::WNOHANG)) {
        Ok(WaitStatus::StillAlive) => true,
        Ok(_) => false,
        // Not our child: fall back to the null signal.
        Err(Errno::ECHILD) => kill(pid, None).is_ok(),
        Err(e) => {
            log_process_warn!("Failed to check worker", pid = pid.as_raw(), error = tracing::field::display(&e));
            false
        }
    }
}

/// Signals through `kill(2)`/`killpg(2)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnixSignals;

impl ProcessSignals for UnixSignals {
    fn terminate(&self, console: &mut Console, entry: &mut Subprocess, signal: i32) -> Result<()> {
        let signal = parse_signal(entry.pid(), signal)?;
        deliver(console, entry.pid(), signal)
    }

    fn force_kill(&self, console: &mut Console, entry: &mut Subprocess) -> Result<()> {
        deliver(console, entry.pid(), Signal::SIGKILL)
    }

    fn send_diagnostic_signal(&self, console: &mut Console, entry: &mut Subprocess) -> Result<()> {
        let pid = entry.pid();
        // Only the child, never its group.
        console.logv(Some(&format!("sending SIGQUIT to {}", pid)));
        kill(Pid::from_raw(pid as i32), Signal::SIGQUIT)
            .map_err(|e| signal_error(pid, Signal::SIGQUIT, e))
    }
}
