//! Subprocess lifecycle: liveness checks, signal delivery and the
//! diagnostic-dump request for Java children.
//!
//! Platform differences live behind [`ProcessSignals`]; the escalation logic
//! that uses it (terminate, wait, force kill) is written once in the abort
//! controller.
//!
//! ## Platform Support
//!
//! - **Unix**: signals via `nix`, delivered to the whole process group when
//!   the target leads one
//! - **Windows**: `TerminateProcess` for both graceful and forced
//!   termination; diagnostic signals are a logged no-op

mod registry;
#[cfg(unix)]
pub mod unix;
#[cfg(windows)]
pub mod windows;

use std::path::Path;
use std::process::{Child, ExitStatus};
use std::time::Duration;

use mx_config::log_process_warn;

use crate::console::Console;
use crate::error::Result;

pub use registry::{Subprocess, SubprocessRegistry};

/// Pause after signalling a process before checking on it again.
pub const SIGNAL_GRACE: Duration = Duration::from_millis(100);

/// Handle to a tracked child process.
#[derive(Debug)]
pub enum Handle {
    /// A process spawned through `std::process::Command`
    Child(Child),
    /// A forked worker known only by pid
    #[cfg(unix)]
    Worker(nix::unistd::Pid),
}

impl Handle {
    pub fn pid(&self) -> u32 {
        match self {
            Handle::Child(child) => child.id(),
            #[cfg(unix)]
            Handle::Worker(pid) => pid.as_raw() as u32,
        }
    }

    /// Exit status of a reaped child. Always `None` for workers.
    pub fn exit_status(&mut self) -> Option<ExitStatus> {
        match self {
            Handle::Child(child) => child.try_wait().ok().flatten(),
            #[cfg(unix)]
            Handle::Worker(_) => None,
        }
    }
}

/// Whether the process behind `handle` is still running.
///
/// Spawned children are polled (and reaped once they exit); workers are
/// queried through the OS.
pub fn is_process_alive(handle: &mut Handle) -> bool {
    match handle {
        Handle::Child(child) => match child.try_wait() {
            Ok(None) => true,
            Ok(Some(_)) => false,
            Err(e) => {
                log_process_warn!("Failed to poll child", pid = child.id(), error = tracing::field::display(&e));
                false
            }
        },
        #[cfg(unix)]
        Handle::Worker(pid) => unix::worker_alive(*pid),
    }
}

/// Whether `args` launches a Java VM: the base name of the program is
/// exactly `java`.
pub fn is_java(args: &[String]) -> bool {
    args.first()
        .and_then(|program| Path::new(program).file_name())
        .is_some_and(|name| name == "java")
}

/// Per-platform signal delivery.
pub trait ProcessSignals {
    /// Ask the process to exit. `signal` is honoured where the platform has
    /// signals.
    fn terminate(&self, console: &mut Console, entry: &mut Subprocess, signal: i32) -> Result<()>;

    /// Kill the process without giving it a chance to clean up.
    fn force_kill(&self, console: &mut Console, entry: &mut Subprocess) -> Result<()>;

    /// Ask the process to dump its internal state without terminating it.
    fn send_diagnostic_signal(&self, console: &mut Console, entry: &mut Subprocess) -> Result<()>;
}

/// Signal implementation for the running platform.
pub fn native_signals() -> Box<dyn ProcessSignals> {
    #[cfg(unix)]
    {
        Box::new(unix::UnixSignals)
    }
    #[cfg(windows)]
    {
        Box::new(windows::WindowsSignals)
    }
}

/// Tell the user a diagnostic dump was requested on a platform without one.
/// Shown regardless of verbosity.
pub fn report_unsupported_diagnostic(console: &mut Console, pid: u32) {
    console.log(Some(&format!(
        "diagnostic dumps are not supported on this platform, skipping {}",
        pid
    )));
}

/// Send the diagnostic signal to every live Java subprocess, pausing after
/// each one so it can handle the signal.
pub fn send_sigquit(
    console: &mut Console,
    registry: &mut SubprocessRegistry,
    signals: &dyn ProcessSignals,
) {
    for entry in registry.iter_mut() {
        if entry.is_alive() && is_java(entry.args()) {
            if let Err(e) = signals.send_diagnostic_signal(console, entry) {
                console.log(Some(&format!(
                    "Error sending diagnostic signal to {}: {}",
                    entry.pid(),
                    e
                )));
            }
            std::thread::sleep(SIGNAL_GRACE);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_is_java() {
        assert!(is_java(&args(&["java", "-version"])));
        assert!(is_java(&args(&["/usr/lib/jvm/bin/java", "-jar", "x.jar"])));
        assert!(!is_java(&args(&["javac", "X.java"])));
        assert!(!is_java(&args(&["/opt/java/bin/native-image"])));
        assert!(!is_java(&[]));
    }

    #[test]
    fn test_unsupported_diagnostic_is_not_gated_on_verbose() {
        use crate::console::Verbosity;
        use mx_config::testing::CaptureBuffer;

        let out = CaptureBuffer::new();
        let mut console = Console::with_writers(out.clone(), std::io::sink());
        console.activate(Verbosity::default()).unwrap();

        report_unsupported_diagnostic(&mut console, 4242);
        assert_eq!(
            out.contents(),
            "diagnostic dumps are not supported on this platform, skipping 4242\n"
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_child_liveness() {
        let child = std::process::Command::new("sleep").arg("30").spawn().unwrap();
        let mut handle = Handle::Child(child);
        assert!(is_process_alive(&mut handle));

        if let Handle::Child(child) = &mut handle {
            child.kill().unwrap();
            child.wait().unwrap();
        }
        assert!(!is_process_alive(&mut handle));
        assert!(handle.exit_status().is_some());
    }

    #[cfg(unix)]
    #[test]
    fn test_exited_child_is_not_alive() {
        let mut handle = Handle::Child(std::process::Command::new("true").spawn().unwrap());
        std::thread::sleep(Duration::from_millis(300));
        assert!(!is_process_alive(&mut handle));
        assert!(handle.exit_status().unwrap().success());
    }
}
