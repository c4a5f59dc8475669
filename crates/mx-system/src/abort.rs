//! Program-wide failure path.
//!
//! [`Session::abort`] tears down every tracked subprocess, reports the final
//! error on the console and exits with the resolved status. The teardown and
//! reporting half is available on its own as [`Session::shutdown`] so that it
//! can be driven without ending the process.

use std::fmt;

use mx_config::{log_abort_info, log_abort_warn};
use tracing::field::display;

use crate::console::Console;
use crate::context::{with_context, AbortContext};
use crate::process::{send_sigquit, ProcessSignals, SubprocessRegistry, SIGNAL_GRACE};
use crate::Session;

/// Signal used for graceful termination unless the caller picks another.
pub const DEFAULT_KILL_SIGNAL: i32 = libc::SIGTERM;

/// What the caller asked `abort` to exit with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitRequest {
    /// Exit with this status; the context, if any, is the whole message.
    Code(i32),
    /// Exit with status 1 and report this message.
    Message(String),
}

impl From<i32> for ExitRequest {
    fn from(code: i32) -> Self {
        ExitRequest::Code(code)
    }
}

impl From<&str> for ExitRequest {
    fn from(msg: &str) -> Self {
        ExitRequest::Message(msg.to_string())
    }
}

impl From<String> for ExitRequest {
    fn from(msg: String) -> Self {
        ExitRequest::Message(msg)
    }
}

impl fmt::Display for ExitRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitRequest::Code(code) => write!(f, "exit code {code}"),
            ExitRequest::Message(msg) => f.write_str(msg),
        }
    }
}

/// Final exit status and the message reported for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbortReport {
    pub status: i32,
    pub message: String,
}

/// Combine a request with its rendered context.
pub fn resolve(request: &ExitRequest, context: Option<&dyn AbortContext>) -> AbortReport {
    match request {
        ExitRequest::Code(code) => AbortReport {
            status: *code,
            message: context.map(|c| c.abort_context()).unwrap_or_default(),
        },
        ExitRequest::Message(msg) => {
            let rendered = context.map(|c| c.abort_context()).unwrap_or_default();
            let message = if rendered.is_empty() {
                msg.clone()
            } else {
                with_context(msg, Some(&rendered))
            };
            AbortReport { status: 1, message }
        }
    }
}

/// Terminate every live entry in `registry`, escalating to a forced kill
/// for anything that survives the grace period.
///
/// Failures are reported and never stop the loop.
pub fn terminate_all(
    console: &mut Console,
    registry: &mut SubprocessRegistry,
    signals: &dyn ProcessSignals,
    killsig: i32,
) {
    for entry in registry.iter_mut() {
        if entry.is_alive() {
            if let Err(e) = signals.terminate(console, entry, killsig) {
                console.log(Some(&format!("Error killing subprocess {}: {}", entry.pid(), e)));
            }
            std::thread::sleep(SIGNAL_GRACE);
        }
        if entry.is_alive() {
            log_abort_warn!("Subprocess survived termination", pid = entry.pid());
            if let Err(e) = signals.force_kill(console, entry) {
                if entry.is_alive() {
                    console.log_error(Some(&format!(
                        "error while killing subprocess {} \"{}\": {}",
                        entry.pid(),
                        entry.command_line(),
                        e
                    )));
                }
            }
        }
    }
}

impl Session {
    /// Everything `abort` does short of exiting.
    pub fn shutdown(
        &mut self,
        request: impl Into<ExitRequest>,
        context: Option<&dyn AbortContext>,
        killsig: i32,
    ) -> AbortReport {
        let request = request.into();
        log_abort_info!(
            "Aborting",
            request = display(&request),
            subprocesses = self.subprocesses.len()
        );

        let signals = self.signals.as_ref();
        if self.options.kill_with_sigquit {
            self.console
                .logv(Some("sending SIGQUIT to subprocesses on abort"));
            send_sigquit(&mut self.console, &mut self.subprocesses, signals);
        }

        terminate_all(&mut self.console, &mut self.subprocesses, signals, killsig);

        if self.console.is_verbose() {
            self.console.print_stack();
        }

        let report = resolve(&request, context);
        if !report.message.is_empty() {
            self.console.log_error(Some(&report.message));
        }
        report
    }

    /// Tear down subprocesses, report and exit. Subprocesses get
    /// [`DEFAULT_KILL_SIGNAL`] before being killed outright.
    pub fn abort(&mut self, request: impl Into<ExitRequest>, context: Option<&dyn AbortContext>) -> ! {
        self.abort_with_signal(request, context, DEFAULT_KILL_SIGNAL)
    }

    pub fn abort_with_signal(
        &mut self,
        request: impl Into<ExitRequest>,
        context: Option<&dyn AbortContext>,
        killsig: i32,
    ) -> ! {
        let report = self.shutdown(request, context, killsig);
        std::process::exit(report.status)
    }

    /// Abort when `should_abort`, otherwise emit `message` as a warning.
    pub fn abort_or_warn(
        &mut self,
        message: &str,
        should_abort: bool,
        context: Option<&dyn AbortContext>,
    ) {
        if should_abort {
            self.abort(message, context);
        }
        self.console.warn(message, context);
    }
}
