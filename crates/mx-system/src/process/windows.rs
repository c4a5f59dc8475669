//! Windows termination.
//!
//! There are no signals: both graceful and forced termination end in
//! `TerminateProcess`, and worker handles do not exist.

use mx_config::log_process_debug;

use super::{report_unsupported_diagnostic, Handle, ProcessSignals, Subprocess};
use crate::console::Console;
use crate::error::Result;

#[derive(Debug, Clone, Copy, Default)]
pub struct WindowsSignals;

fn terminate_child(console: &mut Console, entry: &mut Subprocess) -> Result<()> {
    let pid = entry.pid();
    console.logvv(Some(&format!("[{} terminating {}]", std::process::id(), pid)));
    match entry.handle_mut() {
        Handle::Child(child) => {
            log_process_debug!("Terminating process", pid = pid);
            child.kill()?;
        }
    }
    Ok(())
}

impl ProcessSignals for WindowsSignals {
    fn terminate(&self, console: &mut Console, entry: &mut Subprocess, _signal: i32) -> Result<()> {
        terminate_child(console, entry)
    }

    fn force_kill(&self, console: &mut Console, entry: &mut Subprocess) -> Result<()> {
        terminate_child(console, entry)
    }

    fn send_diagnostic_signal(&self, console: &mut Console, entry: &mut Subprocess) -> Result<()> {
        report_unsupported_diagnostic(console, entry.pid());
        Ok(())
    }
}
