//! # mx-system
//!
//! Operating-system layer for mx.
//!
//! Handles:
//! - Platform probing and CPU counting
//! - Long-path safe filesystem wrappers
//! - Tracking and tearing down child processes
//! - Colorized console reporting with deferred verbose output
//! - The abort path that ties the above together
//!
//! State that other tools keep in globals lives in a [`Session`] that is
//! created at startup and passed to whatever needs it.

pub mod abort;
pub mod console;
pub mod context;
pub mod error;
pub mod path;
pub mod platform;
pub mod process;

use std::fmt;
use std::fs::{File, Metadata, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use mx_config::Options;

pub use abort::{AbortReport, ExitRequest, DEFAULT_KILL_SIGNAL};
pub use console::{Color, Console, Stream, Verbosity};
pub use context::{AbortContext, Lazy, Plain};
pub use error::{Result, SystemError};
pub use platform::Os;
pub use process::{Handle, ProcessSignals, Subprocess, SubprocessRegistry};

/// Process-wide state: the detected OS, the console, loaded options and
/// the children spawned so far.
pub struct Session {
    os: Os,
    pub console: Console,
    pub subprocesses: SubprocessRegistry,
    options: Options,
    signals: Box<dyn ProcessSignals>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("os", &self.os)
            .field("console", &self.console)
            .field("subprocesses", &self.subprocesses)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Session for the running platform on stdout/stderr.
    pub fn detect() -> Result<Self> {
        Ok(Self::new(platform::get_os()?, Console::new()))
    }

    /// Session with an explicit OS and console. The console stays in
    /// buffering mode until [`Session::configure`].
    pub fn new(os: Os, console: Console) -> Self {
        Self {
            os,
            console,
            subprocesses: SubprocessRegistry::new(),
            options: Options::default(),
            signals: process::native_signals(),
        }
    }

    /// Replace the signal implementation.
    pub fn with_signals(mut self, signals: Box<dyn ProcessSignals>) -> Self {
        self.signals = signals;
        self
    }

    pub fn os(&self) -> Os {
        self.os
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Install the loaded options and activate the console.
    pub fn configure(&mut self, options: Options) -> Result<()> {
        let options = options.normalized();
        self.console.activate(Verbosity::from(&options))?;
        self.options = options;
        Ok(())
    }

    /// CPUs available, capped by the `cpu_count` option.
    pub fn cpu_count(&self) -> usize {
        platform::cpu_count(self.options.cpu_count)
    }

    /// [`path::safe_path`] for this session's OS.
    ///
    /// Forward slashes on Windows are reported with a stack trace in verbose
    /// mode, since they usually mean a path was built by hand.
    pub fn safe_path(&mut self, path: impl AsRef<Path>) -> PathBuf {
        let path = path.as_ref();
        self.check_slashes(path);
        path::safe_path(path, self.os)
    }

    fn check_slashes(&mut self, path: &Path) {
        if self.os.is_windows() && self.console.is_verbose() && path.to_string_lossy().contains('/') {
            self.console.warn(
                &format!("Forward slash in path on windows: {}", path.display()),
                None,
            );
            self.console.print_stack();
        }
    }

    pub fn open(&mut self, path: impl AsRef<Path>) -> Result<File> {
        self.check_slashes(path.as_ref());
        path::open(path, self.os)
    }

    pub fn open_with(&mut self, path: impl AsRef<Path>, options: &OpenOptions) -> Result<File> {
        self.check_slashes(path.as_ref());
        path::open_with(path, options, self.os)
    }

    pub fn stat(&mut self, path: impl AsRef<Path>) -> Result<Metadata> {
        self.check_slashes(path.as_ref());
        path::stat(path, self.os)
    }

    pub fn lstat(&mut self, path: impl AsRef<Path>) -> Result<Metadata> {
        self.check_slashes(path.as_ref());
        path::lstat(path, self.os)
    }

    pub fn getmtime(&mut self, path: impl AsRef<Path>) -> Result<SystemTime> {
        self.check_slashes(path.as_ref());
        path::getmtime(path, self.os)
    }

    pub fn copytree(
        &mut self,
        src: impl AsRef<Path>,
        dst: impl AsRef<Path>,
        symlinks: bool,
    ) -> Result<()> {
        self.check_slashes(src.as_ref());
        self.check_slashes(dst.as_ref());
        path::copytree(src, dst, symlinks, self.os)
    }

    pub fn rmtree(&mut self, path: impl AsRef<Path>, ignore_errors: bool) -> Result<()> {
        self.check_slashes(path.as_ref());
        path::rmtree(path, ignore_errors, self.os)
    }

    /// Ask every live Java child for a thread dump.
    pub fn send_sigquit(&mut self) {
        process::send_sigquit(&mut self.console, &mut self.subprocesses, self.signals.as_ref());
    }

    /// Signal `pid` (or the group it leads). Failures are reported on the
    /// console and returned as `false`.
    #[cfg(unix)]
    pub fn kill_process(&mut self, pid: u32, signal: i32) -> bool {
        match process::unix::parse_signal(pid, signal) {
            Ok(signal) => process::unix::kill_process(&mut self.console, pid, signal),
            Err(e) => {
                self.console
                    .log(Some(&format!("Error killing subprocess {}: {}", pid, e)));
                false
            }
        }
    }

    pub fn warn(&mut self, msg: &str, context: Option<&dyn AbortContext>) {
        self.console.warn(msg, context);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mx_config::testing::CaptureBuffer;

    fn session(os: Os) -> (Session, CaptureBuffer, CaptureBuffer) {
        let out = CaptureBuffer::new();
        let err = CaptureBuffer::new();
        let console = Console::with_writers(out.clone(), err.clone());
        (Session::new(os, console), out, err)
    }

    #[test]
    fn test_configure_activates_console() {
        let (mut session, out, _) = session(Os::Linux);
        session.console.logv(Some("early"));
        assert_eq!(session.console.pending(), 1);

        let options = Options {
            very_verbose: true,
            cpu_count: Some(1),
            ..Options::default()
        };
        session.configure(options).unwrap();

        assert!(session.options().verbose);
        assert_eq!(out.contents(), "early\n");
        assert_eq!(session.cpu_count(), 1);
        assert!(matches!(
            session.configure(Options::default()),
            Err(SystemError::SinkAlreadyActive)
        ));
    }

    #[test]
    fn test_safe_path_warns_on_windows_forward_slash() {
        let (mut session, _, err) = session(Os::Windows);
        session
            .configure(Options {
                verbose: true,
                ..Options::default()
            })
            .unwrap();

        let safe = session.safe_path("C:/work/file.txt");
        assert_eq!(safe, PathBuf::from(r"\\?\C:\work\file.txt"));
        assert!(err
            .contents()
            .starts_with("WARNING: Forward slash in path on windows: C:/work/file.txt\n"));
    }

    #[test]
    fn test_file_wrappers_warn_on_windows_forward_slash() {
        let (mut session, _, err) = session(Os::Windows);
        session
            .configure(Options {
                verbose: true,
                ..Options::default()
            })
            .unwrap();

        // The paths do not exist on this host; only the warnings matter.
        let _ = session.rmtree("C:/work/nope", false);
        let _ = session.stat("C:/work/file.txt");

        let err = err.contents();
        assert!(err.starts_with("WARNING: Forward slash in path on windows: C:/work/nope\n"));
        assert!(err.contains("WARNING: Forward slash in path on windows: C:/work/file.txt\n"));
    }

    #[test]
    fn test_safe_path_quiet_when_not_verbose() {
        let (mut session, _, err) = session(Os::Windows);
        session.configure(Options::default()).unwrap();
        session.safe_path("C:/work");
        assert!(err.is_empty());
    }

    #[test]
    fn test_safe_path_identity_off_windows() {
        let (mut session, _, err) = session(Os::Linux);
        session.configure(Options::default()).unwrap();
        assert_eq!(session.safe_path("a/b/../c"), PathBuf::from("a/b/../c"));
        assert!(err.is_empty());
    }

    #[test]
    fn test_file_wrappers() {
        let (mut session, _, _) = session(Os::Linux);
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("f.txt");
        std::fs::write(&file, b"data").unwrap();

        assert_eq!(session.stat(&file).unwrap().len(), 4);
        assert!(session.lstat(&file).unwrap().is_file());
        assert!(session.getmtime(&file).is_ok());
        assert!(session.open(&file).is_ok());

        let dest = tempfile::tempdir().unwrap();
        let copy = dest.path().join("copy");
        session.copytree(dir.path(), &copy, true).unwrap();
        assert_eq!(std::fs::read(copy.join("f.txt")).unwrap(), b"data");
        assert!(session.copytree(dir.path(), &copy, true).is_err());

        session.rmtree(&file, false).unwrap();
        assert!(!file.exists());
    }

    #[test]
    fn test_warn_respects_option() {
        let (mut session, _, err) = session(Os::Linux);
        session
            .configure(Options {
                warn: false,
                ..Options::default()
            })
            .unwrap();
        session.warn("ignored", Some(&"ctx"));
        assert!(err.is_empty());
    }
}
