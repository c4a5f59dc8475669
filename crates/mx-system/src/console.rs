//! Console reporter.
//!
//! All textual program output goes through a [`Console`]. Normal and verbose
//! output goes to stdout; errors and warnings go to stderr, colored when the
//! stream is a terminal on a platform that understands ANSI sequences.
//!
//! The console starts out *buffering*: verbosity is not known until options
//! have been loaded, so `logv`/`logvv` calls made during startup are queued.
//! [`Console::activate`] is the one-time switch to the *active* state. It
//! replays the queue in order against the final verbosity and from then on
//! dispatches directly.

use std::fmt;
use std::io::Write;
use std::str::FromStr;

use mx_config::{log_console_debug, Options};

use crate::context::{with_context, AbortContext};
use crate::error::{Result, SystemError};
use crate::platform;

/// Output stream selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Stdout,
    Stderr,
}

/// Foreground colors, see <https://en.wikipedia.org/wiki/ANSI_escape_code#Colors>.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Color {
    Black,
    Red,
    Green,
    Yellow,
    Blue,
    Magenta,
    Cyan,
}

impl Color {
    pub const ALL: [Color; 7] = [
        Color::Black,
        Color::Red,
        Color::Green,
        Color::Yellow,
        Color::Blue,
        Color::Magenta,
        Color::Cyan,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Color::Black => "black",
            Color::Red => "red",
            Color::Green => "green",
            Color::Yellow => "yellow",
            Color::Blue => "blue",
            Color::Magenta => "magenta",
            Color::Cyan => "cyan",
        }
    }

    fn code(self) -> &'static str {
        match self {
            Color::Black => "30",
            Color::Red => "31",
            Color::Green => "32",
            Color::Yellow => "33",
            Color::Blue => "34",
            Color::Magenta => "35",
            Color::Cyan => "36",
        }
    }

    /// Escape sequence that switches to this color.
    pub fn escape(self, bright: bool) -> String {
        if bright {
            format!("\x1b[{};1m", self.code())
        } else {
            format!("\x1b[{}m", self.code())
        }
    }
}

impl FromStr for Color {
    type Err = SystemError;

    fn from_str(s: &str) -> Result<Self> {
        Color::ALL
            .into_iter()
            .find(|c| c.name() == s)
            .ok_or_else(|| SystemError::UnsupportedColor {
                color: s.to_string(),
                supported: Color::ALL.map(Color::name).join(", "),
            })
    }
}

/// Reset sequence appended after colored text.
pub const RESET: &str = "\x1b[0m";

/// Output flags consulted by the console.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verbosity {
    pub quiet: bool,
    pub verbose: bool,
    pub very_verbose: bool,
    pub warn: bool,
}

impl Default for Verbosity {
    fn default() -> Self {
        Self {
            quiet: false,
            verbose: false,
            very_verbose: false,
            warn: true,
        }
    }
}

impl From<&Options> for Verbosity {
    fn from(options: &Options) -> Self {
        Self {
            quiet: options.quiet,
            verbose: options.verbose || options.very_verbose,
            very_verbose: options.very_verbose,
            warn: options.warn,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Level {
    Verbose,
    VeryVerbose,
}

#[derive(Debug)]
struct Deferred {
    level: Level,
    msg: Option<String>,
}

#[derive(Debug)]
enum SinkState {
    Buffering(Vec<Deferred>),
    Active(Verbosity),
}

pub struct Console {
    state: SinkState,
    out: Box<dyn Write + Send>,
    err: Box<dyn Write + Send>,
    out_is_tty: bool,
    err_is_tty: bool,
    ansi: bool,
}

impl fmt::Debug for Console {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Console")
            .field("state", &self.state)
            .field("out_is_tty", &self.out_is_tty)
            .field("err_is_tty", &self.err_is_tty)
            .field("ansi", &self.ansi)
            .finish()
    }
}

impl Default for Console {
    fn default() -> Self {
        Self::new()
    }
}

impl Console {
    /// Console on the process' stdout and stderr.
    pub fn new() -> Self {
        Self {
            state: SinkState::Buffering(Vec::new()),
            out: Box::new(std::io::stdout()),
            err: Box::new(std::io::stderr()),
            out_is_tty: console::Term::stdout().is_term(),
            err_is_tty: console::Term::stderr().is_term(),
            ansi: platform::supports_ansi(platform::current_platform()),
        }
    }

    /// Console on arbitrary writers. Neither stream is treated as a terminal.
    pub fn with_writers(out: impl Write + Send + 'static, err: impl Write + Send + 'static) -> Self {
        Self {
            state: SinkState::Buffering(Vec::new()),
            out: Box::new(out),
            err: Box::new(err),
            out_is_tty: false,
            err_is_tty: false,
            ansi: platform::supports_ansi(platform::current_platform()),
        }
    }

    /// Override terminal detection.
    pub fn with_terminal(mut self, out_is_tty: bool, err_is_tty: bool) -> Self {
        self.out_is_tty = out_is_tty;
        self.err_is_tty = err_is_tty;
        self
    }

    /// Override whether the platform honours ANSI sequences.
    pub fn with_ansi(mut self, ansi: bool) -> Self {
        self.ansi = ansi;
        self
    }

    /// Switch from buffering to active and replay deferred calls in order.
    pub fn activate(&mut self, verbosity: Verbosity) -> Result<()> {
        let pending = match std::mem::replace(&mut self.state, SinkState::Active(verbosity)) {
            SinkState::Buffering(pending) => pending,
            SinkState::Active(previous) => {
                self.state = SinkState::Active(previous);
                return Err(SystemError::SinkAlreadyActive);
            }
        };

        log_console_debug!("Console activated", replayed = pending.len());
        for deferred in pending {
            let msg = deferred.msg.as_deref();
            match deferred.level {
                Level::Verbose => self.logv(msg),
                Level::VeryVerbose => self.logvv(msg),
            }
        }
        Ok(())
    }

    pub fn is_active(&self) -> bool {
        matches!(self.state, SinkState::Active(_))
    }

    /// Number of deferred calls waiting for activation.
    pub fn pending(&self) -> usize {
        match &self.state {
            SinkState::Buffering(pending) => pending.len(),
            SinkState::Active(_) => 0,
        }
    }

    pub fn verbosity(&self) -> Option<Verbosity> {
        match self.state {
            SinkState::Active(v) => Some(v),
            SinkState::Buffering(_) => None,
        }
    }

    /// Verbose output is enabled. False while buffering.
    pub fn is_verbose(&self) -> bool {
        self.verbosity().is_some_and(|v| v.verbose)
    }

    fn is_quiet(&self) -> bool {
        self.verbosity().is_some_and(|v| v.quiet)
    }

    fn warnings_enabled(&self) -> bool {
        self.verbosity().map_or(true, |v| v.warn)
    }

    /// Write a message (or an empty line) to stdout unless quiet.
    pub fn log(&mut self, msg: Option<&str>) {
        if self.is_quiet() {
            return;
        }
        // One write per line so concurrent writers don't interleave mid-line.
        let line = format!("{}\n", msg.unwrap_or_default());
        let _ = self.out.write_all(line.as_bytes());
        let _ = self.out.flush();
    }

    /// `log` when verbose; deferred while buffering.
    pub fn logv(&mut self, msg: Option<&str>) {
        let enabled = match &mut self.state {
            SinkState::Buffering(pending) => {
                pending.push(Deferred {
                    level: Level::Verbose,
                    msg: msg.map(str::to_string),
                });
                return;
            }
            SinkState::Active(v) => v.verbose,
        };
        if enabled {
            self.log(msg);
        }
    }

    /// `log` when very verbose; deferred while buffering.
    pub fn logvv(&mut self, msg: Option<&str>) {
        let enabled = match &mut self.state {
            SinkState::Buffering(pending) => {
                pending.push(Deferred {
                    level: Level::VeryVerbose,
                    msg: msg.map(str::to_string),
                });
                return;
            }
            SinkState::Active(v) => v.very_verbose,
        };
        if enabled {
            self.log(msg);
        }
    }

    /// Write an error message to stderr, bright red on a terminal.
    pub fn log_error(&mut self, msg: Option<&str>) {
        let line = match msg {
            Some(msg) => self
                .colorize(Some(msg), Color::Red, true, Stream::Stderr)
                .unwrap_or_default(),
            None => String::new(),
        };
        self.write_err(&line);
    }

    /// Emit a warning to stderr, bright magenta on a terminal.
    pub fn warn(&mut self, msg: &str, context: Option<&dyn AbortContext>) {
        if !self.warnings_enabled() {
            return;
        }
        let msg = format!("WARNING: {}", with_context(msg, context));
        let line = self
            .colorize(Some(&msg), Color::Magenta, true, Stream::Stderr)
            .unwrap_or(msg);
        self.write_err(&line);
    }

    /// Wrap `msg` in the escape sequence for `color`.
    ///
    /// `msg` is returned unchanged if it already starts with that escape, or
    /// if `stream` is not a terminal on an ANSI-capable platform.
    pub fn colorize(
        &self,
        msg: Option<&str>,
        color: Color,
        bright: bool,
        stream: Stream,
    ) -> Option<String> {
        let msg = msg?;
        let color_on = color.escape(bright);
        if !msg.starts_with(&color_on) && self.ansi && self.is_tty(stream) {
            return Some(format!("{color_on}{msg}{RESET}"));
        }
        Some(msg.to_string())
    }

    /// `colorize` with the color given by name.
    pub fn colorize_named(
        &self,
        msg: Option<&str>,
        color: &str,
        bright: bool,
        stream: Stream,
    ) -> Result<Option<String>> {
        let color: Color = color.parse()?;
        Ok(self.colorize(msg, color, bright, stream))
    }

    /// Print the current call stack to stderr.
    pub fn print_stack(&mut self) {
        let trace = std::backtrace::Backtrace::force_capture();
        self.write_err(&trace.to_string());
    }

    fn is_tty(&self, stream: Stream) -> bool {
        match stream {
            Stream::Stdout => self.out_is_tty,
            Stream::Stderr => self.err_is_tty,
        }
    }

    fn write_err(&mut self, msg: &str) {
        let line = format!("{msg}\n");
        let _ = self.err.write_all(line.as_bytes());
        let _ = self.err.flush();
    }
}
