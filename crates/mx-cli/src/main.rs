//! # mx CLI
//!
//! Command-line front end for the mx system layer: platform probing, safe
//! filesystem operations, supervised subprocesses and the abort path.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mx_config::logging::{init_logging, LogLevel};
use mx_config::{log_cli_debug, Options};
use mx_system::{path, AbortContext, Console, ExitRequest, Os, Session, SystemError};

mod config;
mod run;

/// mx - platform helpers and subprocess supervision
#[derive(Parser)]
#[command(name = "mx")]
#[command(about, long_about = None)]
struct Cli {
    /// Suppress all normal output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Enable very verbose output (implies --verbose)
    #[arg(short = 'V', long, global = true)]
    very_verbose: bool,

    /// Suppress warnings
    #[arg(long, global = true)]
    no_warning: bool,

    /// Use at most this many CPUs
    #[arg(long, value_name = "N", global = true)]
    cpu_count: Option<usize>,

    /// Send SIGQUIT to Java subprocesses before tearing them down on abort
    #[arg(long = "killwithsigquit", global = true)]
    kill_with_sigquit: bool,

    /// Diagnostic log level (overridden by MX_LOG / RUST_LOG)
    #[arg(long, value_name = "LEVEL", default_value = "warn", global = true)]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the canonical OS name
    Os {
        /// Classify this platform identifier instead of the running one
        #[arg(long)]
        platform: Option<String>,
    },

    /// Print the long-path safe form of a path
    SafePath {
        #[arg(value_name = "PATH")]
        path: PathBuf,

        /// Apply the Windows transform regardless of the running OS
        #[arg(long)]
        windows: bool,
    },

    /// Remove a directory tree
    Rmtree {
        #[arg(value_name = "PATH")]
        path: PathBuf,

        /// Keep going when an entry can not be removed
        #[arg(long)]
        ignore_errors: bool,
    },

    /// Copy a directory tree to a new location
    Copytree {
        #[arg(value_name = "SRC")]
        src: PathBuf,

        #[arg(value_name = "DST")]
        dst: PathBuf,

        /// Recreate symbolic links instead of copying their targets
        #[arg(long)]
        symlinks: bool,
    },

    /// Print the number of CPUs available
    CpuCount,

    /// Run a command as a supervised subprocess
    Run(run::RunArgs),

    /// Abort with a message or exit code
    Abort {
        /// Message to report (exit status 1)
        #[arg(value_name = "MESSAGE")]
        message: Option<String>,

        /// Exit status to abort with
        #[arg(long, conflicts_with = "message")]
        code: Option<i32>,

        /// Context printed before the message
        #[arg(long)]
        context: Option<String>,
    },

    /// Send a signal to a process, or to the group it leads
    #[cfg(unix)]
    Kill {
        #[arg(value_name = "PID")]
        pid: u32,

        /// Signal number
        #[arg(long, default_value_t = libc::SIGTERM)]
        signal: i32,
    },

    /// Show option files and effective options
    Config {
        #[command(subcommand)]
        command: config::ConfigCommands,
    },
}

impl Cli {
    /// Options from files and environment, with command-line flags on top.
    fn options(&self) -> Result<Options> {
        let mut options = Options::load().context("failed to load options")?;
        if self.quiet {
            options.quiet = true;
        }
        if self.verbose {
            options.verbose = true;
        }
        if self.very_verbose {
            options.very_verbose = true;
        }
        if self.no_warning {
            options.warn = false;
        }
        if let Some(cpus) = self.cpu_count {
            options.cpu_count = Some(cpus);
        }
        if self.kill_with_sigquit {
            options.kill_with_sigquit = true;
        }
        Ok(options.normalized())
    }
}

fn main() {
    #[cfg(unix)]
    unsafe {
        libc::signal(libc::SIGPIPE, libc::SIG_DFL);
    }

    let cli = Cli::parse();
    init_logging(cli.log_level);

    let mut session = match Session::detect() {
        Ok(session) => session,
        Err(e) => std::process::exit(report_startup_failure(&mut Console::new(), &e)),
    };

    // Held until the options say whether verbose output is wanted.
    session.console.logv(Some(&format!(
        "loading options from {} and {}",
        Options::global_config_path()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "<no home>".to_string()),
        Options::project_config_path().display()
    )));

    let options = match cli.options() {
        Ok(options) => options,
        Err(e) => session.abort(format!("{e:#}"), None),
    };
    if let Err(e) = session.configure(options) {
        session.abort(e.to_string(), None);
    }

    if let Err(e) = dispatch(cli.command, &mut session) {
        session.abort(format!("{e:#}"), None);
    }
}

/// No session exists yet, so the error goes straight to a fresh console.
fn report_startup_failure(console: &mut Console, err: &SystemError) -> i32 {
    console.log_error(Some(&err.to_string()));
    1
}

fn dispatch(command: Commands, session: &mut Session) -> Result<()> {
    match command {
        Commands::Os { platform } => {
            let os = match platform {
                Some(platform) => Os::from_platform(&platform)?,
                None => session.os(),
            };
            session.console.log(Some(os.name()));
        }
        Commands::SafePath { path, windows } => {
            let safe = if windows {
                path::safe_path(&path, Os::Windows)
            } else {
                session.safe_path(&path)
            };
            session.console.log(Some(&safe.display().to_string()));
        }
        Commands::Rmtree {
            path,
            ignore_errors,
        } => {
            session
                .rmtree(&path, ignore_errors)
                .with_context(|| format!("failed to remove {}", path.display()))?;
            session
                .console
                .logv(Some(&format!("removed {}", path.display())));
        }
        Commands::Copytree { src, dst, symlinks } => {
            session.copytree(&src, &dst, symlinks).with_context(|| {
                format!("failed to copy {} to {}", src.display(), dst.display())
            })?;
            session.console.logv(Some(&format!(
                "copied {} to {}",
                src.display(),
                dst.display()
            )));
        }
        Commands::CpuCount => {
            let cpus = session.cpu_count();
            session.console.log(Some(&cpus.to_string()));
        }
        Commands::Run(args) => run::cmd_run(session, args)?,
        Commands::Abort {
            message,
            code,
            context,
        } => {
            let request = match (code, message) {
                (Some(code), _) => ExitRequest::Code(code),
                (None, Some(message)) => ExitRequest::Message(message),
                (None, None) => ExitRequest::Code(0),
            };
            log_cli_debug!("Abort requested", has_context = context.is_some());
            let context = context.as_ref().map(|c| c as &dyn AbortContext);
            session.abort(request, context);
        }
        #[cfg(unix)]
        Commands::Kill { pid, signal } => {
            if !session.kill_process(pid, signal) {
                session.abort(1, None);
            }
        }
        Commands::Config { command } => config::cmd_config(session, command),
    }
    Ok(())
}
