use std::process::{Child, ExitStatus};

use mx_config::log_process_debug;

use super::{is_process_alive, Handle};

/// A tracked child process and the arguments it was started with.
#[derive(Debug)]
pub struct Subprocess {
    handle: Handle,
    args: Vec<String>,
}

impl Subprocess {
    pub fn new(handle: Handle, args: Vec<String>) -> Self {
        Self { handle, args }
    }

    pub fn pid(&self) -> u32 {
        self.handle.pid()
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Arguments joined with spaces, for messages.
    pub fn command_line(&self) -> String {
        self.args.join(" ")
    }

    pub fn handle_mut(&mut self) -> &mut Handle {
        &mut self.handle
    }

    /// Re-checks liveness with the OS.
    pub fn is_alive(&mut self) -> bool {
        is_process_alive(&mut self.handle)
    }

    pub fn exit_status(&mut self) -> Option<ExitStatus> {
        self.handle.exit_status()
    }

    pub fn into_handle(self) -> Handle {
        self.handle
    }
}

/// Child processes spawned by this program.
///
/// Entries are never trusted to be alive: every consumer re-checks with the
/// OS before acting on one.
#[derive(Debug, Default)]
pub struct SubprocessRegistry {
    entries: Vec<Subprocess>,
}

impl SubprocessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a spawned child. Returns its pid.
    pub fn register_child(&mut self, child: Child, args: Vec<String>) -> u32 {
        self.register(Handle::Child(child), args)
    }

    /// Track a forked worker by pid.
    #[cfg(unix)]
    pub fn register_worker(&mut self, pid: u32, args: Vec<String>) -> u32 {
        self.register(Handle::Worker(nix::unistd::Pid::from_raw(pid as i32)), args)
    }

    pub fn register(&mut self, handle: Handle, args: Vec<String>) -> u32 {
        let pid = handle.pid();
        log_process_debug!("Registered subprocess", pid = pid);
        self.entries.push(Subprocess::new(handle, args));
        pid
    }

    /// Stop tracking `pid`, handing the entry back.
    pub fn deregister(&mut self, pid: u32) -> Option<Subprocess> {
        let index = self.entries.iter().position(|e| e.pid() == pid)?;
        log_process_debug!("Deregistered subprocess", pid = pid);
        Some(self.entries.remove(index))
    }

    /// Drop every entry whose process has exited. Returns how many went.
    pub fn prune(&mut self) -> usize {
        let before = self.entries.len();
        self.entries.retain_mut(Subprocess::is_alive);
        before - self.entries.len()
    }

    pub fn get_mut(&mut self, pid: u32) -> Option<&mut Subprocess> {
        self.entries.iter_mut().find(|e| e.pid() == pid)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Subprocess> {
        self.entries.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Subprocess> {
        self.entries.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
