//! Integration tests for the abort path
//!
//! These spawn real child processes and check that `shutdown` leaves none of
//! them running, whichever way they react to signals.

#![cfg(unix)]

use std::cell::RefCell;
use std::os::unix::process::CommandExt;
use std::process::Command;
use std::rc::Rc;
use std::time::Duration;

use mx_config::testing::CaptureBuffer;
use mx_config::Options;
use mx_system::{
    AbortReport, Console, Handle, Os, ProcessSignals, Result, Session, Subprocess,
    DEFAULT_KILL_SIGNAL,
};

fn session(options: Options) -> (Session, CaptureBuffer, CaptureBuffer) {
    let out = CaptureBuffer::new();
    let err = CaptureBuffer::new();
    let mut session = Session::new(Os::Linux, Console::with_writers(out.clone(), err.clone()));
    session.configure(options).unwrap();
    (session, out, err)
}

fn spawn_leader(script: &str) -> std::process::Child {
    Command::new("sh")
        .args(["-c", script])
        .process_group(0)
        .spawn()
        .unwrap()
}

fn all_dead(session: &mut Session) -> bool {
    for _ in 0..50 {
        if session.subprocesses.iter_mut().all(|e| !e.is_alive()) {
            return true;
        }
        std::thread::sleep(Duration::from_millis(100));
    }
    false
}

/// Records calls and only honours force kills.
#[derive(Clone, Default)]
struct RecordingSignals {
    calls: Rc<RefCell<Vec<String>>>,
}

impl ProcessSignals for RecordingSignals {
    fn terminate(&self, _: &mut Console, entry: &mut Subprocess, signal: i32) -> Result<()> {
        self.calls
            .borrow_mut()
            .push(format!("terminate {} {}", entry.command_line(), signal));
        Ok(())
    }

    fn force_kill(&self, _: &mut Console, entry: &mut Subprocess) -> Result<()> {
        self.calls
            .borrow_mut()
            .push(format!("force_kill {}", entry.command_line()));
        if let Handle::Child(child) = entry.handle_mut() {
            child.kill()?;
            child.wait()?;
        }
        Ok(())
    }

    fn send_diagnostic_signal(&self, _: &mut Console, entry: &mut Subprocess) -> Result<()> {
        self.calls
            .borrow_mut()
            .push(format!("diagnostic {}", entry.command_line()));
        Ok(())
    }
}

/// Fails every request.
struct FailingSignals;

impl ProcessSignals for FailingSignals {
    fn terminate(&self, _: &mut Console, _: &mut Subprocess, _: i32) -> Result<()> {
        Err(std::io::Error::other("terminate refused").into())
    }

    fn force_kill(&self, _: &mut Console, _: &mut Subprocess) -> Result<()> {
        Err(std::io::Error::other("kill refused").into())
    }

    fn send_diagnostic_signal(&self, _: &mut Console, _: &mut Subprocess) -> Result<()> {
        Ok(())
    }
}

#[test]
fn test_shutdown_terminates_children() {
    let (mut session, _, err) = session(Options::default());
    let first = Command::new("sleep").arg("30").process_group(0).spawn().unwrap();
    let second = Command::new("sleep").arg("30").process_group(0).spawn().unwrap();
    session.subprocesses.register_child(first, vec!["sleep".into(), "30".into()]);
    session.subprocesses.register_child(second, vec!["sleep".into(), "30".into()]);

    let report = session.shutdown("boom", Some(&"ctx"), DEFAULT_KILL_SIGNAL);

    assert_eq!(
        report,
        AbortReport {
            status: 1,
            message: "ctx:\nboom".to_string()
        }
    );
    assert!(all_dead(&mut session));
    assert_eq!(err.contents(), "ctx:\nboom\n");
}

#[test]
fn test_shutdown_escalates_when_term_is_ignored() {
    let (mut session, _, _) = session(Options::default());
    let child = spawn_leader("trap '' TERM; sleep 30");
    session
        .subprocesses
        .register_child(child, vec!["sh".into(), "stubborn".into()]);
    // Let the shell install its trap.
    std::thread::sleep(Duration::from_millis(200));

    let report = session.shutdown(3, None, DEFAULT_KILL_SIGNAL);

    assert_eq!(report.status, 3);
    assert!(all_dead(&mut session));
}

#[test]
fn test_escalation_order() {
    let signals = RecordingSignals::default();
    let calls = signals.calls.clone();

    let out = CaptureBuffer::new();
    let mut session = Session::new(Os::Linux, Console::with_writers(out, std::io::sink()))
        .with_signals(Box::new(signals));
    session
        .configure(Options {
            kill_with_sigquit: true,
            ..Options::default()
        })
        .unwrap();

    let java = Command::new("sleep").arg("30").spawn().unwrap();
    let other = Command::new("sleep").arg("30").spawn().unwrap();
    session
        .subprocesses
        .register_child(java, vec!["/usr/bin/java".into(), "-jar".into(), "app.jar".into()]);
    session.subprocesses.register_child(other, vec!["make".into()]);

    session.shutdown(0, None, 15);

    assert_eq!(
        *calls.borrow(),
        vec![
            "diagnostic /usr/bin/java -jar app.jar".to_string(),
            "terminate /usr/bin/java -jar app.jar 15".to_string(),
            "force_kill /usr/bin/java -jar app.jar".to_string(),
            "terminate make 15".to_string(),
            "force_kill make".to_string(),
        ]
    );
}

#[test]
fn test_dead_children_are_skipped() {
    let signals = RecordingSignals::default();
    let calls = signals.calls.clone();
    let mut session = Session::new(Os::Linux, Console::with_writers(std::io::sink(), std::io::sink()))
        .with_signals(Box::new(signals));
    session.configure(Options::default()).unwrap();

    let mut done = Command::new("true").spawn().unwrap();
    done.wait().unwrap();
    session.subprocesses.register_child(done, vec!["true".into()]);

    let report = session.shutdown(0, None, DEFAULT_KILL_SIGNAL);

    assert!(calls.borrow().is_empty());
    assert_eq!(report.message, "");
}

#[test]
fn test_kill_failures_are_reported_and_loop_continues() {
    let out = CaptureBuffer::new();
    let err = CaptureBuffer::new();
    let mut session = Session::new(Os::Linux, Console::with_writers(out.clone(), err.clone()))
        .with_signals(Box::new(FailingSignals));
    session.configure(Options::default()).unwrap();

    let a = Command::new("sleep").arg("30").spawn().unwrap();
    let b = Command::new("sleep").arg("30").spawn().unwrap();
    let a_pid = session.subprocesses.register_child(a, vec!["sleep".into(), "a".into()]);
    let b_pid = session.subprocesses.register_child(b, vec!["sleep".into(), "b".into()]);

    let report = session.shutdown("failed", None, DEFAULT_KILL_SIGNAL);
    assert_eq!(report.status, 1);

    let out = out.contents();
    assert!(out.contains(&format!("Error killing subprocess {a_pid}")));
    assert!(out.contains(&format!("Error killing subprocess {b_pid}")));
    let err = err.contents();
    assert!(err.contains(&format!("error while killing subprocess {a_pid} \"sleep a\"")));
    assert!(err.contains(&format!("error while killing subprocess {b_pid} \"sleep b\"")));
    assert!(err.ends_with("failed\n"));

    for entry in session.subprocesses.iter_mut() {
        if let Handle::Child(child) = entry.handle_mut() {
            child.kill().unwrap();
            child.wait().unwrap();
        }
    }
}

#[test]
fn test_verbose_shutdown_prints_stack() {
    let (mut session, _, err) = session(Options {
        verbose: true,
        ..Options::default()
    });

    session.shutdown("boom", None, DEFAULT_KILL_SIGNAL);

    let err = err.contents();
    assert!(err.ends_with("boom\n"));
    assert!(err.len() > "boom\n".len());
}

#[test]
fn test_abort_or_warn_warns_without_aborting() {
    let (mut session, _, err) = session(Options::default());
    session.abort_or_warn("careful", false, Some(&"step"));
    assert_eq!(err.contents(), "WARNING: step:\ncareful\n");
}

#[test]
fn test_kill_process_through_session() {
    let (mut session, out, _) = session(Options::default());
    let child = Command::new("sleep").arg("30").process_group(0).spawn().unwrap();
    let pid = session.subprocesses.register_child(child, vec!["sleep".into()]);

    assert!(session.kill_process(pid, libc::SIGKILL));
    assert!(all_dead(&mut session));
    assert!(!session.kill_process(pid, 9999));
    // The bad signal is reported against the process it was meant for.
    assert!(out
        .contents()
        .contains(&format!("Error killing subprocess {pid}: Failed to send 9999 to {pid}:")));
}
