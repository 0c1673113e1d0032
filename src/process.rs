//! Child processes that own their process group, so that a timeout can take
//! down everything a solver spawned.

use log::{debug, warn};
use std::io::{self, Read};
use std::os::unix::process::CommandExt;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver};
use std::thread;
use std::time::{Duration, Instant};

/// How long each escalation step waits for the group to go away.
pub const GRACE_PERIOD: Duration = Duration::from_secs(5);

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Upper bound on waiting for the output pipes after the group is gone.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// What to do with a process group whose time is up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// SIGKILL right away.
    Kill,
    /// SIGTERM, wait, then SIGKILL and wait again.
    Escalate { grace: Duration },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
    Exited(ExitStatus),
    /// `graceful` is set when the group stopped on SIGTERM alone.
    TimedOut { graceful: bool },
}

#[derive(Debug)]
pub struct Execution {
    pub exit: Exit,
    pub stdout: String,
    pub stderr: String,
    pub elapsed: Duration,
}

fn signal_group(pgid: libc::pid_t, signal: libc::c_int) -> io::Result<()> {
    let ret = unsafe { libc::killpg(pgid, signal) };
    if ret == -1 {
        let err = io::Error::last_os_error();
        // the group is already gone
        if err.raw_os_error() == Some(libc::ESRCH) {
            return Ok(());
        }
        return Err(err);
    }
    Ok(())
}

fn group_exists(pgid: libc::pid_t) -> io::Result<bool> {
    let ret = unsafe { libc::killpg(pgid, 0) };
    if ret == 0 {
        return Ok(true);
    }
    let err = io::Error::last_os_error();
    match err.raw_os_error() {
        Some(libc::ESRCH) => Ok(false),
        // a member we may not signal still counts
        Some(libc::EPERM) => Ok(true),
        _ => Err(err),
    }
}

/// A child started as leader of a fresh process group. Dropping it kills
/// whatever is left of the group.
pub struct ProcessGroup {
    child: Child,
    pgid: libc::pid_t,
    status: Option<ExitStatus>,
    gone: bool,
}

impl ProcessGroup {
    pub fn spawn(command: &mut Command) -> io::Result<Self> {
        command.process_group(0);
        let child = command.spawn()?;
        let pgid = child.id() as libc::pid_t;
        Ok(Self {
            child,
            pgid,
            status: None,
            gone: false,
        })
    }

    pub fn id(&self) -> u32 {
        self.child.id()
    }

    pub fn child_mut(&mut self) -> &mut Child {
        &mut self.child
    }

    pub fn signal(&self, signal: libc::c_int) -> io::Result<()> {
        signal_group(self.pgid, signal)
    }

    /// Reaps the leader if it has exited. Other members are left alone.
    pub fn try_wait(&mut self) -> io::Result<Option<ExitStatus>> {
        if self.status.is_none() {
            self.status = self.child.try_wait()?;
        }
        Ok(self.status)
    }

    /// Waits for the leader to exit, giving up after `timeout`.
    pub fn wait_timeout(&mut self, timeout: Duration) -> io::Result<Option<ExitStatus>> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(status) = self.try_wait()? {
                return Ok(Some(status));
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            thread::sleep(POLL_INTERVAL.min(deadline - now));
        }
    }

    /// Waits up to `timeout` for every member of the group to exit, reaping
    /// the leader on the way. Returns whether the group is gone.
    pub fn wait_group(&mut self, timeout: Duration) -> io::Result<bool> {
        let deadline = Instant::now() + timeout;
        loop {
            // an unreaped leader keeps the group alive as a zombie
            if self.try_wait()?.is_some() && !group_exists(self.pgid)? {
                self.gone = true;
                return Ok(true);
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(false);
            }
            thread::sleep(POLL_INTERVAL.min(deadline - now));
        }
    }

    /// SIGKILL to members that outlived the leader.
    pub fn sweep(&mut self) -> io::Result<()> {
        if self.gone {
            return Ok(());
        }
        self.signal(libc::SIGKILL)?;
        self.gone = self.try_wait()?.is_some();
        Ok(())
    }

    /// SIGKILL to the whole group, then wait up to `grace` for it to go away.
    pub fn kill(&mut self, grace: Duration) -> io::Result<bool> {
        debug!("killing process group {}", self.pgid);
        self.signal(libc::SIGKILL)?;
        self.wait_group(grace)
    }

    /// SIGTERM to the whole group and wait up to `grace` for every member to
    /// exit; if some are still around, SIGKILL and wait up to `grace` again.
    /// Returns whether SIGTERM alone was enough.
    pub fn terminate(&mut self, grace: Duration) -> io::Result<bool> {
        debug!("sending SIGTERM to process group {}", self.pgid);
        self.signal(libc::SIGTERM)?;
        if self.wait_group(grace)? {
            return Ok(true);
        }
        warn!(
            "process group {} ignored SIGTERM for {:?}, sending SIGKILL",
            self.pgid, grace
        );
        if !self.kill(grace)? {
            warn!("process group {} survived SIGKILL for {:?}", self.pgid, grace);
        }
        Ok(false)
    }
}

impl Drop for ProcessGroup {
    fn drop(&mut self) {
        if self.gone {
            return;
        }
        // the leader is unreaped or members remain, so the id is still ours
        let _ = self.signal(libc::SIGKILL);
        if self.status.is_none() {
            let _ = self.child.wait();
        }
    }
}

fn drain<R: Read + Send + 'static>(mut reader: R) -> Receiver<Vec<u8>> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = reader.read_to_end(&mut buf);
        let _ = tx.send(buf);
    });
    rx
}

fn collect(rx: Option<Receiver<Vec<u8>>>, timeout: Duration) -> String {
    rx.and_then(|rx| rx.recv_timeout(timeout).ok())
        .map(|buf| String::from_utf8_lossy(&buf).into_owned())
        .unwrap_or_default()
}

/// Runs `command` in its own process group with `stdin`, capturing stdout and
/// stderr, and enforces `timeout` with the given termination policy. The
/// elapsed time covers spawning up to collecting the output, including any
/// termination waits.
pub fn execute(
    command: &mut Command,
    stdin: Stdio,
    timeout: Duration,
    termination: Termination,
) -> io::Result<Execution> {
    command
        .stdin(stdin)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let start = Instant::now();
    let mut group = ProcessGroup::spawn(command)?;
    let stdout = group.child_mut().stdout.take().map(drain);
    let stderr = group.child_mut().stderr.take().map(drain);

    let exit = match group.wait_timeout(timeout)? {
        Some(status) => {
            // stragglers would keep the output pipes open
            group.sweep()?;
            Exit::Exited(status)
        }
        None => match termination {
            Termination::Kill => {
                group.kill(GRACE_PERIOD)?;
                Exit::TimedOut { graceful: false }
            }
            Termination::Escalate { grace } => Exit::TimedOut {
                graceful: group.terminate(grace)?,
            },
        },
    };

    let stdout = collect(stdout, DRAIN_TIMEOUT);
    let stderr = collect(stderr, DRAIN_TIMEOUT);
    let elapsed = start.elapsed();
    if let Exit::Exited(status) = exit {
        if !status.success() {
            debug!("process {} exited with {}", group.id(), status);
        }
    }
    Ok(Execution {
        exit,
        stdout,
        stderr,
        elapsed,
    })
}
