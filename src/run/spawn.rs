use anyhow::{Result, anyhow};
use log::debug;
use nix::sys::signal::kill;
use nix::unistd::{Gid, Pid, Uid};
use std::ffi::OsStr;
use std::os::fd::RawFd;
use std::os::unix::process::CommandExt;
use std::process::{Child, ChildStderr, ChildStdin, ChildStdout};

use super::foreground::{ForegroundGuard, make_foreground_process};
use super::process::{Redirect, base_command, log_process_failure, spawn_error};
use super::signals::{check_interrupted, sigkill_to_sigterm, termination_signal};
use super::wait::wait_for_exit;
use crate::error::RootstrapError;
use crate::util::{os_to_strings, shell_join};

type PreExec = Box<dyn FnMut() -> std::io::Result<()> + Send + Sync>;

pub struct SpawnOptions {
    pub stdin: Option<Redirect>,
    pub stdout: Option<Redirect>,
    pub stderr: Option<Redirect>,
    pub user: Option<Uid>,
    pub group: Option<Gid>,
    pub pass_fds: Vec<RawFd>,
    pub env: Vec<(String, String)>,
    pub log: bool,
    pub foreground: bool,
    pub preexec: Option<PreExec>,
}

impl Default for SpawnOptions {
    fn default() -> Self {
        SpawnOptions {
            stdin: None,
            stdout: None,
            stderr: None,
            user: None,
            group: None,
            pass_fds: Vec::new(),
            env: Vec::new(),
            log: true,
            foreground: false,
            preexec: None,
        }
    }
}

impl SpawnOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stdin(mut self, stdin: Redirect) -> Self {
        self.stdin = Some(stdin);
        self
    }

    pub fn stdout(mut self, stdout: Redirect) -> Self {
        self.stdout = Some(stdout);
        self
    }

    pub fn stderr(mut self, stderr: Redirect) -> Self {
        self.stderr = Some(stderr);
        self
    }

    pub fn user(mut self, uid: Uid) -> Self {
        self.user = Some(uid);
        self
    }

    pub fn group(mut self, gid: Gid) -> Self {
        self.group = Some(gid);
        self
    }

    pub fn pass_fd(mut self, fd: RawFd) -> Self {
        self.pass_fds.push(fd);
        self
    }

    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.env.push((key.to_string(), value.to_string()));
        self
    }

    pub fn log(mut self, log: bool) -> Self {
        self.log = log;
        self
    }

    pub fn foreground(mut self, foreground: bool) -> Self {
        self.foreground = foreground;
        self
    }

    pub fn preexec<F>(mut self, preexec: F) -> Self
    where
        F: FnMut() -> std::io::Result<()> + Send + Sync + 'static,
    {
        self.preexec = Some(Box::new(preexec));
        self
    }
}

/// A child started by [`spawn`], alive for the duration of the scope.
pub struct SpawnedProcess {
    argv: Vec<String>,
    child: Child,
    returncode: Option<i32>,
    log: bool,
}

impl SpawnedProcess {
    pub fn argv(&self) -> &[String] {
        &self.argv
    }

    pub fn pid(&self) -> Pid {
        Pid::from_raw(self.child.id() as i32)
    }

    pub fn stdin(&mut self) -> Option<&mut ChildStdin> {
        self.child.stdin.as_mut()
    }

    pub fn stdout(&mut self) -> Option<&mut ChildStdout> {
        self.child.stdout.as_mut()
    }

    pub fn stderr(&mut self) -> Option<&mut ChildStderr> {
        self.child.stderr.as_mut()
    }

    pub fn returncode(&self) -> Option<i32> {
        self.returncode
    }

    /// Waits for the child and returns its exit code (negative for a signal).
    pub fn wait(&mut self) -> Result<i32> {
        if let Some(returncode) = self.returncode {
            return Ok(returncode);
        }
        // Close our end of stdin so children reading it can finish
        drop(self.child.stdin.take());
        let outcome = wait_for_exit(self.pid(), termination_signal())?;
        self.returncode = Some(outcome.returncode);
        if outcome.interrupted {
            return Err(RootstrapError::Interrupted.into());
        }
        Ok(outcome.returncode)
    }

    /// Waits for the child and turns a non-zero exit into a process failure.
    pub fn check(&mut self) -> Result<()> {
        let returncode = self.wait()?;
        if returncode != 0 {
            if self.log {
                log_process_failure(&self.argv, returncode);
            }
            return Err(
                RootstrapError::process_failure(&self.argv, returncode).into()
            );
        }
        Ok(())
    }

    /// Sends the current termination signal, see
    /// [`super::sigkill_to_sigterm`].
    pub fn terminate(&self) -> Result<()> {
        if self.returncode.is_some() {
            return Ok(());
        }
        let signal = termination_signal();
        debug!("Sending {} to \"{}\"", signal.as_str(), shell_join(&self.argv));
        kill(self.pid(), signal).map_err(|e| {
            anyhow!("Failed to signal process {}: {}", self.pid(), e)
        })
    }
}

/**
 * Starts a long-lived child and hands it to `body`. However `body` exits,
 * the child is reaped before we return: on success we simply wait for it,
 * on failure it is first sent SIGTERM. With `foreground` set, the child owns
 * the terminal until then.
 */
pub fn spawn<S, T, F>(cmdline: &[S], options: SpawnOptions, body: F) -> Result<T>
where
    S: AsRef<OsStr>,
    F: FnOnce(&mut SpawnedProcess) -> Result<T>,
{
    let argv = os_to_strings(cmdline);
    if argv.is_empty() {
        return Err(anyhow!("Cannot spawn an empty command line"));
    }

    debug!("+ {}", shell_join(&argv));

    let SpawnOptions {
        stdin,
        stdout,
        stderr,
        user,
        group,
        pass_fds,
        env,
        log,
        foreground,
        mut preexec,
    } = options;

    let mut command = base_command(cmdline, &env, user, group);

    let (stdout, stderr) = match (stdout, stderr) {
        (None, None) => (Redirect::Stderr, Redirect::Inherit),
        (stdout, stderr) => (
            stdout.unwrap_or(Redirect::Inherit),
            stderr.unwrap_or(Redirect::Inherit),
        ),
    };
    command
        .stdin(stdin.unwrap_or(Redirect::Inherit).into_stdio())
        .stdout(stdout.into_stdio())
        .stderr(stderr.into_stdio());

    unsafe {
        command.pre_exec(move || {
            if foreground {
                make_foreground_process(true)?;
            }
            for fd in &pass_fds {
                let flags = libc::fcntl(*fd, libc::F_GETFD);
                if flags < 0
                    || libc::fcntl(*fd, libc::F_SETFD, flags & !libc::FD_CLOEXEC)
                        < 0
                {
                    return Err(std::io::Error::last_os_error());
                }
            }
            if let Some(preexec) = preexec.as_mut() {
                preexec()?;
            }
            Ok(())
        });
    }

    check_interrupted()?;
    let _foreground = foreground.then(ForegroundGuard::new);
    let _sigterm = sigkill_to_sigterm();

    let child = command.spawn().map_err(|e| spawn_error(&argv, e))?;
    let mut process = SpawnedProcess {
        argv,
        child,
        returncode: None,
        log,
    };

    let result = body(&mut process);

    if result.is_err() && process.returncode.is_none() {
        let _ = process.terminate();
    }
    let waited = process.wait();

    match (result, waited) {
        (Err(e), _) => Err(e),
        (Ok(_), Err(e)) => Err(e),
        (Ok(value), Ok(_)) => Ok(value),
    }
}
