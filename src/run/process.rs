use anyhow::{Context, Result, anyhow};
use log::{debug, error};
use nix::unistd::{Gid, Pid, Uid};
use std::collections::BTreeMap;
use std::ffi::OsStr;
use std::fs::File;
use std::io::{Read, Write};
use std::os::unix::process::CommandExt;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};

use super::foreground::{ForegroundGuard, make_foreground_process};
use super::signals::{
    block_interrupts_on_this_thread, check_interrupted, sigkill_to_sigterm,
    termination_signal,
};
use super::wait::wait_for_exit;
use crate::error::{RootstrapError, signal_name};
use crate::logger::debug_enabled;
use crate::util::{os_to_strings, shell_join};

/// Where a standard stream of a child goes.
#[derive(Debug)]
pub enum Redirect {
    Inherit,
    Null,
    /// Capture into [`CompletedProcess`].
    Pipe,
    File(File),
    /// Our own stderr, which is where our log output goes too.
    Stderr,
}

impl Redirect {
    pub(crate) fn into_stdio(self) -> Stdio {
        match self {
            Redirect::Inherit => Stdio::inherit(),
            Redirect::Null => Stdio::null(),
            Redirect::Pipe => Stdio::piped(),
            Redirect::File(file) => Stdio::from(file),
            Redirect::Stderr => Stdio::from(std::io::stderr()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedProcess {
    pub argv: Vec<String>,
    pub returncode: i32,
    pub stdout: Option<String>,
    pub stderr: Option<String>,
}

impl CompletedProcess {
    pub fn success(&self) -> bool {
        self.returncode == 0
    }
}

#[derive(Debug)]
pub struct RunOptions {
    pub check: bool,
    pub stdin: Option<Redirect>,
    pub stdout: Option<Redirect>,
    pub stderr: Option<Redirect>,
    pub input: Option<String>,
    pub user: Option<Uid>,
    pub group: Option<Gid>,
    pub env: Vec<(String, String)>,
    pub cwd: Option<PathBuf>,
    pub log: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        RunOptions {
            check: true,
            stdin: None,
            stdout: None,
            stderr: None,
            input: None,
            user: None,
            group: None,
            env: Vec::new(),
            cwd: None,
            log: true,
        }
    }
}

impl RunOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn check(mut self, check: bool) -> Self {
        self.check = check;
        self
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

    pub fn input(mut self, input: &str) -> Self {
        self.input = Some(input.to_string());
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

    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.env.push((key.to_string(), value.to_string()));
        self
    }

    pub fn envs<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        self.env.extend(
            vars.into_iter()
                .map(|(k, v)| (k.as_ref().to_string(), v.as_ref().to_string())),
        );
        self
    }

    pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn log(mut self, log: bool) -> Self {
        self.log = log;
        self
    }
}

/**
 * The environment children get: a fixed minimal base with the caller's
 * overlay on top. The host environment is never passed through wholesale.
 */
pub fn child_environment(overlay: &[(String, String)]) -> BTreeMap<String, String> {
    let mut env = BTreeMap::new();
    env.insert(
        "PATH".to_string(),
        std::env::var("PATH").unwrap_or("/usr/bin:/usr/sbin".to_string()),
    );
    env.insert(
        "TERM".to_string(),
        std::env::var("TERM").unwrap_or("vt220".to_string()),
    );
    env.insert("LANG".to_string(), "C.UTF-8".to_string());

    for (key, value) in overlay {
        env.insert(key.clone(), value.clone());
    }

    if let Ok(tmpdir) = std::env::var("TMPDIR") {
        env.insert("TMPDIR".to_string(), tmpdir);
    }

    if debug_enabled() {
        env.insert("SYSTEMD_LOG_LEVEL".to_string(), "debug".to_string());
    }

    env
}

pub fn log_process_failure(argv: &[String], returncode: i32) {
    if returncode < 0 {
        error!("Interrupted by {} signal", signal_name(-returncode));
    } else {
        error!(
            "\"{}\" returned non-zero exit code {}.",
            shell_join(argv),
            returncode
        );
    }
}

pub(crate) fn spawn_error(argv: &[String], e: std::io::Error) -> anyhow::Error {
    if e.kind() == std::io::ErrorKind::NotFound {
        RootstrapError::BinaryNotFound(argv[0].clone()).into()
    } else {
        anyhow!(e).context(format!("Failed to start \"{}\"", shell_join(argv)))
    }
}

pub(crate) fn base_command<S: AsRef<OsStr>>(
    cmdline: &[S],
    env: &[(String, String)],
    user: Option<Uid>,
    group: Option<Gid>,
) -> Command {
    let mut command = Command::new(&cmdline[0]);
    command
        .args(&cmdline[1..])
        .env_clear()
        .envs(child_environment(env));
    if let Some(uid) = user {
        command.uid(uid.as_raw());
    }
    if let Some(gid) = group {
        command.gid(gid.as_raw());
    }
    command
}

/**
 * Runs a command to completion. The child becomes the foreground process
 * group of our terminal while it runs and the terminal is handed back to
 * us on every return path.
 *
 * With `check` set, a non-zero exit is returned as
 * [`RootstrapError::ProcessFailure`]. If `log` is also set, the failure is
 * logged here, so callers must not log it again.
 */
pub fn run<S: AsRef<OsStr>>(
    cmdline: &[S],
    options: RunOptions,
) -> Result<CompletedProcess> {
    let argv = os_to_strings(cmdline);
    if argv.is_empty() {
        return Err(anyhow!("Cannot run an empty command line"));
    }

    debug!("+ {}", shell_join(&argv));

    let RunOptions {
        check,
        stdin,
        stdout,
        stderr,
        input,
        user,
        group,
        env,
        cwd,
        log,
    } = options;

    let mut command = base_command(cmdline, &env, user, group);
    if let Some(cwd) = &cwd {
        command.current_dir(cwd);
    }

    let stdin = match (&input, stdin) {
        (Some(_), Some(_)) => {
            return Err(anyhow!("stdin and input cannot both be specified"));
        }
        (Some(_), None) => Redirect::Pipe,
        (None, Some(stdin)) => stdin,
        (None, None) => Redirect::Null,
    };

    // Unless told otherwise, child output goes where our own output goes
    let (stdout, stderr) = match (stdout, stderr) {
        (None, None) => (Redirect::Stderr, Redirect::Inherit),
        (stdout, stderr) => (
            stdout.unwrap_or(Redirect::Inherit),
            stderr.unwrap_or(Redirect::Inherit),
        ),
    };

    command
        .stdin(stdin.into_stdio())
        .stdout(stdout.into_stdio())
        .stderr(stderr.into_stdio());

    unsafe {
        command.pre_exec(|| make_foreground_process(true));
    }

    check_interrupted()?;
    let _foreground = ForegroundGuard::new();
    let _sigterm = sigkill_to_sigterm();

    let mut child = command.spawn().map_err(|e| spawn_error(&argv, e))?;
    let (returncode, captured_stdout, captured_stderr, was_interrupted) =
        communicate(&mut child, input)?;

    if was_interrupted {
        return Err(RootstrapError::Interrupted.into());
    }

    if check && returncode != 0 {
        if log {
            log_process_failure(&argv, returncode);
        }
        return Err(RootstrapError::process_failure(&argv, returncode).into());
    }

    Ok(CompletedProcess {
        argv,
        returncode,
        stdout: captured_stdout,
        stderr: captured_stderr,
    })
}

fn read_pipe<R: Read>(mut pipe: R) -> String {
    block_interrupts_on_this_thread();
    let mut buf = Vec::new();
    let _ = pipe.read_to_end(&mut buf);
    String::from_utf8_lossy(&buf).into_owned()
}

/* Feeds `input`, drains captured pipes on helper threads and waits for the
 * child on this thread, which is the one that sees interrupts. */
fn communicate(
    child: &mut Child,
    input: Option<String>,
) -> Result<(i32, Option<String>, Option<String>, bool)> {
    let pid = Pid::from_raw(child.id() as i32);
    let stdin = child.stdin.take();
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    std::thread::scope(|scope| {
        if let Some(mut stdin) = stdin {
            let input = input.unwrap_or_default();
            scope.spawn(move || {
                block_interrupts_on_this_thread();
                let _ = stdin.write_all(input.as_bytes());
            });
        }
        let stdout = stdout.map(|pipe| scope.spawn(move || read_pipe(pipe)));
        let stderr = stderr.map(|pipe| scope.spawn(move || read_pipe(pipe)));

        let outcome = wait_for_exit(pid, termination_signal())
            .context("Waiting for child process")?;

        let stdout = stdout.and_then(|reader| reader.join().ok());
        let stderr = stderr.and_then(|reader| reader.join().ok());

        Ok((outcome.returncode, stdout, stderr, outcome.interrupted))
    })
}
