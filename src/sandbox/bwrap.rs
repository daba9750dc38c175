use anyhow::{Context, Result};
use log::debug;
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};

use super::invocation::{Namespace, SandboxInvocation};
use crate::error::{RootstrapError, find_rootstrap_error};
use crate::run::{CompletedProcess, Redirect, RunOptions, log_process_failure, run};
use crate::util::{Capabilities, Capability, find_binary, one_zero, os_to_strings};

#[derive(Debug, Default)]
pub struct BwrapOptions {
    pub network: bool,
    pub readonly: bool,
    /// Extra `bwrap` options, added after the standard ones so they win.
    pub options: Vec<OsString>,
    pub log: bool,
    pub scripts: Option<PathBuf>,
    pub env: Vec<(String, String)>,
    pub stdin: Option<Redirect>,
    pub stdout: Option<Redirect>,
    pub input: Option<String>,
    pub debug_shell: bool,
}

impl BwrapOptions {
    pub fn new() -> Self {
        BwrapOptions {
            log: true,
            ..Default::default()
        }
    }

    pub fn network(mut self, network: bool) -> Self {
        self.network = network;
        self
    }

    pub fn readonly(mut self, readonly: bool) -> Self {
        self.readonly = readonly;
        self
    }

    pub fn options<I, S>(mut self, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.options.extend(options.into_iter().map(Into::into));
        self
    }

    pub fn log(mut self, log: bool) -> Self {
        self.log = log;
        self
    }

    pub fn scripts(mut self, scripts: &Path) -> Self {
        self.scripts = Some(scripts.to_path_buf());
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

    pub fn stdin(mut self, stdin: Redirect) -> Self {
        self.stdin = Some(stdin);
        self
    }

    pub fn stdout(mut self, stdout: Redirect) -> Self {
        self.stdout = Some(stdout);
        self
    }

    pub fn input(mut self, input: &str) -> Self {
        self.input = Some(input.to_string());
        self
    }

    pub fn debug_shell(mut self, debug_shell: bool) -> Self {
        self.debug_shell = debug_shell;
        self
    }
}

/**
 * Whether a sandbox gets its own network namespace. Without network access
 * requested it normally does, but a process holding CAP_NET_ADMIN is
 * trusted to manage networking itself and is left on the host network.
 */
pub fn isolate_network(network: bool, caps: Capabilities) -> bool {
    if network {
        return false;
    }
    if caps.has(Capability::NetAdmin) {
        debug!("Have CAP_NET_ADMIN, not isolating the network");
        return false;
    }
    true
}

/// The `bwrap` prefix of [`bwrap`], up to the command it runs.
pub fn bwrap_cmdline(options: &BwrapOptions, cwd: &Path, caps: Capabilities) -> Vec<OsString> {
    let mut sandbox = SandboxInvocation::new().dev_bind("/", "/");

    if options.readonly {
        sandbox = sandbox
            .remount_ro("/")
            .ro_bind("/root", "/root")
            .ro_bind("/home", "/home")
            .ro_bind("/var", "/var")
            .ro_bind("/run", "/run")
            .bind("/var/tmp", "/var/tmp")
            .bind("/tmp", "/tmp")
            .bind(cwd, cwd);
    }

    sandbox = sandbox
        .chdir(cwd)
        .unshare(Namespace::Pid)
        .unshare(Namespace::Ipc)
        .unshare(Namespace::Cgroup);

    if isolate_network(options.network, caps) {
        sandbox = sandbox.unshare(Namespace::Net);
    }

    let mut path = OsString::new();
    if let Some(scripts) = &options.scripts {
        path.push(scripts);
        path.push(":");
    }
    path.push(std::env::var_os("PATH").unwrap_or_else(|| "/usr/bin:/usr/sbin".into()));

    sandbox
        .die_with_parent()
        .proc("/proc")
        .dev("/dev")
        .ro_bind("/sys", "/sys")
        .setenv("SYSTEMD_OFFLINE", one_zero(!options.network))
        .setenv("PATH", path)
        .args(options.options.iter().cloned())
        .shell("chmod 1777 /dev/shm && exec $0 \"$@\"")
        .setpgid(find_binary(&["setpgid"], None))
        .into_args()
}

/**
 * Runs `cmd` in a sandbox on top of the host filesystem with fresh pid, ipc
 * and cgroup namespaces.
 *
 * A failure is logged here once, against `cmd` rather than the whole
 * `bwrap` command line. With `debug_shell` set the user then gets a shell in
 * an identical sandbox before the failure is returned.
 */
pub fn bwrap<S: AsRef<OsStr>>(cmd: &[S], options: BwrapOptions) -> Result<CompletedProcess> {
    let cwd = std::env::current_dir().context("failed to get current directory")?;
    let prefix = bwrap_cmdline(&options, &cwd, Capabilities::current());

    let BwrapOptions {
        log,
        env,
        stdin,
        stdout,
        input,
        debug_shell,
        ..
    } = options;

    let mut cmdline = prefix.clone();
    cmdline.extend(cmd.iter().map(|c| c.as_ref().to_os_string()));

    let mut run_options = RunOptions::new().log(false).envs(env.clone());
    if let Some(stdin) = stdin {
        run_options = run_options.stdin(stdin);
    }
    if let Some(stdout) = stdout {
        run_options = run_options.stdout(stdout);
    }
    if let Some(input) = &input {
        run_options = run_options.input(input);
    }

    let err = match run(&cmdline, run_options) {
        Ok(result) => return Ok(result),
        Err(err) => err,
    };

    if let Some(RootstrapError::ProcessFailure { returncode, .. }) = find_rootstrap_error(&err) {
        if log {
            log_process_failure(&os_to_strings(cmd), *returncode);
        }
        if debug_shell {
            let mut shell = prefix;
            shell.push(OsString::from("sh"));
            let _ = run(
                &shell,
                RunOptions::new()
                    .stdin(Redirect::Inherit)
                    .check(false)
                    .envs(env)
                    .log(false),
            );
        }
    }

    Err(err)
}

#[cfg(test)]
mod tests {
    use super::*;

    const NET_ADMIN: u64 = 1 << 12;

    fn has(args: &[OsString], flag: &str) -> bool {
        args.iter().any(|a| a == flag)
    }

    fn setenv_value(args: &[OsString], key: &str) -> Option<OsString> {
        args.windows(3)
            .find(|w| w[0] == "--setenv" && w[1] == key)
            .map(|w| w[2].clone())
    }

    #[test]
    fn test_isolate_network_policy() {
        let none = Capabilities::from_bits(0);
        let net_admin = Capabilities::from_bits(NET_ADMIN);
        assert!(isolate_network(false, none));
        assert!(!isolate_network(false, net_admin));
        assert!(!isolate_network(true, none));
        assert!(!isolate_network(true, net_admin));
    }

    #[test]
    fn test_network_flag_follows_request() {
        let cwd = Path::new("/src");
        let caps = Capabilities::from_bits(0);

        let offline = bwrap_cmdline(&BwrapOptions::new(), cwd, caps);
        assert!(has(&offline, "--unshare-net"));
        assert_eq!(setenv_value(&offline, "SYSTEMD_OFFLINE").unwrap(), "1");

        let online = bwrap_cmdline(&BwrapOptions::new().network(true), cwd, caps);
        assert!(!has(&online, "--unshare-net"));
        assert_eq!(setenv_value(&online, "SYSTEMD_OFFLINE").unwrap(), "0");
    }

    #[test]
    fn test_always_unshares_pid_ipc_cgroup() {
        let args = bwrap_cmdline(&BwrapOptions::new(), Path::new("/src"), Capabilities::default());
        for flag in ["--unshare-pid", "--unshare-ipc", "--unshare-cgroup", "--die-with-parent"] {
            assert!(has(&args, flag), "missing {}", flag);
        }
        assert!(!has(&args, "--remount-ro"));
    }

    #[test]
    fn test_readonly_keeps_cwd_writable() {
        let args = bwrap_cmdline(
            &BwrapOptions::new().readonly(true),
            Path::new("/src"),
            Capabilities::default(),
        );
        let remount = args.iter().position(|a| a == "--remount-ro").unwrap();
        let cwd_bind = args
            .windows(3)
            .position(|w| w[0] == "--bind" && w[1] == "/src" && w[2] == "/src")
            .unwrap();
        assert!(remount < cwd_bind);
    }

    #[test]
    fn test_scripts_prepended_to_path() {
        let args = bwrap_cmdline(
            &BwrapOptions::new().scripts(Path::new("/scripts")),
            Path::new("/src"),
            Capabilities::default(),
        );
        let path = setenv_value(&args, "PATH").unwrap();
        assert!(path.to_string_lossy().starts_with("/scripts:"));
    }

    #[test]
    fn test_extra_options_come_before_command() {
        let args = bwrap_cmdline(
            &BwrapOptions::new().options(["--bind", "/a", "/b"]),
            Path::new("/src"),
            Capabilities::default(),
        );
        let extra = args.iter().position(|a| a == "/a").unwrap();
        let shell = args.iter().position(|a| a == "sh").unwrap();
        assert!(extra < shell);
    }
}
