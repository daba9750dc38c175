use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};

/// Host namespaces a sandbox can be detached from. The mount namespace is
/// always new, so it is not listed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    Pid,
    Ipc,
    Cgroup,
    Net,
}

impl Namespace {
    pub fn flag(self) -> &'static str {
        match self {
            Namespace::Pid => "--unshare-pid",
            Namespace::Ipc => "--unshare-ipc",
            Namespace::Cgroup => "--unshare-cgroup",
            Namespace::Net => "--unshare-net",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindMount {
    pub source: PathBuf,
    pub target: PathBuf,
    pub read_only: bool,
}

/**
 * The argument list of one `bwrap` call. Options are emitted in the order
 * they are added, so broader mounts must be added before the narrower ones
 * that override them. Once [`SandboxInvocation::into_args`] has been called
 * the list is handed off and never changes again.
 */
#[derive(Debug, Clone)]
pub struct SandboxInvocation {
    args: Vec<OsString>,
}

impl Default for SandboxInvocation {
    fn default() -> Self {
        Self::new()
    }
}

impl SandboxInvocation {
    pub fn new() -> Self {
        SandboxInvocation {
            args: vec![OsString::from("bwrap")],
        }
    }

    fn push(mut self, flag: &str, values: &[&OsStr]) -> Self {
        self.args.push(OsString::from(flag));
        self.args.extend(values.iter().map(|v| v.to_os_string()));
        self
    }

    pub fn dev_bind(self, source: impl AsRef<Path>, target: impl AsRef<Path>) -> Self {
        self.push(
            "--dev-bind",
            &[source.as_ref().as_os_str(), target.as_ref().as_os_str()],
        )
    }

    pub fn bind(self, source: impl AsRef<Path>, target: impl AsRef<Path>) -> Self {
        self.push(
            "--bind",
            &[source.as_ref().as_os_str(), target.as_ref().as_os_str()],
        )
    }

    pub fn ro_bind(self, source: impl AsRef<Path>, target: impl AsRef<Path>) -> Self {
        self.push(
            "--ro-bind",
            &[source.as_ref().as_os_str(), target.as_ref().as_os_str()],
        )
    }

    pub fn mount(self, mount: &BindMount) -> Self {
        if mount.read_only {
            self.ro_bind(&mount.source, &mount.target)
        } else {
            self.bind(&mount.source, &mount.target)
        }
    }

    pub fn remount_ro(self, path: impl AsRef<Path>) -> Self {
        self.push("--remount-ro", &[path.as_ref().as_os_str()])
    }

    pub fn tmpfs(self, path: impl AsRef<Path>) -> Self {
        self.push("--tmpfs", &[path.as_ref().as_os_str()])
    }

    pub fn proc(self, path: impl AsRef<Path>) -> Self {
        self.push("--proc", &[path.as_ref().as_os_str()])
    }

    pub fn dev(self, path: impl AsRef<Path>) -> Self {
        self.push("--dev", &[path.as_ref().as_os_str()])
    }

    pub fn chdir(self, path: impl AsRef<Path>) -> Self {
        self.push("--chdir", &[path.as_ref().as_os_str()])
    }

    pub fn unshare(self, namespace: Namespace) -> Self {
        self.push(namespace.flag(), &[])
    }

    pub fn die_with_parent(self) -> Self {
        self.push("--die-with-parent", &[])
    }

    pub fn setenv(self, key: &str, value: impl AsRef<OsStr>) -> Self {
        self.push("--setenv", &[OsStr::new(key), value.as_ref()])
    }

    pub fn unsetenv(self, key: &str) -> Self {
        self.push("--unsetenv", &[OsStr::new(key)])
    }

    /// Appends raw arguments, either extra options from the caller or the
    /// start of the command to run.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Runs the command through `setpgid --foreground` when we found one,
    /// so it gets its own process group owning the terminal.
    pub fn setpgid(self, setpgid: Option<PathBuf>) -> Self {
        match setpgid {
            Some(setpgid) => self.args([
                setpgid.into_os_string(),
                OsString::from("--foreground"),
                OsString::from("--"),
            ]),
            None => self,
        }
    }

    /// Runs `script` with `sh -c` which ends with `exec $0 "$@"`, handing
    /// over to whatever follows.
    pub fn shell(self, script: &str) -> Self {
        self.args(["sh", "-c", script])
    }

    pub fn into_args(self) -> Vec<OsString> {
        self.args
    }
}

/// Number of values each `bwrap` option we emit takes.
fn arity(flag: &OsStr) -> Option<usize> {
    let arity = match flag.to_str()? {
        "--dev-bind" | "--bind" | "--ro-bind" | "--setenv" => 2,
        "--remount-ro" | "--tmpfs" | "--proc" | "--dev" | "--chdir" | "--unsetenv" => 1,
        "--unshare-pid" | "--unshare-ipc" | "--unshare-cgroup" | "--unshare-net"
        | "--die-with-parent" => 0,
        _ => return None,
    };
    Some(arity)
}

/**
 * Reads the bind mounts back out of the options of the first `bwrap` call
 * in `args`, stopping at its command.
 */
pub fn parse_mounts(args: &[OsString]) -> Vec<BindMount> {
    let mut mounts = Vec::new();
    let mut i = usize::from(args.first().is_some_and(|a| a == "bwrap"));

    while i < args.len() {
        let flag = &args[i];
        let Some(arity) = arity(flag) else {
            break;
        };
        if i + arity >= args.len() {
            break;
        }
        let read_only = match flag.to_str() {
            Some("--ro-bind") => Some(true),
            Some("--bind" | "--dev-bind") => Some(false),
            _ => None,
        };
        if let Some(read_only) = read_only {
            mounts.push(BindMount {
                source: PathBuf::from(&args[i + 1]),
                target: PathBuf::from(&args[i + 2]),
                read_only,
            });
        }
        i += arity + 1;
    }

    mounts
}
