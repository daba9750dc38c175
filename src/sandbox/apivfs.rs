use anyhow::{Context, Result};
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use super::invocation::{BindMount, SandboxInvocation};
use crate::util::{find_binary, shell_quote};

/// Files that decide user and group lookups.
pub const IDENTITY_FILES: [&str; 4] = ["passwd", "group", "shadow", "gshadow"];

/**
 * Mounts that make commands resolve users and groups from `root` rather
 * than from the host. Each identity file the host has in `host_etc` is
 * covered by the root's copy, or by `/dev/null` while the root has none.
 */
pub fn finalize_passwd_mounts(root: &Path, host_etc: &Path) -> Vec<BindMount> {
    IDENTITY_FILES
        .iter()
        .filter(|name| host_etc.join(name).exists())
        .map(|name| {
            let ours = root.join("etc").join(name);
            let source = if ours.exists() {
                ours
            } else {
                PathBuf::from("/dev/null")
            };
            BindMount {
                source,
                target: host_etc.join(name),
                read_only: false,
            }
        })
        .collect()
}

fn quote(path: &Path) -> String {
    shell_quote(&path.to_string_lossy())
}

/// `bwrap` prefix giving commands that operate on `root` a populated
/// `/proc`, `/dev`, `/run` and `/tmp` inside it.
pub fn apivfs_cmd(root: &Path) -> Result<Vec<OsString>> {
    apivfs_cmd_with(root, Path::new("/etc"))
}

pub fn apivfs_cmd_with(root: &Path, host_etc: &Path) -> Result<Vec<OsString>> {
    let cwd = std::env::current_dir().context("failed to get current directory")?;
    let tmpdir = std::env::var_os("TMPDIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("/var/tmp"));

    let mut sandbox = SandboxInvocation::new()
        .dev_bind("/", "/")
        .chdir(&cwd)
        .tmpfs(root.join("run"))
        .tmpfs(root.join("tmp"))
        .bind(tmpdir, root.join("var/tmp"))
        .proc(root.join("proc"))
        .dev(root.join("dev"))
        .ro_bind("/sys", root.join("sys"))
        // Whatever runs next usually chroots into root
        .unsetenv("TMPDIR");

    // Post install scripts must not regenerate it
    let machine_id = root.join("etc/machine-id");
    if machine_id.exists() {
        sandbox = sandbox.ro_bind(&machine_id, &machine_id);
    }

    for mount in finalize_passwd_mounts(root, host_etc) {
        sandbox = sandbox.mount(&mount);
    }

    let chmod = format!(
        "chmod 1777 {} {} {}",
        quote(&root.join("tmp")),
        quote(&root.join("var/tmp")),
        quote(&root.join("dev/shm")),
    );
    let container = format!(
        "mkdir {} && echo rootstrap >{}",
        quote(&root.join("run/host")),
        quote(&root.join("run/host/container-manager")),
    );

    Ok(sandbox
        .setpgid(find_binary(&["setpgid"], None))
        .shell(&format!("{} && {} && exec $0 \"$@\"", chmod, container))
        .into_args())
}
