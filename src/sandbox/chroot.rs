use anyhow::{Context, Result};
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use super::apivfs::apivfs_cmd;
use super::invocation::SandboxInvocation;
use crate::types::InvokingUser;
use crate::util::{find_binary, shell_quote};

/**
 * Command prefix that runs a command with `root` as its filesystem root, on
 * top of [`apivfs_cmd`]. A scratch `/work` directory owned by `owner`
 * exists inside the root while the command runs and is removed afterwards,
 * whether it succeeded or not. With `resolve` set, the host's DNS
 * configuration is made available.
 */
pub fn chroot_cmd(
    root: &Path,
    owner: &InvokingUser,
    resolve: bool,
    options: &[OsString],
) -> Result<Vec<OsString>> {
    let work = shell_quote(&root.join("work").to_string_lossy());
    let cleanup = shell_quote(&format!("rm -rf {}", work));
    // No exec, the trap has to run once the command is done
    let script = format!(
        "trap {} EXIT && mkdir -p {} && chown {}:{} {} && $0 \"$@\"",
        cleanup, work, owner.uid, owner.gid, work
    );

    let mut sandbox = SandboxInvocation::new()
        .dev_bind(root, "/")
        .setenv("container", "rootstrap")
        .setenv("HOME", "/")
        .setenv("PATH", "/work/scripts:/usr/bin:/usr/sbin");

    if resolve {
        let mut resolv = PathBuf::from("etc/resolv.conf");
        let in_root = root.join(&resolv);
        // bwrap cannot create the target through a dangling symlink
        if in_root.is_symlink() {
            let target = std::fs::read_link(&in_root)
                .context(format!("failed to read link {}", in_root.display()))?;
            resolv = Path::new("etc").join(target);
        }
        sandbox = sandbox.ro_bind("/etc/resolv.conf", Path::new("/").join(resolv));
    }

    let chroot = sandbox
        .args(options.iter().cloned())
        .setpgid(find_binary(&["setpgid"], Some(root)))
        .into_args();

    let mut cmdline = apivfs_cmd(root)?;
    cmdline.extend(["sh", "-c"].map(OsString::from));
    cmdline.push(OsString::from(script));
    cmdline.extend(chroot);
    Ok(cmdline)
}
