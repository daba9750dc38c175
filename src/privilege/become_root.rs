use anyhow::{Context, Result};
use log::{debug, trace};
use nix::sched::{CloneFlags, unshare};
use nix::unistd::{Gid, Pid, Uid, getpid, getuid, setgroups, setresgid, setresuid};
use std::path::{Path, PathBuf};

use super::subrange::{SUBRANGE, SubIdRange, read_subrange};
use crate::run::{RunOptions, SpawnOptions, run, spawn};
use crate::types::InvokingUser;
use crate::util::Lock;

/// Where the invoking user shows up inside the namespace. The last id of
/// the range is left alone since tools commonly use it as a default.
pub const INVOKER_SLOT: u32 = SUBRANGE - 100;

/// The subordinate id records. The uid file doubles as the lock that
/// orders us against the mapping helpers.
#[derive(Debug, Clone)]
pub struct SubIdFiles {
    pub subuid: PathBuf,
    pub subgid: PathBuf,
}

impl Default for SubIdFiles {
    fn default() -> Self {
        SubIdFiles {
            subuid: PathBuf::from("/etc/subuid"),
            subgid: PathBuf::from("/etc/subgid"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceMapping {
    pub uid_range: SubIdRange,
    pub gid_range: SubIdRange,
    pub uid: Uid,
    pub gid: Gid,
}

impl NamespaceMapping {
    pub fn read(files: &SubIdFiles, user: &InvokingUser) -> Result<NamespaceMapping> {
        let name = user.name.as_deref();
        Ok(NamespaceMapping {
            uid_range: read_subrange(&files.subuid, user.uid, name)?,
            gid_range: read_subrange(&files.subgid, user.uid, name)?,
            uid: user.uid,
            gid: user.gid,
        })
    }

    pub fn newuidmap_cmdline(&self, lock: &Path, pid: Pid) -> Vec<String> {
        helper_cmdline("newuidmap", lock, pid, self.uid_range.start, self.uid.as_raw())
    }

    pub fn newgidmap_cmdline(&self, lock: &Path, pid: Pid) -> Vec<String> {
        helper_cmdline("newgidmap", lock, pid, self.gid_range.start, self.gid.as_raw())
    }
}

/* root -> start of the range, the invoker -> INVOKER_SLOT, and the 99 ids
 * above the slot pass through to the rest of the range. The helper only
 * runs once it gets the lock. */
fn helper_cmdline(helper: &str, lock: &Path, pid: Pid, start: u32, id: u32) -> Vec<String> {
    let mut cmdline = vec![
        "flock".to_string(),
        "--exclusive".to_string(),
        "--no-fork".to_string(),
        lock.display().to_string(),
        helper.to_string(),
        pid.to_string(),
    ];
    let entries = [
        [0, start, INVOKER_SLOT],
        [INVOKER_SLOT, id, 1],
        [INVOKER_SLOT + 1, start + INVOKER_SLOT + 1, 99],
    ];
    cmdline.extend(entries.iter().flatten().map(u32::to_string));
    cmdline
}

/**
 * Moves us into a new user namespace in which we are root, built from the
 * invoking user's subordinate id ranges. Returns the identity the invoking
 * user has inside the namespace, which is what later chown and run-as
 * operations must use.
 *
 * Already being root makes this a no-op.
 */
pub fn become_root(user: &InvokingUser) -> Result<InvokingUser> {
    become_root_with(&SubIdFiles::default(), user)
}

pub fn become_root_with(files: &SubIdFiles, user: &InvokingUser) -> Result<InvokingUser> {
    if getuid().is_root() {
        trace!("Already root, not creating a user namespace");
        return Ok(user.clone());
    }

    let lock = Lock::exclusive(&files.subuid)?;
    let mapping = NamespaceMapping::read(files, user)?;
    debug!(
        "Mapping {} to {} inside a new user namespace",
        user.display_name(),
        INVOKER_SLOT
    );

    let pid = getpid();
    let newuidmap = mapping.newuidmap_cmdline(&files.subuid, pid);
    let newgidmap = mapping.newgidmap_cmdline(&files.subuid, pid);

    // The helpers block on the lock until the namespace exists
    spawn(&newuidmap, SpawnOptions::new(), |uidmap| {
        spawn(&newgidmap, SpawnOptions::new(), |gidmap| {
            unshare(CloneFlags::CLONE_NEWUSER)
                .context("failed to unshare user namespace")?;
            lock.release()?;
            uidmap.check()?;
            gidmap.check()
        })
    })?;

    let root_uid = Uid::from_raw(0);
    let root_gid = Gid::from_raw(0);
    setresuid(root_uid, root_uid, root_uid).context("failed to become uid 0")?;
    setresgid(root_gid, root_gid, root_gid).context("failed to become gid 0")?;
    setgroups(&[root_gid]).context("failed to set supplementary groups")?;

    Ok(user.remapped(Uid::from_raw(INVOKER_SLOT), Gid::from_raw(INVOKER_SLOT)))
}

/// Gives us a private mount namespace whose mounts never propagate back to
/// the host.
pub fn init_mount_namespace() -> Result<()> {
    unshare(CloneFlags::CLONE_NEWNS).context("failed to unshare mount namespace")?;
    run(&["mount", "--make-rslave", "/"], RunOptions::new())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{RootstrapError, find_rootstrap_error};
    use std::fs;

    fn user() -> InvokingUser {
        InvokingUser {
            uid: Uid::from_raw(1000),
            gid: Gid::from_raw(1000),
            name: Some("builder".to_string()),
        }
    }

    fn files(dir: &Path, subuid: &str, subgid: &str) -> SubIdFiles {
        let files = SubIdFiles {
            subuid: dir.join("subuid"),
            subgid: dir.join("subgid"),
        };
        fs::write(&files.subuid, subuid).unwrap();
        fs::write(&files.subgid, subgid).unwrap();
        files
    }

    #[test]
    fn test_helper_cmdlines() {
        let dir = tempfile::tempdir().unwrap();
        let files = files(dir.path(), "builder:100000:65536\n", "builder:200000:65536\n");
        let mapping = NamespaceMapping::read(&files, &user()).unwrap();

        let uidmap = mapping.newuidmap_cmdline(Path::new("/etc/subuid"), Pid::from_raw(42));
        assert_eq!(
            uidmap,
            [
                "flock", "--exclusive", "--no-fork", "/etc/subuid", "newuidmap", "42",
                "0", "100000", "65436",
                "65436", "1000", "1",
                "65437", "165437", "99",
            ]
        );

        let gidmap = mapping.newgidmap_cmdline(Path::new("/etc/subuid"), Pid::from_raw(42));
        assert_eq!(gidmap[4], "newgidmap");
        assert_eq!(&gidmap[6..9], ["0", "200000", "65436"]);
        assert_eq!(&gidmap[12..], ["65437", "265437", "99"]);
    }

    #[test]
    fn test_short_range_fails_before_unshare() {
        let dir = tempfile::tempdir().unwrap();
        let files = files(dir.path(), "builder:100000:1000\n", "builder:100000:65536\n");
        let result = become_root_with(&files, &user());

        if getuid().is_root() {
            // Real root never reads the records
            assert_eq!(result.unwrap(), user());
            return;
        }
        let err = result.unwrap_err();
        assert!(matches!(
            find_rootstrap_error(&err),
            Some(RootstrapError::PrivilegeSetup(_))
        ));
        // Still in the namespace we started in
        assert!(!getuid().is_root());
    }

    #[test]
    fn test_missing_record_fails() {
        let dir = tempfile::tempdir().unwrap();
        let files = files(dir.path(), "other:100000:65536\n", "other:100000:65536\n");
        if getuid().is_root() {
            return;
        }
        let err = become_root_with(&files, &user()).unwrap_err();
        assert_eq!(err.to_string(), format!("No mapping found for builder in {}", files.subuid.display()));
    }

    #[test]
    fn test_root_is_noop() {
        if !getuid().is_root() {
            return;
        }
        let files = SubIdFiles {
            subuid: PathBuf::from("/nonexistent/subuid"),
            subgid: PathBuf::from("/nonexistent/subgid"),
        };
        let root = InvokingUser {
            uid: Uid::from_raw(0),
            gid: Gid::from_raw(0),
            name: Some("root".to_string()),
        };
        assert_eq!(become_root_with(&files, &root).unwrap(), root);
    }
}
