use anyhow::Result;
use rand::Rng;
use rootstrap::sandbox::{
    BindMount, BwrapOptions, IDENTITY_FILES, apivfs_cmd_with, bwrap_cmdline, chroot_cmd,
    parse_mounts,
};
use rootstrap::types::InvokingUser;
use rootstrap::util::Capabilities;
use rstest::*;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

const CAP_NET_ADMIN: u64 = 1 << 12;

fn setenv_value(args: &[OsString], key: &str) -> Option<OsString> {
    args.windows(3)
        .find(|w| w[0] == "--setenv" && w[1] == key)
        .map(|w| w[2].clone())
}

/* Whatever else the process holds, the network namespace is unshared
 * exactly when no network was requested and CAP_NET_ADMIN is missing. */
#[rstest]
fn test_network_isolation_across_capability_sets(
    #[values(false, true)] network: bool,
    #[values(false, true)] readonly: bool,
) {
    let mut rng = rand::rng();
    for _ in 0..64 {
        let bits: u64 = rng.random();
        let caps = Capabilities::from_bits(bits);
        let options = BwrapOptions::new().network(network).readonly(readonly);
        let args = bwrap_cmdline(&options, Path::new("/src"), caps);

        let unshared = args.iter().any(|a| a == "--unshare-net");
        assert_eq!(
            unshared,
            !network && bits & CAP_NET_ADMIN == 0,
            "caps {:#x} network {}",
            bits,
            network
        );
        let offline = if network { "0" } else { "1" };
        assert_eq!(setenv_value(&args, "SYSTEMD_OFFLINE").unwrap(), offline);
    }
}

fn identity_mounts(args: &[OsString], host_etc: &Path) -> Vec<BindMount> {
    parse_mounts(args)
        .into_iter()
        .filter(|m| m.target.parent() == Some(host_etc))
        .collect()
}

/* Each identity file the host has is covered by the root's copy when the
 * root has one and by /dev/null otherwise. Files the host lacks are never
 * mounted. */
#[rstest]
fn test_identity_files_resolve_from_root() -> Result<()> {
    let mut rng = rand::rng();
    for _ in 0..16 {
        let root = tempfile::tempdir()?;
        let host_etc = tempfile::tempdir()?;
        fs::create_dir_all(root.path().join("etc"))?;

        let mut on_host = Vec::new();
        let mut in_root = Vec::new();
        for name in IDENTITY_FILES {
            if rng.random_bool(0.5) {
                fs::write(host_etc.path().join(name), "host\n")?;
                on_host.push(name);
            }
            if rng.random_bool(0.5) {
                fs::write(root.path().join("etc").join(name), "root\n")?;
                in_root.push(name);
            }
        }

        let args = apivfs_cmd_with(root.path(), host_etc.path())?;
        let mounts = identity_mounts(&args, host_etc.path());
        assert_eq!(mounts.len(), on_host.len());

        for name in IDENTITY_FILES {
            let target = host_etc.path().join(name);
            let found: Vec<&BindMount> = mounts.iter().filter(|m| m.target == target).collect();
            if !on_host.contains(&name) {
                assert!(found.is_empty(), "{} mounted although the host lacks it", name);
                continue;
            }
            assert_eq!(found.len(), 1);
            let expected = if in_root.contains(&name) {
                root.path().join("etc").join(name)
            } else {
                PathBuf::from("/dev/null")
            };
            assert_eq!(found[0].source, expected);
            assert!(!found[0].read_only);
        }
    }
    Ok(())
}

#[rstest]
fn test_chroot_nests_inside_apivfs() -> Result<()> {
    let root = tempfile::tempdir()?;
    let owner = InvokingUser::current()?;
    let args = chroot_cmd(root.path(), &owner, true, &[OsString::from("--unshare-net")])?;

    let bwraps: Vec<usize> = args
        .iter()
        .enumerate()
        .filter(|(_, a)| *a == "bwrap")
        .map(|(i, _)| i)
        .collect();
    assert_eq!(bwraps.len(), 2);
    assert_eq!(bwraps[0], 0);

    let inner = &args[bwraps[1]..];
    let mounts = parse_mounts(inner);
    assert_eq!(
        mounts[0],
        BindMount {
            source: root.path().to_path_buf(),
            target: PathBuf::from("/"),
            read_only: false,
        }
    );
    assert!(mounts.contains(&BindMount {
        source: PathBuf::from("/etc/resolv.conf"),
        target: PathBuf::from("/etc/resolv.conf"),
        read_only: true,
    }));
    assert_eq!(setenv_value(inner, "container").unwrap(), "rootstrap");
    assert!(inner.iter().any(|a| a == "--unshare-net"));
    Ok(())
}
