use anyhow::{Context, Result};
use std::ffi::OsString;
use std::path::Path;

use super::{BuildState, sort_packages};
use crate::sandbox::{BwrapOptions, apivfs_cmd, bwrap};
use crate::util::{find_binary, mkdir, umask};

fn write_if_missing(path: &Path, contents: &str) -> Result<()> {
    if path.exists() {
        return Ok(());
    }
    std::fs::write(path, contents)
        .context(format!("Failed to write {}", path.display()))
}

/**
 * Lays out the apt configuration in the pkgmngr directory. Files that
 * already exist are left alone so they can be provided ahead of time.
 */
pub fn setup_apt(state: &BuildState, repos: &[String]) -> Result<()> {
    for dir in [
        "etc/apt/apt.conf.d",
        "etc/apt/preferences.d",
        "etc/apt/sources.list.d",
        "var/log/apt",
        "var/lib/apt",
    ] {
        mkdir(&state.pkgmngr.join(dir), None)?;
    }

    // Older apt versions fail without a dpkg status file
    {
        let _umask = umask::with_mode(0o755);
        mkdir(&state.root.join("var/lib/dpkg"), None)?;
        let status = state.root.join("var/lib/dpkg/status");
        if !status.exists() {
            std::fs::File::create(&status)
                .context(format!("Failed to create {}", status.display()))?;
        }
    }

    // apt reads APT_CONFIG before any -o option, so this is the only way to
    // point it at the pkgmngr tree for its configuration files.
    write_if_missing(
        &state.workspace.join("apt.conf"),
        &format!(
            "Dir \"{}\";\nDir::Etc \"etc/apt\";\n",
            state.pkgmngr.display()
        ),
    )?;

    write_if_missing(
        &state.pkgmngr.join("etc/apt/apt.conf"),
        &format!(
            "APT::Install-Recommends \"{}\";\n",
            state.config.with_recommends
        ),
    )?;

    write_if_missing(
        &state.pkgmngr.join("etc/apt/sources.list"),
        &repos.iter().map(|repo| format!("{}\n", repo)).collect::<String>(),
    )
}

pub fn apt_cmd(state: &BuildState, command: &str) -> Result<Vec<OsString>> {
    let debarch = state
        .config
        .distribution
        .architecture_name(state.config.architecture)?;

    let trustedkeys = state.pkgmngr.join("etc/apt/trusted.gpg");
    let trustedkeys = if trustedkeys.exists() {
        trustedkeys.display().to_string()
    } else {
        format!(
            "/usr/share/keyrings/{}-archive-keyring.gpg",
            state.config.distribution
        )
    };
    let trustedkeys_dir = state.pkgmngr.join("etc/apt/trusted.gpg.d");
    let trustedkeys_dir = if trustedkeys_dir.exists() {
        trustedkeys_dir.display().to_string()
    } else {
        "/usr/share/keyrings".to_string()
    };

    let mut options = vec![
        format!("APT::Architecture={}", debarch),
        format!("APT::Architectures={}", debarch),
        "APT::Immediate-Configure=off".to_string(),
        "APT::Get::Assume-Yes=true".to_string(),
        "APT::Get::AutomaticRemove=true".to_string(),
        "APT::Get::Allow-Change-Held-Packages=true".to_string(),
        "APT::Get::Allow-Remove-Essential=true".to_string(),
        "APT::Sandbox::User=root".to_string(),
        format!("Dir::Cache={}", state.cache_dir.join("apt").display()),
        format!("Dir::State={}", state.pkgmngr.join("var/lib/apt").display()),
        format!(
            "Dir::State::status={}",
            state.root.join("var/lib/dpkg/status").display()
        ),
        format!("Dir::Etc::trusted={}", trustedkeys),
        format!("Dir::Etc::trustedparts={}", trustedkeys_dir),
        format!("Dir::Log={}", state.pkgmngr.join("var/log/apt").display()),
    ];
    if let Some(dpkg) = find_binary(&["dpkg"], None) {
        options.push(format!("Dir::Bin::dpkg={}", dpkg.display()));
    }
    options.extend([
        "Debug::NoLocking=true".to_string(),
        format!("DPkg::Options::=--root={}", state.root.display()),
        format!(
            "DPkg::Options::=--log={}",
            state.pkgmngr.join("var/log/apt/dpkg.log").display()
        ),
        "DPkg::Options::=--force-unsafe-io".to_string(),
        "DPkg::Options::=--force-architecture".to_string(),
        "DPkg::Options::=--force-depends".to_string(),
        "Dpkg::Use-Pty=false".to_string(),
        "DPkg::Install::Recursive::Minimum=1000".to_string(),
        "pkgCacheGen::ForceEssential=,".to_string(),
    ]);

    if !state.config.with_docs {
        options.extend(
            [
                "--path-exclude=/usr/share/doc/*",
                "--path-include=/usr/share/doc/*/copyright",
                "--path-exclude=/usr/share/man/*",
                "--path-exclude=/usr/share/groff/*",
                "--path-exclude=/usr/share/info/*",
            ]
            .map(|option| format!("DPkg::Options::={}", option)),
        );
    }

    let mut cmdline: Vec<OsString> = vec![
        "env".into(),
        format!("APT_CONFIG={}", state.workspace.join("apt.conf").display()).into(),
        "DEBIAN_FRONTEND=noninteractive".into(),
        "DEBCONF_INTERACTIVE_SEEN=true".into(),
        "INITRD=No".into(),
        command.into(),
    ];
    for option in options {
        cmdline.push("-o".into());
        cmdline.push(option.into());
    }

    Ok(cmdline)
}

/**
 * Runs an apt command against the root. With `apivfs` the command runs
 * with the root's API filesystems mounted, which maintainer scripts need.
 */
pub fn invoke_apt(
    state: &BuildState,
    command: &str,
    operation: &str,
    options: &[String],
    packages: &[String],
    apivfs: bool,
) -> Result<()> {
    let mut cmdline = if apivfs {
        apivfs_cmd(&state.root)?
    } else {
        Vec::new()
    };
    cmdline.extend(apt_cmd(state, command)?);
    cmdline.push(operation.into());
    cmdline.extend(options.iter().map(OsString::from));
    cmdline.extend(sort_packages(packages).into_iter().map(OsString::from));

    bwrap(
        &cmdline,
        BwrapOptions::new()
            .network(true)
            .envs(&state.config.environment)
            .debug_shell(state.config.debug_shell),
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distributions::Distribution;
    use crate::installer::test_support::{test_config, test_state};

    fn option_values(cmdline: &[OsString]) -> Vec<String> {
        cmdline
            .windows(2)
            .filter(|pair| pair[0] == "-o")
            .map(|pair| pair[1].to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_setup_apt_layout() {
        let base = tempfile::tempdir().unwrap();
        let state = test_state(test_config(base.path(), Distribution::Debian));
        let repos = vec![
            "deb http://deb.debian.org/debian testing main".to_string(),
            "deb-src http://deb.debian.org/debian testing main".to_string(),
        ];
        setup_apt(&state, &repos).unwrap();

        assert!(state.root.join("var/lib/dpkg/status").is_file());
        assert!(state.pkgmngr.join("etc/apt/sources.list.d").is_dir());
        assert_eq!(
            std::fs::read_to_string(state.workspace.join("apt.conf")).unwrap(),
            format!("Dir \"{}\";\nDir::Etc \"etc/apt\";\n", state.pkgmngr.display())
        );
        assert_eq!(
            std::fs::read_to_string(state.pkgmngr.join("etc/apt/apt.conf")).unwrap(),
            "APT::Install-Recommends \"false\";\n"
        );
        assert_eq!(
            std::fs::read_to_string(state.pkgmngr.join("etc/apt/sources.list"))
                .unwrap(),
            format!("{}\n{}\n", repos[0], repos[1])
        );
    }

    #[test]
    fn test_setup_apt_keeps_existing_files() {
        let base = tempfile::tempdir().unwrap();
        let state = test_state(test_config(base.path(), Distribution::Debian));
        mkdir(&state.pkgmngr.join("etc/apt"), None).unwrap();
        std::fs::write(state.pkgmngr.join("etc/apt/sources.list"), "custom\n").unwrap();
        setup_apt(&state, &["deb ignored".to_string()]).unwrap();
        assert_eq!(
            std::fs::read_to_string(state.pkgmngr.join("etc/apt/sources.list"))
                .unwrap(),
            "custom\n"
        );
    }

    #[test]
    fn test_apt_cmd_options() {
        let base = tempfile::tempdir().unwrap();
        let state = test_state(test_config(base.path(), Distribution::Debian));
        let cmdline = apt_cmd(&state, "apt-get").unwrap();

        assert_eq!(cmdline[0], "env");
        assert_eq!(cmdline[5], "apt-get");
        let options = option_values(&cmdline);
        assert!(options.contains(&"APT::Architecture=amd64".to_string()));
        assert!(options.contains(&format!(
            "DPkg::Options::=--root={}",
            state.root.display()
        )));
        assert!(options.contains(
            &"Dir::Etc::trusted=/usr/share/keyrings/debian-archive-keyring.gpg"
                .to_string()
        ));
        assert!(options.contains(&"DPkg::Options::=--path-exclude=/usr/share/man/*".to_string()));
    }

    #[test]
    fn test_apt_cmd_with_docs_and_own_keys() {
        let base = tempfile::tempdir().unwrap();
        let mut config = test_config(base.path(), Distribution::Debian);
        config.with_docs = true;
        let state = test_state(config);
        mkdir(&state.pkgmngr.join("etc/apt/trusted.gpg.d"), None).unwrap();

        let options = option_values(&apt_cmd(&state, "apt-get").unwrap());
        assert!(!options.iter().any(|o| o.contains("--path-exclude")));
        assert!(options.contains(&format!(
            "Dir::Etc::trustedparts={}",
            state.pkgmngr.join("etc/apt/trusted.gpg.d").display()
        )));
    }
}
