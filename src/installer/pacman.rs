use anyhow::{Context, Result};
use std::ffi::OsString;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use super::{BuildState, sort_packages};
use crate::distributions::Architecture;
use crate::sandbox::{BwrapOptions, apivfs_cmd, bwrap};
use crate::util::{mkdir, umask};

fn has_dropins(dir: &Path) -> bool {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return false;
    };
    entries.flatten().any(|entry| {
        fast_glob::glob_match("*.conf", entry.file_name().to_string_lossy().as_ref())
    })
}

/// The `Server` line every repository in pacman.conf uses.
pub fn pacman_server(state: &BuildState) -> String {
    let config = &state.config;
    if let Some(local_mirror) = &config.local_mirror {
        return format!("Server = {}", local_mirror);
    }
    if config.architecture == Architecture::Arm64 {
        format!(
            "Server = {}/$arch/$repo",
            config
                .mirror
                .as_deref()
                .unwrap_or("http://mirror.archlinuxarm.org")
        )
    } else {
        format!(
            "Server = {}/$repo/os/$arch",
            config
                .mirror
                .as_deref()
                .unwrap_or("https://geo.mirror.pkgbuild.com")
        )
    }
}

pub fn setup_pacman(state: &BuildState, repos: &[&str]) -> Result<()> {
    let sig_level = if state.config.repository_key_check {
        "Required DatabaseOptional"
    } else {
        // A local mirror built on the fly has no signatures
        "Never"
    };

    {
        let _umask = umask::with_mode(0o755);
        mkdir(&state.root.join("var/lib/pacman"), None)?;
    }

    let config = state.pkgmngr.join("etc/pacman.conf");
    if config.exists() {
        return Ok(());
    }
    mkdir(&state.pkgmngr.join("etc"), None)?;

    let server = pacman_server(state);
    let mut contents = format!(
        "[options]\nSigLevel = {}\nLocalFileSigLevel = Optional\nParallelDownloads = 5\n",
        sig_level
    );
    for repo in repos {
        let _ = write!(contents, "\n[{}]\n{}\n", repo, server);
    }
    if has_dropins(&state.pkgmngr.join("etc/pacman.d")) {
        let _ = write!(
            contents,
            "\nInclude = {}/etc/pacman.d/*.conf\n",
            state.pkgmngr.display()
        );
    }

    std::fs::write(&config, contents)
        .context(format!("Failed to write {}", config.display()))
}

pub fn pacman_cmd(state: &BuildState) -> Result<Vec<OsString>> {
    let gpgdir = state.pkgmngr.join("etc/pacman.d/gnupg/");
    let gpgdir = if gpgdir.exists() {
        gpgdir
    } else {
        PathBuf::from("/etc/pacman.d/gnupg/")
    };

    let cachedir = state.cache_dir.join("pacman/pkg");
    {
        let _umask = umask::with_mode(0o755);
        mkdir(&cachedir, None)?;
    }

    let arch = state
        .config
        .distribution
        .architecture_name(state.config.architecture)?;

    let mut cmdline: Vec<OsString> = vec!["pacman".into(), "--config".into()];
    cmdline.push(state.pkgmngr.join("etc/pacman.conf").into());
    cmdline.push("--root".into());
    cmdline.push(state.root.clone().into());
    cmdline.push("--logfile=/dev/null".into());
    cmdline.push("--cachedir".into());
    cmdline.push(cachedir.into());
    cmdline.push("--gpgdir".into());
    cmdline.push(gpgdir.into());
    cmdline.push("--hookdir".into());
    cmdline.push(state.root.join("etc/pacman.d/hooks").into());
    cmdline.extend(
        ["--arch", arch, "--color", "auto", "--noconfirm"].map(OsString::from),
    );
    Ok(cmdline)
}

pub fn invoke_pacman(
    state: &BuildState,
    operation: &str,
    options: &[&str],
    packages: &[String],
    apivfs: bool,
) -> Result<()> {
    let mut cmdline = if apivfs {
        apivfs_cmd(&state.root)?
    } else {
        Vec::new()
    };
    cmdline.extend(pacman_cmd(state)?);
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
