use anyhow::{Context, Result};
use log::trace;
use std::ffi::OsString;
use std::fmt::Write as _;
use std::path::Path;
use walkdir::WalkDir;

use super::{BuildState, sort_packages};
use crate::sandbox::{BwrapOptions, apivfs_cmd, bwrap};
use crate::util::{find_binary, mkdir};

/// One stanza of the generated repo file. `url` carries its own key, one of
/// `baseurl=`, `metalink=` or `mirrorlist=`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpmRepository {
    pub id: String,
    pub url: String,
    pub gpgurls: Vec<String>,
    pub enabled: bool,
}

impl RpmRepository {
    pub fn new(id: &str, url: impl Into<String>, gpgurls: &[String]) -> Self {
        RpmRepository {
            id: id.to_string(),
            url: url.into(),
            gpgurls: gpgurls.to_vec(),
            enabled: true,
        }
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

const HOST_GPG_KEYS: &str = "/usr/share/distribution-gpg-keys";

/**
 * Location of the gpg key `key` as a URL: a copy shipped by the host's
 * distribution-gpg-keys package, then one provided in the pkgmngr
 * directory, and `url` if neither has it.
 */
pub fn find_rpm_gpgkey(state: &BuildState, key: &str, url: &str) -> String {
    find_rpm_gpgkey_in(
        &[
            Path::new(HOST_GPG_KEYS),
            &state.pkgmngr.join("etc/pki/rpm-gpg"),
        ],
        key,
        url,
    )
}

pub fn find_rpm_gpgkey_in(dirs: &[&Path], key: &str, url: &str) -> String {
    for dir in dirs {
        let found = WalkDir::new(dir)
            .sort_by_file_name()
            .into_iter()
            .flatten()
            .find(|entry| entry.file_type().is_file() && entry.file_name() == key);
        if let Some(entry) = found {
            trace!("Using gpg key {}", entry.path().display());
            return format!("file://{}", entry.path().display());
        }
    }
    url.to_string()
}

pub fn dnf_executable() -> String {
    find_binary(&["dnf5", "dnf"], None)
        .and_then(|path| path.file_name().map(|name| name.to_string_lossy().into_owned()))
        .unwrap_or_else(|| "dnf".to_string())
}

/**
 * Writes `dnf.conf` and the repo file into the pkgmngr directory unless they
 * already exist. With `filelists`, dnf5 is told to download file lists so
 * that file dependencies resolve.
 */
pub fn setup_dnf(
    state: &BuildState,
    repos: &[RpmRepository],
    filelists: bool,
) -> Result<()> {
    let config = state.pkgmngr.join("etc/dnf/dnf.conf");
    if !config.exists() {
        mkdir(&state.pkgmngr.join("etc/dnf"), None)?;
        let contents = if filelists && dnf_executable() == "dnf5" {
            "[main]\noptional_metadata_types=filelists\n"
        } else {
            ""
        };
        std::fs::write(&config, contents)
            .context(format!("Failed to write {}", config.display()))?;
    }

    let repofile = state.pkgmngr.join("etc/yum.repos.d/rootstrap.repo");
    if repofile.exists() {
        return Ok(());
    }
    mkdir(&state.pkgmngr.join("etc/yum.repos.d"), None)?;

    let mut contents = String::new();
    for repo in repos {
        let _ = write!(
            contents,
            "[{id}]\nname={id}\n{url}\ngpgcheck=1\nenabled={enabled}\n",
            id = repo.id,
            url = repo.url,
            enabled = u8::from(repo.enabled),
        );
        for (i, url) in repo.gpgurls.iter().enumerate() {
            let prefix = if i == 0 { "gpgkey=" } else { "       " };
            let _ = writeln!(contents, "{}{}", prefix, url);
        }
        contents.push('\n');
    }

    std::fs::write(&repofile, contents)
        .context(format!("Failed to write {}", repofile.display()))
}

pub fn dnf_cmd(state: &BuildState) -> Vec<OsString> {
    let dnf = dnf_executable();
    let dnf5 = dnf == "dnf5";
    let config = &state.config;

    let mut cmdline = vec![
        "env".to_string(),
        "HOME=/".to_string(),
        dnf.clone(),
        "--assumeyes".to_string(),
        "--best".to_string(),
        format!("--releasever={}", config.release),
        format!("--installroot={}", state.root.display()),
        "--setopt=keepcache=1".to_string(),
        format!(
            "--setopt=cachedir={}",
            state
                .cache_dir
                .join("cache")
                .join(config.distribution.to_string())
                .join(&config.release)
                .display()
        ),
        format!(
            "--setopt=persistdir={}",
            state.pkgmngr.join("var/lib/dnf").display()
        ),
        format!(
            "--setopt=install_weak_deps={}",
            u8::from(config.with_recommends)
        ),
        "--setopt=check_config_file_age=0".to_string(),
        format!("--config={}", state.pkgmngr.join("etc/dnf/dnf.conf").display()),
        format!(
            "--setopt=reposdir={}",
            state.pkgmngr.join("etc/yum.repos.d").display()
        ),
        format!(
            "--setopt=varsdir={}",
            state.pkgmngr.join("etc/dnf/vars").display()
        ),
    ];

    if !config.repository_key_check {
        cmdline.push("--nogpgcheck".to_string());
    }

    let enable = if dnf5 { "--enable-repo" } else { "--enablerepo" };
    cmdline.extend(
        config
            .repositories
            .iter()
            .map(|repo| format!("{}={}", enable, repo)),
    );

    if !config.with_docs {
        cmdline.push(if dnf5 { "--no-docs" } else { "--nodocs" }.to_string());
    }

    cmdline.into_iter().map(OsString::from).collect()
}

pub fn invoke_dnf(
    state: &BuildState,
    command: &str,
    packages: &[String],
    apivfs: bool,
) -> Result<()> {
    let mut cmdline = if apivfs {
        apivfs_cmd(&state.root)?
    } else {
        Vec::new()
    };
    cmdline.extend(dnf_cmd(state));
    cmdline.push(command.into());
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
