use anyhow::Result;

use super::Architecture;
use crate::config::Config;
use crate::installer::{BuildState, invoke_pacman, setup_pacman};

const SYNC_OPTIONS: [&str; 4] = ["--refresh", "--needed", "--assume-installed", "initramfs"];

pub(super) fn architecture_name(arch: Architecture) -> Option<&'static str> {
    match arch {
        Architecture::X86_64 => Some("x86_64"),
        Architecture::Arm64 => Some("aarch64"),
        _ => None,
    }
}

/// Testing repositories come first so they take precedence.
pub(super) fn repositories(config: &Config) -> Vec<&'static str> {
    let mut repos = Vec::new();
    if config.local_mirror.is_none() {
        for repo in ["core-testing", "extra-testing"] {
            if config.repositories.iter().any(|r| r == repo) {
                repos.push(repo);
            }
        }
    }
    repos.push("core");
    if config.local_mirror.is_none() {
        repos.push("extra");
    }
    repos
}

pub(super) fn setup(state: &BuildState) -> Result<()> {
    setup_pacman(state, &repositories(&state.config))
}

pub(super) fn install(state: &BuildState) -> Result<()> {
    install_packages(state, &["filesystem".to_string()], false)
}

pub(super) fn install_packages(
    state: &BuildState,
    packages: &[String],
    apivfs: bool,
) -> Result<()> {
    invoke_pacman(state, "--sync", &SYNC_OPTIONS, packages, apivfs)
}

pub(super) fn remove_packages(state: &BuildState, packages: &[String]) -> Result<()> {
    invoke_pacman(state, "--remove", &["--nosave", "--recursive"], packages, true)
}
