use anyhow::{Context, Result};
use std::fs::File;
use std::path::Path;

use super::{Architecture, copy_vmlinuz};
use crate::config::Config;
use crate::installer::{
    BootstrapBackend, BuildState, PolicyRcd, bootstrap, dpkg_deb_fsys_tarfile, invoke_apt,
    setup_apt,
};

pub(super) fn architecture_name(arch: Architecture) -> Option<&'static str> {
    let name = match arch {
        Architecture::Arm64 => "arm64",
        Architecture::Arm => "armhf",
        Architecture::Alpha => "alpha",
        Architecture::X86_64 => "amd64",
        Architecture::X86 => "i386",
        Architecture::Ia64 => "ia64",
        Architecture::Loongarch64 => "loongarch64",
        Architecture::Mips64Le => "mips64el",
        Architecture::MipsLe => "mipsel",
        Architecture::Parisc => "hppa",
        Architecture::Ppc64Le => "ppc64el",
        Architecture::Ppc64 => "ppc64",
        Architecture::Riscv64 => "riscv64",
        Architecture::S390x => "s390x",
        Architecture::S390 => "s390",
        _ => return None,
    };
    Some(name)
}

pub(super) fn repositories(config: &Config, local: bool) -> Vec<String> {
    let components = std::iter::once("main")
        .chain(config.repositories.iter().map(String::as_str))
        .collect::<Vec<_>>()
        .join(" ");
    let release = &config.release;

    if let (Some(local_mirror), true) = (&config.local_mirror, local) {
        return vec![format!(
            "deb [trusted=yes] {} {} {}",
            local_mirror, release, components
        )];
    }

    let mirror = config
        .mirror
        .as_deref()
        .unwrap_or("http://deb.debian.org/debian");
    let archives = ["deb", "deb-src"];

    let mut repos: Vec<String> = archives
        .iter()
        .map(|archive| format!("{} {} {} {}", archive, mirror, release, components))
        .collect();

    // Debug repositories are not mirrored
    repos.push(format!(
        "deb http://deb.debian.org/debian-debug {}-debug {}",
        release, components
    ));

    if release == "unstable" || release == "sid" {
        return repos;
    }

    repos.extend(archives.iter().map(|archive| {
        format!("{} {} {}-updates {}", archive, mirror, release, components)
    }));

    // Neither are security updates
    repos.extend(archives.iter().map(|archive| {
        format!(
            "{} http://security.debian.org/debian-security {}-security {}",
            archive, release, components
        )
    }));

    repos
}

pub(super) fn setup(state: &BuildState) -> Result<()> {
    setup_apt(state, &repositories(&state.config, true))
}

/// Bootstraps the root by hand, since dpkg cannot run the maintainer
/// scripts of essential packages before their dependencies are unpacked.
pub(super) fn install(state: &BuildState) -> Result<()> {
    let debarch = architecture_name(state.config.architecture).with_context(|| {
        format!(
            "Architecture {} is not supported by Debian",
            state.config.architecture
        )
    })?;
    bootstrap(&AptBootstrap { state }, &state.root, debarch, &state.workspace)
}

pub(super) fn install_packages(
    state: &BuildState,
    packages: &[String],
    apivfs: bool,
) -> Result<()> {
    install_packages_with(state, &[], packages, apivfs)
}

fn install_packages_with(
    state: &BuildState,
    options: &[String],
    packages: &[String],
    apivfs: bool,
) -> Result<()> {
    {
        let _policy = PolicyRcd::install(&state.root)?;
        invoke_apt(state, "apt-get", "update", &[], &[], false)?;
        invoke_apt(state, "apt-get", "install", options, packages, apivfs)?;
        install_apt_sources(&state.root, &repositories(&state.config, false))?;
    }
    copy_vmlinuz(&state.root)
}

pub(super) fn remove_packages(state: &BuildState, packages: &[String]) -> Result<()> {
    invoke_apt(state, "apt-get", "purge", &[], packages, true)
}

/// Gives a root that has apt installed the sources it should use once
/// booted, unless it already has its own.
pub fn install_apt_sources(root: &Path, repos: &[String]) -> Result<()> {
    if !root.join("usr/bin/apt").exists() {
        return Ok(());
    }
    let sources = root.join("etc/apt/sources.list");
    if sources.exists() {
        return Ok(());
    }
    std::fs::write(
        &sources,
        repos.iter().map(|repo| format!("{}\n", repo)).collect::<String>(),
    )
    .context(format!("Failed to write {}", sources.display()))
}

/**
 * Bootstraps with apt. `Debug::pkgDPkgPm` makes apt download the essential
 * packages without calling dpkg, while `DPkg::Pre-Install-Pkgs` hands us
 * the paths of the archives it would have installed.
 */
pub struct AptBootstrap<'a> {
    pub state: &'a BuildState,
}

impl BootstrapBackend for AptBootstrap<'_> {
    fn simulate_essential(&self, side_channel: &Path) -> Result<()> {
        install_packages_with(
            self.state,
            &[
                "-oDebug::pkgDPkgPm=1".to_string(),
                format!("-oDPkg::Pre-Install-Pkgs::=cat >{}", side_channel.display()),
            ],
            &["?essential".to_string(), "?name(usr-is-merged)".to_string()],
            false,
        )
    }

    fn fsys_tarfile(&self, deb: &Path, output: File) -> Result<()> {
        dpkg_deb_fsys_tarfile(deb, output)
    }

    fn install(&self, packages: &[String]) -> Result<()> {
        install_packages(self.state, packages, true)
    }
}
