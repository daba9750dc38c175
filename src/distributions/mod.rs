mod archlinux;
mod architecture;
mod debian;
mod fedora;
mod mageia;

pub use architecture::*;
pub use debian::{AptBootstrap, install_apt_sources};
pub use fedora::fedora_release_at_most;

use anyhow::{Result, anyhow};
use log::trace;
use std::fmt::{self, Display};
use std::path::Path;
use std::str::FromStr;

use crate::installer::{BuildState, RpmRepository};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, clap::ValueEnum, serde::Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Distribution {
    Debian,
    Fedora,
    Mageia,
    Arch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageType {
    Deb,
    Rpm,
    Pkg,
}

impl Display for PackageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PackageType::Deb => "deb",
            PackageType::Rpm => "rpm",
            PackageType::Pkg => "pkg",
        };
        write!(f, "{}", name)
    }
}

/// Repository definitions in the form the distribution's package manager
/// takes them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Repositories {
    /// `sources.list` lines
    Apt(Vec<String>),
    Rpm(Vec<RpmRepository>),
    /// Sections of pacman.conf, in order of precedence
    Pacman(Vec<String>),
}

impl Distribution {
    pub fn pretty_name(self) -> &'static str {
        match self {
            Distribution::Debian => "Debian",
            Distribution::Fedora => "Fedora Linux",
            Distribution::Mageia => "Mageia",
            Distribution::Arch => "Arch Linux",
        }
    }

    /// Filesystem images of this distribution default to.
    pub fn filesystem(self) -> &'static str {
        match self {
            Distribution::Fedora => "btrfs",
            Distribution::Debian | Distribution::Mageia | Distribution::Arch => "ext4",
        }
    }

    pub fn package_type(self) -> PackageType {
        match self {
            Distribution::Debian => PackageType::Deb,
            Distribution::Fedora | Distribution::Mageia => PackageType::Rpm,
            Distribution::Arch => PackageType::Pkg,
        }
    }

    pub fn default_release(self) -> &'static str {
        match self {
            Distribution::Debian => "testing",
            Distribution::Fedora => "39",
            Distribution::Mageia => "cauldron",
            Distribution::Arch => "rolling",
        }
    }

    /// The distribution's own name for `arch`.
    pub fn architecture_name(self, arch: Architecture) -> Result<&'static str> {
        let name = match self {
            Distribution::Debian => debian::architecture_name(arch),
            Distribution::Fedora => fedora::architecture_name(arch),
            Distribution::Mageia => mageia::architecture_name(arch),
            Distribution::Arch => archlinux::architecture_name(arch),
        };
        name.ok_or_else(|| {
            anyhow!(
                "Architecture {} is not supported by {}",
                arch,
                self.pretty_name()
            )
        })
    }

    /// With `local` unset, a configured local mirror is ignored, which gives
    /// the repositories an installed system should use.
    pub fn repositories(self, state: &BuildState, local: bool) -> Repositories {
        match self {
            Distribution::Debian => {
                Repositories::Apt(debian::repositories(&state.config, local))
            }
            Distribution::Fedora => Repositories::Rpm(fedora::repositories(state)),
            Distribution::Mageia => Repositories::Rpm(mageia::repositories(state)),
            Distribution::Arch => Repositories::Pacman(
                archlinux::repositories(&state.config)
                    .into_iter()
                    .map(String::from)
                    .collect(),
            ),
        }
    }

    /// Writes the package manager configuration for this distribution.
    pub fn setup(self, state: &BuildState) -> Result<()> {
        trace!("Setting up {} package manager", self.pretty_name());
        match self {
            Distribution::Debian => debian::setup(state),
            Distribution::Fedora => fedora::setup(state),
            Distribution::Mageia => mageia::setup(state),
            Distribution::Arch => archlinux::setup(state),
        }
    }

    /// Installs the base system into an empty root.
    pub fn install(self, state: &BuildState) -> Result<()> {
        match self {
            Distribution::Debian => debian::install(state),
            Distribution::Fedora => fedora::install(state),
            Distribution::Mageia => mageia::install(state),
            Distribution::Arch => archlinux::install(state),
        }
    }

    pub fn install_packages(
        self,
        state: &BuildState,
        packages: &[String],
        apivfs: bool,
    ) -> Result<()> {
        match self {
            Distribution::Debian => debian::install_packages(state, packages, apivfs),
            Distribution::Fedora => fedora::install_packages(state, packages, apivfs),
            Distribution::Mageia => mageia::install_packages(state, packages, apivfs),
            Distribution::Arch => archlinux::install_packages(state, packages, apivfs),
        }
    }

    pub fn remove_packages(self, state: &BuildState, packages: &[String]) -> Result<()> {
        match self {
            Distribution::Debian => debian::remove_packages(state, packages),
            Distribution::Fedora => fedora::remove_packages(state, packages),
            Distribution::Mageia => mageia::remove_packages(state, packages),
            Distribution::Arch => archlinux::remove_packages(state, packages),
        }
    }
}

impl Display for Distribution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Distribution::Debian => "debian",
            Distribution::Fedora => "fedora",
            Distribution::Mageia => "mageia",
            Distribution::Arch => "arch",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for Distribution {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        <Distribution as clap::ValueEnum>::from_str(s, true)
            .map_err(|_| format!("Invalid distribution: {}", s))
    }
}

/// Appends `path` to a mirror URL, with exactly one slash between them.
pub fn join_mirror(mirror: &str, path: &str) -> String {
    format!(
        "{}/{}",
        mirror.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/**
 * Copies each `boot/vmlinuz-<kver>` of `root` to
 * `usr/lib/modules/<kver>/vmlinuz`, where systemd tooling expects kernels,
 * when the module directory exists and has no kernel yet.
 */
pub fn copy_vmlinuz(root: &Path) -> Result<()> {
    let Ok(entries) = std::fs::read_dir(root.join("boot")) else {
        return Ok(());
    };
    for entry in entries.flatten() {
        let name = entry.file_name().to_string_lossy().into_owned();
        if !fast_glob::glob_match("vmlinuz-*", &name) {
            continue;
        }
        let kver = &name["vmlinuz-".len()..];
        let modules = root.join("usr/lib/modules").join(kver);
        let vmlinuz = modules.join("vmlinuz");
        if !modules.is_dir() || vmlinuz.exists() {
            continue;
        }
        trace!("Copying {} to {}", entry.path().display(), vmlinuz.display());
        std::fs::copy(entry.path(), &vmlinuz).map_err(|e| {
            anyhow!("Failed to copy {} to {}: {}", name, vmlinuz.display(), e)
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_distribution() {
        assert_eq!("Fedora".parse::<Distribution>(), Ok(Distribution::Fedora));
        assert!("gentoo".parse::<Distribution>().is_err());
        for distribution in [
            Distribution::Debian,
            Distribution::Fedora,
            Distribution::Mageia,
            Distribution::Arch,
        ] {
            assert_eq!(distribution.to_string().parse(), Ok(distribution));
        }
    }

    #[test]
    fn test_capability_table() {
        assert_eq!(Distribution::Debian.package_type(), PackageType::Deb);
        assert_eq!(Distribution::Mageia.package_type(), PackageType::Rpm);
        assert_eq!(Distribution::Arch.package_type().to_string(), "pkg");
        assert_eq!(Distribution::Fedora.filesystem(), "btrfs");
        assert_eq!(Distribution::Arch.default_release(), "rolling");
    }

    #[test]
    fn test_architecture_names() {
        let debian = Distribution::Debian;
        assert_eq!(debian.architecture_name(Architecture::X86_64).unwrap(), "amd64");
        assert_eq!(debian.architecture_name(Architecture::Ppc64Le).unwrap(), "ppc64el");
        assert_eq!(debian.architecture_name(Architecture::Parisc).unwrap(), "hppa");
        assert_eq!(
            Distribution::Fedora.architecture_name(Architecture::Arm64).unwrap(),
            "aarch64"
        );
        let err = Distribution::Arch
            .architecture_name(Architecture::S390x)
            .unwrap_err();
        assert_eq!(err.to_string(), "Architecture s390x is not supported by Arch Linux");
    }

    #[test]
    fn test_join_mirror() {
        assert_eq!(join_mirror("http://m/", "/updates"), "http://m/updates");
        assert_eq!(join_mirror("http://m", "updates"), "http://m/updates");
    }

    #[test]
    fn test_copy_vmlinuz() {
        let root = tempfile::tempdir().unwrap();
        let root = root.path();
        std::fs::create_dir_all(root.join("boot")).unwrap();
        std::fs::create_dir_all(root.join("usr/lib/modules/6.6.0")).unwrap();
        std::fs::write(root.join("boot/vmlinuz-6.6.0"), "kernel").unwrap();
        std::fs::write(root.join("boot/vmlinuz-5.0.0"), "old").unwrap();
        std::fs::write(root.join("boot/initrd.img-6.6.0"), "initrd").unwrap();

        copy_vmlinuz(root).unwrap();
        assert_eq!(
            std::fs::read_to_string(root.join("usr/lib/modules/6.6.0/vmlinuz")).unwrap(),
            "kernel"
        );
        assert!(!root.join("usr/lib/modules/5.0.0").exists());
    }
}
