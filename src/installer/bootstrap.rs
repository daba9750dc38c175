use anyhow::{Context, Result, anyhow};
use log::{debug, trace};
use std::ffi::OsStr;
use std::fs::File;
use std::os::unix::fs::symlink;
use std::path::{Path, PathBuf};

use super::extract_tar;
use crate::logger::complete_step;
use crate::run::{Redirect, RunOptions, run};
use crate::util::{mkdir, umask};

/// Directories that live under `usr/` on a merged-usr system, beyond the
/// ones every architecture has. Taken from debootstrap.
pub fn multilib_dirs(debarch: &str) -> &'static [&'static str] {
    match debarch {
        "amd64" => &["lib32", "lib64", "libx32"],
        "i386" => &["lib64", "libx32"],
        "mips" | "mipsel" => &["lib32", "lib64"],
        "mips64el" => &["lib32", "lib64", "libo32"],
        "loongarch64" => &["lib32", "lib64"],
        "powerpc" => &["lib64"],
        "ppc64" => &["lib32", "lib64"],
        "ppc64el" => &["lib64"],
        "s390x" => &["lib32"],
        "sparc" => &["lib64"],
        "sparc64" => &["lib32", "lib64"],
        "x32" => &["lib32", "lib64", "libx32"],
        _ => &[],
    }
}

/// Points the top level `bin`, `sbin`, `lib` and multilib directories of
/// `root` at their counterparts under `usr/`.
pub fn setup_merged_usr(root: &Path, debarch: &str) -> Result<()> {
    let _umask = umask::with_mode(0o755);
    for dir in ["bin", "sbin", "lib"].iter().chain(multilib_dirs(debarch)) {
        let link = root.join(dir);
        if link.symlink_metadata().is_err() {
            symlink(format!("usr/{}", dir), &link)
                .context(format!("Failed to create symlink {}", link.display()))?;
        }
        mkdir(&root.join("usr").join(dir), None)?;
    }
    Ok(())
}

/**
 * The package manager side of a bootstrap. Implemented by apt for the
 * Debian family; tests provide their own.
 */
pub trait BootstrapBackend {
    /// Resolves the essential packages without installing anything and
    /// writes the paths of their downloaded archives, one per line, to
    /// `side_channel`.
    fn simulate_essential(&self, side_channel: &Path) -> Result<()>;

    /// Writes the filesystem tarball contained in the package archive `deb`
    /// to `output`.
    fn fsys_tarfile(&self, deb: &Path, output: File) -> Result<()>;

    /// Installs `packages` properly, running their maintainer scripts.
    fn install(&self, packages: &[String]) -> Result<()>;
}

/// Extracts filesystem tarballs with `dpkg-deb` from the host.
pub fn dpkg_deb_fsys_tarfile(deb: &Path, output: File) -> Result<()> {
    run(
        &[OsStr::new("dpkg-deb"), OsStr::new("--fsys-tarfile"), deb.as_os_str()],
        RunOptions::new().stdout(Redirect::File(output)),
    )?;
    Ok(())
}

/// Reads the side channel written by
/// [`BootstrapBackend::simulate_essential`].
pub fn read_essential(side_channel: &Path) -> Result<Vec<PathBuf>> {
    let contents = std::fs::read_to_string(side_channel).context(format!(
        "Failed to read essential package list {}",
        side_channel.display()
    ))?;
    let essential: Vec<PathBuf> = contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(PathBuf::from)
        .collect();
    if essential.is_empty() {
        return Err(anyhow!("no essential packages resolved"));
    }
    Ok(essential)
}

/// Package names for archive paths like `.../base-files_13_amd64.deb`.
pub fn essential_package_names(debs: &[PathBuf]) -> Vec<String> {
    debs.iter()
        .map(|deb| {
            let name = deb
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();
            let name = name.split('_').next().unwrap_or_default();
            name.strip_suffix(".deb").unwrap_or(name).to_string()
        })
        .collect()
}

/// Unpacks the payload of every archive in `debs` into `root`, bypassing
/// the package manager. `scratch` holds the intermediate tarballs.
pub fn extract_essential(
    backend: &dyn BootstrapBackend,
    root: &Path,
    scratch: &Path,
    debs: &[PathBuf],
) -> Result<()> {
    for deb in debs {
        debug!("Extracting {}", deb.display());
        let tarball = scratch.join(format!("{}.tar", uuid::Uuid::new_v4().simple()));
        let output = File::create(&tarball)
            .context(format!("Failed to create {}", tarball.display()))?;
        let result = backend
            .fsys_tarfile(deb, output)
            .and_then(|_| extract_tar(&tarball, root));
        let _ = std::fs::remove_file(&tarball);
        result.context(format!("Failed to extract {}", deb.display()))?;
    }
    Ok(())
}

/**
 * Populates an empty `root` with the essential packages of a distribution
 * whose package manager cannot start from an empty directory.
 *
 * The essential set is resolved and downloaded without running anything,
 * the archives are unpacked by hand and only then is the package manager
 * asked to install them, so maintainer scripts find the tools they need.
 * Any failure aborts the bootstrap and leaves the root as it is.
 */
pub fn bootstrap(
    backend: &dyn BootstrapBackend,
    root: &Path,
    debarch: &str,
    scratch: &Path,
) -> Result<()> {
    let step = complete_step("Bootstrapping essential packages…", None);

    setup_merged_usr(root, debarch)?;

    let side_channel = scratch.join(format!("essential-{}", uuid::Uuid::new_v4().simple()));
    let essential = backend
        .simulate_essential(&side_channel)
        .and_then(|_| read_essential(&side_channel));
    let _ = std::fs::remove_file(&side_channel);
    let essential = essential?;
    trace!(
        "Essential packages: {}",
        essential_package_names(&essential).join(" ")
    );

    extract_essential(backend, root, scratch, &essential)?;
    backend.install(&essential_package_names(&essential))?;

    step.finish();
    Ok(())
}
