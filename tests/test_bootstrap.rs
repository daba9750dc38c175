mod fixtures;

use anyhow::{Result, anyhow};
use fixtures::{payload_tarball, rid};
use rootstrap::installer::{BootstrapBackend, bootstrap};
use rstest::*;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

const ARCHIVES: &str = "/var/cache/apt/archives";

/* Stands in for apt and dpkg: serves canned payloads and records what the
 * root looked like when the real install was requested. */
struct FakeBackend {
    root: PathBuf,
    payloads: BTreeMap<String, Vec<u8>>,
    essential: Vec<String>,
    installed: RefCell<Option<Vec<String>>>,
    files_at_install: RefCell<Vec<String>>,
}

impl FakeBackend {
    fn new(root: &Path) -> Self {
        let mut payloads = BTreeMap::new();
        payloads.insert(
            "base-files_13_amd64.deb".to_string(),
            payload_tarball(&[
                ("etc/debian_version", "trixie/sid\n"),
                ("usr/share/base-files/motd", "Welcome\n"),
            ]),
        );
        payloads.insert(
            "base-passwd_3.6.3_amd64.deb".to_string(),
            payload_tarball(&[
                ("usr/share/base-passwd/passwd.master", "root:*:0:0:root:/root:/bin/sh\n"),
                ("sbin/update-passwd", "#!/bin/sh\n"),
            ]),
        );
        FakeBackend {
            root: root.to_path_buf(),
            essential: payloads.keys().cloned().collect(),
            payloads,
            installed: RefCell::new(None),
            files_at_install: RefCell::new(Vec::new()),
        }
    }
}

impl BootstrapBackend for FakeBackend {
    fn simulate_essential(&self, side_channel: &Path) -> Result<()> {
        let mut out = File::create(side_channel)?;
        for deb in &self.essential {
            writeln!(out, "{}/{}", ARCHIVES, deb)?;
        }
        Ok(())
    }

    fn fsys_tarfile(&self, deb: &Path, mut output: File) -> Result<()> {
        let name = deb.file_name().map(|n| n.to_string_lossy().into_owned());
        let payload = name
            .and_then(|name| self.payloads.get(&name))
            .ok_or_else(|| anyhow!("no such archive {}", deb.display()))?;
        output.write_all(payload)?;
        Ok(())
    }

    fn install(&self, packages: &[String]) -> Result<()> {
        *self.files_at_install.borrow_mut() = files_in(&self.root);
        *self.installed.borrow_mut() = Some(packages.to_vec());
        Ok(())
    }
}

fn files_in(root: &Path) -> Vec<String> {
    let mut files: Vec<String> = WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| {
            e.path()
                .strip_prefix(root)
                .ok()
                .map(|p| p.display().to_string())
        })
        .collect();
    files.sort();
    files
}

#[rstest]
fn test_bootstrap_extracts_before_installing() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let root = dir.path().join("root");
    let scratch = dir.path().join("workspace");
    std::fs::create_dir_all(&root)?;
    std::fs::create_dir_all(&scratch)?;

    let backend = FakeBackend::new(&root);
    bootstrap(&backend, &root, "amd64", &scratch)?;

    assert_eq!(
        backend.installed.borrow().clone(),
        Some(vec!["base-files".to_string(), "base-passwd".to_string()])
    );
    // sbin/update-passwd went through the merged /usr link
    assert_eq!(
        *backend.files_at_install.borrow(),
        vec![
            "etc/debian_version",
            "usr/sbin/update-passwd",
            "usr/share/base-files/motd",
            "usr/share/base-passwd/passwd.master",
        ]
    );
    assert!(root.join("sbin").is_symlink());
    assert!(root.join("lib64").is_symlink());

    // Nothing is left behind in the scratch directory
    assert_eq!(std::fs::read_dir(&scratch)?.count(), 0);
    Ok(())
}

#[rstest]
fn test_empty_essential_set_is_fatal() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let root = dir.path().join("root");
    std::fs::create_dir_all(&root)?;

    let mut backend = FakeBackend::new(&root);
    backend.essential.clear();
    let err = bootstrap(&backend, &root, "arm64", dir.path()).unwrap_err();

    assert!(format!("{:#}", err).contains("no essential packages resolved"));
    assert!(backend.installed.borrow().is_none());
    Ok(())
}

#[rstest]
fn test_failed_extraction_aborts(#[values("amd64", "riscv64")] debarch: &str) -> Result<()> {
    let dir = tempfile::tempdir()?;
    let root = dir.path().join("root");
    std::fs::create_dir_all(&root)?;

    let mut backend = FakeBackend::new(&root);
    backend.essential.push(format!("libc6_{}_{}.deb", rid(), debarch));
    let err = bootstrap(&backend, &root, debarch, dir.path()).unwrap_err();

    assert!(format!("{:#}", err).contains("no such archive"));
    assert!(backend.installed.borrow().is_none());
    Ok(())
}
