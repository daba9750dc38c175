#![allow(dead_code)]

use anyhow::Result;
use rand::Rng;
use rstest::*;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

pub fn rid() -> String {
    let mut rng = rand::rng();
    let rid: String = (0..10)
        .map(|_| rng.sample(rand::distr::Alphanumeric) as char)
        .collect();
    rid
}

pub fn get_rootstrap_bin() -> String {
    env!("CARGO_BIN_EXE_rootstrap").to_string()
}

/* Runs the rootstrap binary from a scratch directory, so default paths and
 * the default config file resolve inside it. */
pub struct RootstrapManager {
    pub dir: TempDir,
    pub last_stdout: String,
    pub last_stderr: String,
    pub rootstrap_bin: String,
    /* When false, --no-config is added unless the test picks a config */
    pub no_default_options: bool,
}

impl RootstrapManager {
    pub fn new() -> Self {
        #[allow(clippy::panic)]
        let dir = match tempfile::Builder::new()
            .prefix(&format!("rootstrap-test-{}-", rid()))
            .tempdir()
        {
            Ok(dir) => dir,
            Err(e) => panic!("Failed to create test directory: {}", e),
        };

        Self {
            dir,
            last_stdout: String::new(),
            last_stderr: String::new(),
            rootstrap_bin: get_rootstrap_bin(),
            no_default_options: false,
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    #[allow(dead_code)]
    pub fn test_filename(&self, prefix: &str) -> PathBuf {
        self.path().join(format!("{}-{}", prefix, rid()))
    }

    pub fn run(&mut self, args: &[&str]) -> Result<std::process::Output> {
        self.run_with_env(args, &[])
    }

    pub fn run_with_env(
        &mut self,
        args: &[&str],
        env: &[(&str, &str)],
    ) -> Result<std::process::Output> {
        let mut cmd = Command::new(&self.rootstrap_bin);
        cmd.current_dir(self.path());
        cmd.env("TMPDIR", self.path());
        for (key, _) in std::env::vars() {
            if key.starts_with("ROOTSTRAP_") {
                cmd.env_remove(key);
            }
        }
        for (key, value) in env {
            println!("Setting env var: {}={}", key, value);
            cmd.env(key, value);
        }

        if !self.no_default_options
            && !args
                .iter()
                .any(|arg| arg.starts_with("--config") || *arg == "--no-config")
        {
            cmd.arg("--no-config");
        }
        cmd.args(args);

        println!(
            "Running command: {} {}",
            cmd.get_program().to_string_lossy(),
            cmd.get_args()
                .map(|c| c.to_string_lossy())
                .collect::<Vec<_>>()
                .join(" ")
        );

        let output = cmd
            .output()
            .map_err(|e| anyhow::anyhow!("Command failed: {}", e))?;
        self.last_stdout = String::from_utf8_lossy(&output.stdout).to_string();
        self.last_stderr = String::from_utf8_lossy(&output.stderr).to_string();

        match output.status.code() {
            Some(0) => Ok(output),
            Some(code) => Err(anyhow::anyhow!(
                "Command returned non-zero exit code: {}\nstdout: {}\nstderr: {}",
                code,
                self.last_stdout,
                self.last_stderr
            )),
            None => Err(anyhow::anyhow!(
                "Command did not return a valid exit code\nstdout: {}\nstderr: {}",
                self.last_stdout,
                self.last_stderr
            )),
        }
    }

    #[allow(dead_code)]
    pub fn epass(&mut self, args: &[&str], env: &[(&str, &str)]) -> bool {
        if self.run_with_env(args, env).is_ok() {
            return true;
        }
        println!("last_stderr: {}", self.last_stderr);
        println!("last_stdout: {}", self.last_stdout);
        false
    }

    #[allow(dead_code)]
    pub fn exfail(&mut self, args: &[&str], env: &[(&str, &str)]) -> bool {
        if self.run_with_env(args, env).is_err() {
            return true;
        }
        println!("last_stderr: {}", self.last_stderr);
        println!("last_stdout: {}", self.last_stdout);
        false
    }

    #[allow(dead_code)]
    pub fn pass(&mut self, args: &[&str]) -> bool {
        self.epass(args, &[])
    }

    #[allow(dead_code)]
    pub fn xfail(&mut self, args: &[&str]) -> bool {
        self.exfail(args, &[])
    }
}

#[fixture]
pub fn rootstrap() -> RootstrapManager {
    RootstrapManager::new()
}

/* Builds a tarball holding `files`, each given as (path, contents), the
 * way `dpkg-deb --fsys-tarfile` would stream a package's payload. */
#[allow(dead_code)]
pub fn payload_tarball(files: &[(&str, &str)]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    for (path, contents) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(contents.len() as u64);
        header.set_mode(0o644);
        header.set_uid(0);
        header.set_gid(0);
        header.set_mtime(1_700_000_000);
        header.set_cksum();
        builder
            .append_data(&mut header, path, contents.as_bytes())
            .unwrap();
    }
    builder.into_inner().unwrap()
}
