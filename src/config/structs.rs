use super::impls::deserialize_level_filter;
use crate::distributions::{Architecture, Distribution};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

#[derive(Deserialize, Default, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct PartialConfig {
    #[serde(deserialize_with = "deserialize_level_filter", default)]
    pub log_level: Option<log::LevelFilter>,
    pub distribution: Option<Distribution>,
    pub release: Option<String>,
    pub architecture: Option<Architecture>,
    pub mirror: Option<String>,
    pub local_mirror: Option<String>,
    pub repositories: Option<Vec<String>>,
    pub repository_key_check: Option<bool>,
    pub with_docs: Option<bool>,
    pub with_recommends: Option<bool>,
    pub network: Option<bool>,
    pub debug_shell: Option<bool>,
    pub packages: Option<Vec<String>>,
    pub remove_packages: Option<Vec<String>>,
    pub environment: Option<BTreeMap<String, String>>,
    pub root: Option<PathBuf>,
    pub pkgmngr: Option<PathBuf>,
    pub cache_dir: Option<PathBuf>,
    pub workspace_dir: Option<PathBuf>,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub log_level: log::LevelFilter,
    pub distribution: Distribution,
    pub release: String,
    pub architecture: Architecture,
    pub mirror: Option<String>,
    pub local_mirror: Option<String>,
    /// Extra components (apt) or repositories (pacman, dnf) to enable.
    pub repositories: Vec<String>,
    pub repository_key_check: bool,
    pub with_docs: bool,
    pub with_recommends: bool,
    pub network: bool,
    pub debug_shell: bool,
    pub packages: Vec<String>,
    pub remove_packages: Vec<String>,
    /// Overlay for the environment of package manager invocations.
    pub environment: BTreeMap<String, String>,
    pub root: PathBuf,
    /// Defaults to a directory inside the workspace.
    pub pkgmngr: Option<PathBuf>,
    pub cache_dir: PathBuf,
    pub workspace_dir: PathBuf,
    pub sources: HashMap<String, String>,
}
