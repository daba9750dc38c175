use super::impls::{parse_assignment, parse_bool};
use crate::distributions::{Architecture, Distribution};
use clap::Parser;
use clap_complete::engine::{ArgValueCompleter, CompletionCandidate};
use std::path::PathBuf;

/// Keys understood by the `config` action, in display order.
pub const CONFIG_KEYS: [&str; 19] = [
    "log_level",
    "distribution",
    "release",
    "architecture",
    "mirror",
    "local_mirror",
    "repositories",
    "repository_key_check",
    "with_docs",
    "with_recommends",
    "network",
    "debug_shell",
    "packages",
    "remove_packages",
    "environment",
    "root",
    "pkgmngr",
    "cache_dir",
    "workspace_dir",
];

#[derive(Parser, Clone, Debug)]
#[command(version, about = "Build OS root filesystems from distribution packages as an unprivileged user", long_about = None)]
pub struct Args {
    /// Set the log level to one of trace, debug, info, warn, or error.
    /// `-v` is shorthand for enabling verbose (trace) logging.
    #[arg(short = 'v',
        long,
        global = true,
        default_missing_value = "trace",
        num_args = 0..=1,
        require_equals = true,
        value_parser = parse_log_level
    )]
    pub log_level: Option<log::LevelFilter>,

    /// Configuration file to load instead of `rootstrap.toml`
    #[arg(long, global = true, value_hint = clap::ValueHint::FilePath, conflicts_with = "no_config")]
    pub config: Option<PathBuf>,

    /// Do not load config files.
    #[arg(long, global = true, action = clap::ArgAction::SetTrue)]
    pub no_config: bool,

    /// Distribution to install
    #[arg(short = 'd', long, global = true, value_enum)]
    pub distribution: Option<Distribution>,

    /// Release of the distribution, defaults to the distribution's default
    #[arg(short = 'r', long, global = true)]
    pub release: Option<String>,

    /// Architecture to install for, defaults to the native one
    #[arg(long, global = true, value_parser = parse_architecture)]
    pub architecture: Option<Architecture>,

    /// Mirror to download packages from
    #[arg(short = 'm', long, global = true, value_hint = clap::ValueHint::Url)]
    pub mirror: Option<String>,

    /// Local mirror that replaces every other repository
    #[arg(long, global = true, value_hint = clap::ValueHint::Url)]
    pub local_mirror: Option<String>,

    /// Additional components or repositories to enable. Can be specified
    /// multiple times or as a comma-separated list.
    #[arg(long, global = true, value_delimiter = ',', action = clap::ArgAction::Append)]
    pub repositories: Option<Vec<String>>,

    /// Whether to check repository signatures
    #[arg(long, global = true, value_parser = parse_bool)]
    pub repository_key_check: Option<bool>,

    /// Install documentation
    #[arg(long, global = true, action = clap::ArgAction::SetTrue)]
    pub with_docs: bool,

    /// Install recommended packages
    #[arg(long, global = true, action = clap::ArgAction::SetTrue)]
    pub with_recommends: bool,

    /// Allow network access for commands run inside the root
    #[arg(long, global = true, action = clap::ArgAction::SetTrue)]
    pub network: bool,

    /// Offer a shell inside the sandbox when a command in it fails
    #[arg(long, global = true, action = clap::ArgAction::SetTrue)]
    pub debug_shell: bool,

    /// Packages to install. Can be specified multiple times or as a
    /// comma-separated list.
    #[arg(short = 'p', long = "package", global = true, value_delimiter = ',', action = clap::ArgAction::Append)]
    pub packages: Option<Vec<String>>,

    /// Packages to remove after installing
    #[arg(long = "remove-package", global = true, value_delimiter = ',', action = clap::ArgAction::Append)]
    pub remove_packages: Option<Vec<String>>,

    /// Environment variable for package manager invocations, KEY=VALUE
    #[arg(short = 'E', long = "environment", global = true, value_parser = parse_assignment, action = clap::ArgAction::Append)]
    pub environment: Option<Vec<(String, String)>>,

    /// Directory the root filesystem is built in
    #[arg(long, global = true, value_hint = clap::ValueHint::DirPath)]
    pub root: Option<PathBuf>,

    /// Directory holding package manager configuration and state
    #[arg(long, global = true, value_hint = clap::ValueHint::DirPath)]
    pub pkgmngr: Option<PathBuf>,

    /// Directory downloaded packages are cached in
    #[arg(long, global = true, value_hint = clap::ValueHint::DirPath)]
    pub cache_dir: Option<PathBuf>,

    /// Directory scratch workspaces are created in
    #[arg(long, global = true, value_hint = clap::ValueHint::DirPath)]
    pub workspace_dir: Option<PathBuf>,

    /// Formats action output as a JSON blob.
    #[arg(long, global = true, action = clap::ArgAction::SetTrue)]
    pub json: bool,

    #[command(subcommand)]
    pub action: Action,
}

#[derive(clap::Subcommand, Clone, Debug)]
#[command(subcommand_help_heading = "Actions")]
pub enum Action {
    /// Bootstrap the root and install the configured packages
    Install,

    /// Remove the configured packages from the root
    Remove {
        /// Packages to remove, in addition to the configured ones
        #[arg(value_name = "PACKAGES", num_args = 0..)]
        packages: Option<Vec<String>>,
    },

    /// Run a command with the root as its filesystem root
    Shell {
        /// The command to run, defaults to `sh`
        #[arg(
            trailing_var_arg = true,
            allow_hyphen_values = true,
            num_args = 0..,
        )]
        command: Option<Vec<String>>,
    },

    /// Get current configuration options
    Config {
        /// The keys to get from the configuration
        #[arg(value_name = "KEYS", num_args = 0.., add = ArgValueCompleter::new(config_key_completion))]
        keys: Option<Vec<String>>,
    },
}

pub fn config_key_completion(current: &std::ffi::OsStr) -> Vec<CompletionCandidate> {
    let Some(current) = current.to_str() else {
        return vec![];
    };
    CONFIG_KEYS
        .iter()
        .filter(|key| key.starts_with(current))
        .map(|key| CompletionCandidate::new(*key))
        .collect()
}

fn parse_log_level(s: &str) -> Result<log::LevelFilter, String> {
    s.parse::<log::LevelFilter>().map_err(|e| e.to_string())
}

fn parse_architecture(s: &str) -> Result<Architecture, String> {
    s.parse::<Architecture>()
}
