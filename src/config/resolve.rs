use super::PartialConfig;
use super::cli::Args;
use super::impls::{parse_assignment, parse_bool, split_list};
use crate::config::Config;
use crate::distributions::{Architecture, Distribution};
use anyhow::{Context, Result, anyhow};
use log::trace;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::str::FromStr;

const DEFAULT_CONFIG_FILE: &str = "rootstrap.toml";
const ENV_PREFIX: &str = "ROOTSTRAP_";

pub fn resolve_config(cli: Args) -> Result<Config> {
    let vars: HashMap<String, String> = std::env::vars()
        .filter(|(key, _)| key.starts_with(ENV_PREFIX))
        .collect();
    let cwd = std::env::current_dir().context("failed to get current directory")?;
    resolve_config_with(cli, &vars, &cwd)
}

/**
 * Resolves the configuration from, in increasing order of precedence, the
 * config file, `ROOTSTRAP_*` variables in `vars` and the command line.
 * Relative paths are taken relative to `cwd`.
 */
pub fn resolve_config_with(
    cli: Args,
    vars: &HashMap<String, String>,
    cwd: &Path,
) -> Result<Config> {
    let config_file = if cli.no_config {
        None
    } else if let Some(path) = &cli.config {
        Some(cwd.join(path))
    } else {
        Some(cwd.join(DEFAULT_CONFIG_FILE)).filter(|path| path.exists())
    };

    let (mut partial_config, mut sources) = match &config_file {
        Some(path) => load_partial(path)?,
        None => {
            trace!("No config file found, using default config");
            (PartialConfig::default(), HashMap::new())
        }
    };

    apply_environment(&mut partial_config, &mut sources, vars)?;
    apply_cli(&mut partial_config, &mut sources, cli);

    let distribution = partial_config.distribution.unwrap_or(Distribution::Debian);
    let release = match partial_config.release {
        Some(release) => release,
        None => {
            sources.insert("release".into(), "default for distribution".into());
            distribution.default_release().to_string()
        }
    };
    let architecture = match partial_config.architecture {
        Some(architecture) => architecture,
        None => {
            sources.insert("architecture".into(), "native".into());
            Architecture::native()?
        }
    };

    let absolute = |path: PathBuf| cwd.join(path);
    let workspace_dir = partial_config
        .workspace_dir
        .or_else(|| std::env::var_os("TMPDIR").map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("/var/tmp"));

    for key in super::cli::CONFIG_KEYS {
        if !sources.contains_key(key) {
            sources.insert(key.into(), "default".into());
        }
    }

    let config = Config {
        log_level: partial_config.log_level.unwrap_or(log::LevelFilter::Info),
        distribution,
        release,
        architecture,
        mirror: partial_config.mirror,
        local_mirror: partial_config.local_mirror,
        repositories: partial_config.repositories.unwrap_or_default(),
        repository_key_check: partial_config.repository_key_check.unwrap_or(true),
        with_docs: partial_config.with_docs.unwrap_or(false),
        with_recommends: partial_config.with_recommends.unwrap_or(false),
        network: partial_config.network.unwrap_or(false),
        debug_shell: partial_config.debug_shell.unwrap_or(false),
        packages: partial_config.packages.unwrap_or_default(),
        remove_packages: partial_config.remove_packages.unwrap_or_default(),
        environment: partial_config.environment.unwrap_or_default(),
        root: absolute(partial_config.root.unwrap_or_else(|| PathBuf::from("root"))),
        pkgmngr: partial_config.pkgmngr.map(absolute),
        cache_dir: absolute(
            partial_config
                .cache_dir
                .unwrap_or_else(|| PathBuf::from("rootstrap.cache")),
        ),
        workspace_dir: absolute(workspace_dir),
        sources,
    };

    validate_config(&config)?;

    trace!("Root: {}", config.root.display());
    trace!("Distribution: {} {}", config.distribution, config.release);

    Ok(config)
}

pub fn load_partial(path: &Path) -> Result<(PartialConfig, HashMap<String, String>)> {
    let config_str = std::fs::read_to_string(path)
        .context(format!("Failed to read config file {}", path.display()))?;
    let config: PartialConfig = toml::from_str(&config_str)
        .context(format!("Failed to parse config file {}", path.display()))?;

    let mut merged_config = PartialConfig::default();
    let mut sources = HashMap::new();
    merge_configs(
        &mut merged_config,
        &mut sources,
        config,
        &path.display().to_string(),
    );
    trace!("Loaded config file: {}", path.display());

    Ok((merged_config, sources))
}

fn env_value<T, E: std::fmt::Display>(
    vars: &HashMap<String, String>,
    key: &str,
    parse: impl Fn(&str) -> Result<T, E>,
) -> Result<Option<T>> {
    match vars.get(&format!("{}{}", ENV_PREFIX, key)) {
        Some(value) if !value.is_empty() => parse(value)
            .map(Some)
            .map_err(|e| anyhow!("Invalid value for {}{}: {}", ENV_PREFIX, key, e)),
        _ => Ok(None),
    }
}

fn apply_environment(
    partial_config: &mut PartialConfig,
    sources: &mut HashMap<String, String>,
    vars: &HashMap<String, String>,
) -> Result<()> {
    let string = |s: &str| Ok::<_, String>(s.to_string());
    let path = |s: &str| Ok::<_, String>(PathBuf::from(s));
    let list = |s: &str| Ok::<_, String>(split_list(s));

    let mut env = PartialConfig {
        log_level: env_value(vars, "LOG_LEVEL", log::LevelFilter::from_str)?,
        distribution: env_value(vars, "DISTRIBUTION", Distribution::from_str)?,
        release: env_value(vars, "RELEASE", string)?,
        architecture: env_value(vars, "ARCHITECTURE", Architecture::from_str)?,
        mirror: env_value(vars, "MIRROR", string)?,
        local_mirror: env_value(vars, "LOCAL_MIRROR", string)?,
        repositories: env_value(vars, "REPOSITORIES", list)?,
        repository_key_check: env_value(vars, "REPOSITORY_KEY_CHECK", parse_bool)?,
        with_docs: env_value(vars, "WITH_DOCS", parse_bool)?,
        with_recommends: env_value(vars, "WITH_RECOMMENDS", parse_bool)?,
        network: env_value(vars, "NETWORK", parse_bool)?,
        debug_shell: env_value(vars, "DEBUG_SHELL", parse_bool)?,
        packages: env_value(vars, "PACKAGES", list)?,
        remove_packages: env_value(vars, "REMOVE_PACKAGES", list)?,
        environment: None,
        root: env_value(vars, "ROOT", path)?,
        pkgmngr: env_value(vars, "PKGMNGR", path)?,
        cache_dir: env_value(vars, "CACHE_DIR", path)?,
        workspace_dir: env_value(vars, "WORKSPACE_DIR", path)?,
    };

    if let Some(assignments) = env_value(vars, "ENVIRONMENT", list)? {
        env.environment = Some(
            assignments
                .iter()
                .map(|s| parse_assignment(s))
                .collect::<Result<BTreeMap<_, _>, _>>()
                .map_err(|e| anyhow!("Invalid value for {}ENVIRONMENT: {}", ENV_PREFIX, e))?,
        );
    }

    merge_configs(partial_config, sources, env, "environment");
    Ok(())
}

fn apply_cli(
    partial_config: &mut PartialConfig,
    sources: &mut HashMap<String, String>,
    cli: Args,
) {
    let flag = |set: bool| set.then_some(true);
    let cli_config = PartialConfig {
        log_level: cli.log_level,
        distribution: cli.distribution,
        release: cli.release,
        architecture: cli.architecture,
        mirror: cli.mirror,
        local_mirror: cli.local_mirror,
        repositories: cli.repositories,
        repository_key_check: cli.repository_key_check,
        with_docs: flag(cli.with_docs),
        with_recommends: flag(cli.with_recommends),
        network: flag(cli.network),
        debug_shell: flag(cli.debug_shell),
        packages: cli.packages,
        remove_packages: cli.remove_packages,
        environment: cli.environment.map(|e| e.into_iter().collect()),
        root: cli.root,
        pkgmngr: cli.pkgmngr,
        cache_dir: cli.cache_dir,
        workspace_dir: cli.workspace_dir,
    };
    merge_configs(partial_config, sources, cli_config, "cli");
}

macro_rules! merge_fields {
    ($base:ident, $sources:ident, $override:ident, $source:ident; $($field:ident),*) => {
        $(
            if let Some(value) = $override.$field {
                $base.$field = Some(value);
                $sources.insert(stringify!($field).into(), $source.into());
            }
        )*
    };
}

macro_rules! extend_fields {
    ($base:ident, $sources:ident, $override:ident, $source:ident; $($field:ident),*) => {
        $(
            if let Some(values) = $override.$field {
                match &mut $base.$field {
                    Some(existing) => existing.extend(values),
                    None => $base.$field = Some(values),
                }
                $sources.insert(stringify!($field).into(), $source.into());
            }
        )*
    };
}

/* Scalars are replaced, lists and the environment accumulate across
 * layers. */
fn merge_configs(
    base: &mut PartialConfig,
    sources: &mut HashMap<String, String>,
    override_config: PartialConfig,
    source: &str,
) {
    merge_fields!(base, sources, override_config, source;
        log_level, distribution, release, architecture, mirror, local_mirror,
        repository_key_check, with_docs, with_recommends, network, debug_shell,
        root, pkgmngr, cache_dir, workspace_dir);
    extend_fields!(base, sources, override_config, source;
        repositories, packages, remove_packages, environment);
}

fn validate_config(config: &Config) -> Result<()> {
    if config.release.is_empty() || config.release.contains('/') {
        return Err(anyhow!("Invalid release: '{}'", config.release));
    }
    config
        .distribution
        .architecture_name(config.architecture)
        .context("Invalid configuration")?;
    if config.packages.iter().any(|p| p.is_empty()) {
        return Err(anyhow!("Package names must not be empty"));
    }
    Ok(())
}
