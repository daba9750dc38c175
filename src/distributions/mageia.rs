use anyhow::Result;

use super::{Architecture, copy_vmlinuz, join_mirror};
use crate::installer::{
    BuildState, RpmRepository, find_rpm_gpgkey, invoke_dnf, setup_dnf,
};

pub(super) fn architecture_name(arch: Architecture) -> Option<&'static str> {
    match arch {
        Architecture::X86_64 => Some("x86_64"),
        Architecture::Arm64 => Some("aarch64"),
        _ => None,
    }
}

pub(super) fn repositories(state: &BuildState) -> Vec<RpmRepository> {
    let config = &state.config;
    let gpgurls = vec![find_rpm_gpgkey(
        state,
        "RPM-GPG-KEY-Mageia",
        "https://mirrors.kernel.org/mageia/distrib/$releasever/$basearch/media/core/release/media_info/pubkey",
    )];

    if let Some(local_mirror) = &config.local_mirror {
        return vec![RpmRepository::new(
            "core-release",
            format!("baseurl={}", local_mirror),
            &gpgurls,
        )];
    }

    if let Some(mirror) = &config.mirror {
        let url = format!(
            "baseurl={}",
            join_mirror(mirror, "distrib/$releasever/$basearch/media/core/")
        );
        return vec![
            RpmRepository::new("core-release", format!("{}/release", url), &gpgurls),
            RpmRepository::new("core-updates", format!("{}/updates/", url), &gpgurls),
        ];
    }

    let url = "mirrorlist=https://www.mageia.org/mirrorlist/?release=$releasever&arch=$basearch&section=core";
    vec![
        RpmRepository::new("core-release", format!("{}&repo=release", url), &gpgurls),
        RpmRepository::new("core-updates", format!("{}&repo=updates", url), &gpgurls),
    ]
}

pub(super) fn setup(state: &BuildState) -> Result<()> {
    setup_dnf(state, &repositories(state), true)
}

pub(super) fn install(state: &BuildState) -> Result<()> {
    install_packages(state, &["filesystem".to_string()], false)
}

pub(super) fn install_packages(
    state: &BuildState,
    packages: &[String],
    apivfs: bool,
) -> Result<()> {
    invoke_dnf(state, "install", packages, apivfs)?;
    copy_vmlinuz(&state.root)
}

pub(super) fn remove_packages(state: &BuildState, packages: &[String]) -> Result<()> {
    invoke_dnf(state, "remove", packages, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distributions::Distribution;
    use crate::installer::test_support::{test_config, test_state};

    #[test]
    fn test_mirrorlist_by_default() {
        let base = tempfile::tempdir().unwrap();
        let state = test_state(test_config(base.path(), Distribution::Mageia));
        let repos = repositories(&state);
        assert_eq!(repos.len(), 2);
        assert!(repos[0].url.starts_with("mirrorlist="));
        assert!(repos[1].url.ends_with("&repo=updates"));
        assert!(repos.iter().all(|r| r.enabled));
    }

    #[test]
    fn test_mirror_urls() {
        let base = tempfile::tempdir().unwrap();
        let mut config = test_config(base.path(), Distribution::Mageia);
        config.mirror = Some("https://mirror.example/mageia".to_string());
        let repos = repositories(&test_state(config));
        assert_eq!(
            repos[0].url,
            "baseurl=https://mirror.example/mageia/distrib/$releasever/$basearch/media/core//release"
        );
    }
}
