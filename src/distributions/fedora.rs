use anyhow::Result;

use super::{Architecture, join_mirror};
use crate::installer::{
    BuildState, RpmRepository, find_rpm_gpgkey, invoke_dnf, setup_dnf,
};

pub(super) fn architecture_name(arch: Architecture) -> Option<&'static str> {
    let name = match arch {
        Architecture::Arm64 => "aarch64",
        Architecture::Ia64 => "ia64",
        Architecture::Mips64Le => "mips64el",
        Architecture::MipsLe => "mipsel",
        Architecture::Parisc => "parisc64",
        Architecture::Ppc64Le => "ppc64le",
        Architecture::Riscv64 => "riscv64",
        Architecture::S390x => "s390x",
        Architecture::X86_64 => "x86_64",
        _ => return None,
    };
    Some(name)
}

/// Whether `release` is `threshold` or older. Rawhide and ELN are newer
/// than any numbered release.
pub fn fedora_release_at_most(release: &str, threshold: &str) -> bool {
    let rolling = |r: &str| r == "rawhide" || r == "eln";
    if rolling(release) {
        return false;
    }
    if rolling(threshold) {
        return true;
    }
    match (release.parse::<u32>(), threshold.parse::<u32>()) {
        (Ok(release), Ok(threshold)) => release <= threshold,
        _ => false,
    }
}

/// The `updates`, `updates-debuginfo` and `updates-source` triple and
/// friends: one enabled binary repository and its disabled companions.
fn with_companions(
    id: &str,
    binary: String,
    debug: String,
    source: String,
    gpgurls: &[String],
    enabled: bool,
) -> Vec<RpmRepository> {
    let main = RpmRepository::new(id, binary, gpgurls);
    vec![
        if enabled { main } else { main.disabled() },
        RpmRepository::new(&format!("{}-debuginfo", id), debug, gpgurls).disabled(),
        RpmRepository::new(&format!("{}-source", id), source, gpgurls).disabled(),
    ]
}

pub(super) fn repositories(state: &BuildState) -> Vec<RpmRepository> {
    let config = &state.config;
    let gpgurls = vec![find_rpm_gpgkey(
        state,
        &format!("RPM-GPG-KEY-fedora-{}-primary", config.release),
        "https://fedoraproject.org/fedora.gpg",
    )];

    if let Some(local_mirror) = &config.local_mirror {
        return vec![RpmRepository::new(
            "fedora",
            format!("baseurl={}", local_mirror),
            &gpgurls,
        )];
    }

    let mut repos = Vec::new();
    if config.release == "eln" {
        let mirror = config.mirror.as_deref().unwrap_or(
            "https://odcs.fedoraproject.org/composes/production/latest-Fedora-ELN/compose",
        );
        for repo in ["Appstream", "BaseOS", "Extras", "CRB"] {
            let url = format!("baseurl={}", join_mirror(mirror, repo));
            let id = repo.to_lowercase();
            repos.push(RpmRepository::new(&id, format!("{}/$basearch/os", url), &gpgurls));
            repos.push(
                RpmRepository::new(&id, format!("{}/$basearch/debug/tree", url), &gpgurls)
                    .disabled(),
            );
            repos.push(
                RpmRepository::new(&id, format!("{}/source/tree", url), &gpgurls).disabled(),
            );
        }
    } else if let Some(mirror) = &config.mirror {
        let directory = if config.release == "rawhide" {
            "development"
        } else {
            "releases"
        };
        let url = format!(
            "baseurl={}",
            join_mirror(mirror, &format!("{}/$releasever/Everything", directory))
        );
        repos.extend(with_companions(
            "fedora",
            format!("{}/$basearch/os", url),
            format!("{}/$basearch/debug/tree", url),
            format!("{}/source/tree", url),
            &gpgurls,
            true,
        ));

        if config.release != "rawhide" {
            let url = format!(
                "baseurl={}",
                join_mirror(mirror, "updates/$releasever/Everything")
            );
            repos.extend(with_companions(
                "updates",
                format!("{}/$basearch", url),
                format!("{}/$basearch/debug", url),
                format!("{}/SRPMS", url),
                &gpgurls,
                true,
            ));

            let url = format!(
                "baseurl={}",
                join_mirror(mirror, "updates/testing/$releasever/Everything")
            );
            repos.extend(with_companions(
                "updates-testing",
                format!("{}/$basearch", url),
                format!("{}/$basearch/debug", url),
                format!("{}/source/tree", url),
                &gpgurls,
                false,
            ));
        }
    } else {
        let url = "metalink=https://mirrors.fedoraproject.org/metalink?arch=$basearch";
        repos.extend(with_companions(
            "fedora",
            format!("{}&repo=fedora-$releasever", url),
            format!("{}&repo=fedora-debug-$releasever", url),
            format!("{}&repo=fedora-source-$releasever", url),
            &gpgurls,
            true,
        ));

        if config.release != "rawhide" {
            repos.extend(with_companions(
                "updates",
                format!("{}&repo=updates-released-f$releasever", url),
                format!("{}&repo=updates-released-debug-f$releasever", url),
                format!("{}&repo=updates-released-source-f$releasever", url),
                &gpgurls,
                true,
            ));
            repos.extend(with_companions(
                "updates-testing",
                format!("{}&repo=updates-testing-f$releasever", url),
                format!("{}&repo=updates-testing-debug-f$releasever", url),
                format!("{}&repo=updates-testing-source-f$releasever", url),
                &gpgurls,
                false,
            ));
        }
    }

    repos
}

/// File lists are only needed up to Fedora 37.
fn filelists(state: &BuildState) -> bool {
    fedora_release_at_most(&state.config.release, "37")
}

pub(super) fn setup(state: &BuildState) -> Result<()> {
    setup_dnf(state, &repositories(state), filelists(state))
}

pub(super) fn install(state: &BuildState) -> Result<()> {
    install_packages(state, &["filesystem".to_string()], false)
}

pub(super) fn install_packages(
    state: &BuildState,
    packages: &[String],
    apivfs: bool,
) -> Result<()> {
    invoke_dnf(state, "install", packages, apivfs)
}

pub(super) fn remove_packages(state: &BuildState, packages: &[String]) -> Result<()> {
    invoke_dnf(state, "remove", packages, true)
}
