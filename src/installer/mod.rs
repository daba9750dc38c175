mod apt;
mod archive;
mod bootstrap;
mod dnf;
mod pacman;
mod policy;
mod state;

pub use apt::*;
pub use archive::*;
pub use bootstrap::*;
pub use dnf::*;
pub use pacman::*;
pub use policy::*;
pub use state::*;

#[cfg(test)]
pub(crate) use state::test_support;

/**
 * Orders packages for a package manager command line: plain names first,
 * then paths to local package files, then rich dependency expressions. Each
 * group is sorted on its own.
 */
pub fn sort_packages<S: AsRef<str>>(packages: &[S]) -> Vec<String> {
    let mut packages: Vec<String> =
        packages.iter().map(|p| p.as_ref().to_string()).collect();
    packages.sort_by(|a, b| {
        let rank = |p: &str| {
            if p.starts_with('(') {
                2
            } else if p.contains('/') {
                1
            } else {
                0
            }
        };
        rank(a).cmp(&rank(b)).then_with(|| a.cmp(b))
    });
    packages
}
