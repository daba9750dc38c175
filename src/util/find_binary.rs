use log::trace;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Looks up the first of `names` that can be found. Without `root` the
/// search uses our own `PATH`; with `root` it searches `usr/bin` and
/// `usr/sbin` inside the root and returns the path as seen from inside it.
pub fn find_binary(names: &[&str], root: Option<&Path>) -> Option<PathBuf> {
    let search_path = match root {
        Some(root) => {
            let mut path = OsString::from(root.join("usr/bin"));
            path.push(":");
            path.push(root.join("usr/sbin"));
            path
        }
        None => std::env::var_os("PATH").unwrap_or_default(),
    };
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("/"));

    for name in names {
        if let Ok(binary) = which::which_in(name, Some(&search_path), &cwd) {
            let found = match root {
                Some(root) => match binary.strip_prefix(root) {
                    Ok(relative) => Path::new("/").join(relative),
                    Err(_) => binary,
                },
                None => binary,
            };
            trace!("Found {} at {}", name, found.display());
            return Some(found);
        }
    }

    None
}
