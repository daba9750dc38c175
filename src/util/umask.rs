use nix::sys::stat::{Mode, umask};

/// Restores the previous umask when dropped.
pub struct Umask {
    previous: Mode,
}

/// Sets the process umask so that files are created with at most `mode`
/// permissions, e.g. `with_mode(0o755)` sets umask 022.
pub fn with_mode(mode: u32) -> Umask {
    let mask = Mode::from_bits_truncate(!mode & 0o777);
    Umask {
        previous: umask(mask),
    }
}

impl Drop for Umask {
    fn drop(&mut self) {
        umask(self.previous);
    }
}
