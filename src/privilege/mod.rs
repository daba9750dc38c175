mod become_root;
mod subrange;

pub use become_root::*;
pub use subrange::*;
