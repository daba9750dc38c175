mod apivfs;
mod bwrap;
mod chroot;
mod invocation;

pub use apivfs::*;
pub use bwrap::*;
pub use chroot::*;
pub use invocation::*;
