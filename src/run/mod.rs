mod async_thread;
mod foreground;
mod fork;
mod process;
mod signals;
mod spawn;
mod uncaught;
mod wait;

pub use async_thread::*;
pub use foreground::*;
pub use fork::*;
pub use process::*;
pub use signals::*;
pub use spawn::*;
pub use uncaught::*;
pub use wait::*;
