mod channel;
mod handle;
mod queue;

pub mod poll;

pub use channel::*;
pub use handle::*;
pub use queue::*;
