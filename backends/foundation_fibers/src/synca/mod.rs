mod drops;
mod event;
mod signals;

pub use drops::*;
pub use event::*;
pub use signals::*;
