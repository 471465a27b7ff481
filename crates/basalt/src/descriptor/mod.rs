mod layout;
mod pool;
mod write;

pub use layout::*;
pub use pool::*;
pub use write::*;
