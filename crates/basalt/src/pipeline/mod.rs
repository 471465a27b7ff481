mod layout;
mod vertex;

pub use layout::*;
pub use vertex::*;
