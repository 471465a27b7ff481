pub extern crate ash;

pub mod descriptor;
mod device;
mod error;
mod pipeline;
pub mod render_pass;
pub mod shader;
pub mod utils;

#[cfg(test)]
mod testing;

pub use device::{Backend, Device, HasDevice};
pub use error::{Error, Result};
pub use pipeline::*;
