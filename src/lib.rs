pub mod output;
pub mod pipeline;
pub mod processing;
pub mod source;
pub mod utils;

pub use utils::error::{Error, Result};
