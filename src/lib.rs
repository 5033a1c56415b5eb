mod data_processing;
mod error;

pub use data_processing::*;
pub use error::{DatasetError, Result};
