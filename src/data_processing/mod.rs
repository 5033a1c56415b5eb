mod annotation;
mod batcher;
mod dataset;
mod planner;
mod smiles_index;
mod tokenizer;

pub use annotation::*;
pub use batcher::*;
pub use dataset::*;
pub use planner::*;
pub use smiles_index::*;
pub use tokenizer::*;
