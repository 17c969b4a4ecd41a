pub mod block;
pub mod checkpoint;
pub mod loaders;

pub use block::{Block, Run};
pub use checkpoint::{Checkpoint, RunStats};
pub use loaders::{extract_questions, load_questions};
