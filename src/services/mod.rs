pub mod markdown;
pub mod pricing;
pub mod progress_store;

pub use markdown::{convert, split_bold_runs, MarkdownBlocks};
pub use progress_store::{progress_key, ProgressStore};
