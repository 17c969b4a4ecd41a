pub mod docx_loader;

pub use docx_loader::{extract_questions, load_questions};
