pub mod docx_document;

pub use docx_document::{DocxDocument, MemoryDocument, OutputDocument};
