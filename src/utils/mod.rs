pub mod logging;

pub use logging::{format_eta, truncate_text};
