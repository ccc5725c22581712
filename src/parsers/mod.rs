//! Export parsers.
//!
//! Each parser implements [`Parser`](crate::parser::Parser).
//!
//! # Available Parsers
//!
//! - [`ChatGptParser`] - ChatGPT data exports (JSON or ZIP)

mod chatgpt;

pub use chatgpt::ChatGptParser;
