//! Serialization of pipeline results.
//!
//! - [`write_json`] / [`to_json`] and [`read_json`] / [`from_json`] - the
//!   [`UniversalContextPack`](crate::core::pack::UniversalContextPack) as
//!   pretty JSON, the form a previous run is fed back in as
//! - [`write_csv`] / [`to_csv`] - a validation suite as a `;`-delimited
//!   checklist - requires `csv-output` feature
//!
//! # Example
//!
//! ```rust
//! use ctxpack::core::output::{from_json, to_json};
//! use ctxpack::core::pack::UniversalContextPack;
//! use chrono::Utc;
//!
//! # fn main() -> ctxpack::Result<()> {
//! let pack = UniversalContextPack::new("chatgpt", Utc::now());
//! let json = to_json(&pack)?;
//! assert_eq!(from_json(&json)?, pack);
//! # Ok(())
//! # }
//! ```

#[cfg(feature = "csv-output")]
mod csv_writer;
mod json_writer;

#[cfg(feature = "csv-output")]
pub use csv_writer::{CSV_HEADER, to_csv, write_csv};
pub use json_writer::{from_json, read_json, to_json, write_json};
