//! Shared building blocks for the Hoard crates.
//!
//! [`BinaryReader`] decodes archive headers from borrowed bytes with every
//! access bounds checked. The [`path`] module holds the rules for entry
//! path keys and nested paths.

mod error;
mod reader;

pub mod path;

pub use error::{Error, Result};
pub use reader::BinaryReader;
