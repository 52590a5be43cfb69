//! Core types for docstore
//!
//! This crate defines the foundational types used throughout the system:
//! - Identifier: ordered compound key (partition + clustering components)
//! - Value: cell and bound-parameter values
//! - DataType: column types understood by the backing store
//! - Name rules for databases, tables, indexes and fields

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod identifier;
pub mod names;
pub mod value;

pub use identifier::Identifier;
pub use names::{validate_field_path, validate_name, NameError, MAX_NAME_LENGTH};
pub use value::{DataType, UnknownDataType, Value};
