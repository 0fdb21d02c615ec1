//! Core types for oceanographic and meteorological feature collections.
//!
//! - [`table::Table`] - attribute columns plus one geometry per row
//! - [`value::Value`] - loosely typed cell values
//! - [`config`] - typed collection configuration
//! - [`geometry`] - WKT decoding, reprojection and mask clipping
//! - [`source::DataSourceClient`] - remote collection access

pub mod config;
pub mod error;
pub mod geometry;
pub mod source;
pub mod table;
pub mod time;
pub mod value;

pub use error::{FeatureError, Result};
pub use table::{Table, GEOMETRY_COLUMN};
pub use value::Value;
