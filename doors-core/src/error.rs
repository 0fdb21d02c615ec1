/// Error types for feature collection handling
use std::path::PathBuf;

use thiserror::Error;

/// Main error type for loading and deriving feature collections
#[derive(Error, Debug)]
pub enum FeatureError {
    /// Collection id is not part of the configuration
    #[error("No collection with name '{0}' configured")]
    UnknownCollection(String),

    /// Configuration could not be decoded or is inconsistent
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// A configured or required column is absent from a table
    #[error("Column '{column}' not found in {context}")]
    MissingColumn { context: String, column: String },

    /// Operation needs a geometry type the collection does not have
    #[error("Collection '{collection}' has {found} geometry where {expected} was expected")]
    GeometryMismatch {
        collection: String,
        expected: &'static str,
        found: &'static str,
    },

    /// Collection loaded but contains no rows
    #[error("Collection '{0}' is empty")]
    EmptyCollection(String),

    /// Time column value could not be parsed
    #[error("Invalid timestamp '{value}' in column '{column}'")]
    InvalidTimestamp { column: String, value: String },

    /// Coordinate reference system cannot be converted to the reference CRS
    #[error("Unsupported coordinate reference system: {0}")]
    UnsupportedCrs(String),

    /// Local file has an extension no loader understands
    #[error("Unsupported file format: {}", .0.display())]
    UnsupportedFormat(PathBuf),

    /// Geometry text could not be decoded
    #[error("Failed to parse geometry: {0}")]
    Geometry(String),

    /// Reading a local file failed
    #[error("Failed to read '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse CSV data
    #[error("Failed to parse CSV: {0}")]
    Csv(#[from] csv::Error),

    /// Failed to parse JSON data
    #[error("Failed to parse JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Failed to parse GeoJSON data
    #[error("Failed to parse GeoJSON: {0}")]
    GeoJson(#[from] geojson::Error),

    /// Remote data source reported a failure
    #[error("Remote data source failed: {0}")]
    Remote(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Type alias for Results using FeatureError
pub type Result<T> = std::result::Result<T, FeatureError>;
