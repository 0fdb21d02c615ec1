//! Typed configuration for feature collections.
//!
//! The configuration document is JSON:
//!
//! ```json
//! {
//!   "features": [
//!     {"id": "3", "type": "local", "params": {"file": "ports.csv", "label": "mylabel"}}
//!   ],
//!   "eez": "eez/bulgaria.geojson"
//! }
//! ```
//!
//! Each entry of `features` is decoded once into a [`CollectionConfig`]
//! whose [`Source`] carries the parameters for its loader.

use crate::error::{FeatureError, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// CRS every loaded table is reprojected to.
pub const REFERENCE_CRS: &str = "EPSG:4326";

/// Time column used when a collection does not name one.
pub const DEFAULT_TIME_COLUMN: &str = "timestamp";

/// Map colour used when a collection does not name one.
pub const DEFAULT_COLOR: &str = "blue";

/// Environment variable holding the geo-database token by default.
pub const DEFAULT_ACCESS_TOKEN_ENV: &str = "GEODB_ACCESS_TOKEN";

/// Top-level configuration document.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub features: Vec<CollectionConfig>,
    /// Exclusion-zone boundary every collection is clipped to.
    #[serde(default)]
    pub eez: Option<PathBuf>,
    #[serde(default)]
    pub geodb: Option<GeoDbSettings>,
}

/// Connection settings for the remote geo-database.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct GeoDbSettings {
    pub server_url: String,
    #[serde(default = "default_access_token_env")]
    pub access_token_env: String,
}

/// One configured collection.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(try_from = "RawCollection")]
pub struct CollectionConfig {
    pub id: String,
    pub source: Source,
}

/// Where a collection's table is read from.
#[derive(Debug, Clone, PartialEq)]
pub enum Source {
    Local(LocalSource),
    GeoDb(RemoteSource),
}

/// A CSV or GeoJSON file on disk.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct LocalSource {
    pub file: PathBuf,
    #[serde(flatten)]
    pub params: CollectionParams,
}

/// A collection stored in the remote geo-database.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct RemoteSource {
    pub collection: String,
    pub database: String,
    #[serde(flatten)]
    pub params: CollectionParams,
}

/// Parameters shared by every source type.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct CollectionParams {
    #[serde(default)]
    pub title: Option<String>,
    /// Column used as point display text.
    #[serde(default)]
    pub label: Option<String>,
    /// Grouping columns, outermost first.
    #[serde(default)]
    pub levels: Option<Vec<String>>,
    /// Plottable columns. Derived from the table when absent.
    #[serde(default)]
    pub variables: Option<Vec<String>>,
    #[serde(default)]
    pub time_column: Option<String>,
    #[serde(default)]
    pub colorcodevariable: Option<ColorCodeConfig>,
    /// Opaque to this crate; consumed by the map renderer.
    #[serde(default)]
    pub mapmode: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub convert_from_parameters: Option<PivotSpec>,
    /// CRS of the source coordinates.
    #[serde(default)]
    pub crs: Option<String>,
}

impl CollectionParams {
    pub fn levels(&self) -> &[String] {
        self.levels.as_deref().unwrap_or(&[])
    }

    pub fn time_column(&self) -> &str {
        self.time_column.as_deref().unwrap_or(DEFAULT_TIME_COLUMN)
    }

    pub fn crs(&self) -> &str {
        self.crs.as_deref().unwrap_or(REFERENCE_CRS)
    }
}

/// Variable driving a continuous colour scale on the map.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ColorCodeConfig {
    pub name: String,
    #[serde(default)]
    pub color_range: Option<ColorRange>,
    #[serde(default)]
    pub color_min_value: Option<f64>,
    #[serde(default)]
    pub color_max_value: Option<f64>,
}

/// A named palette or an explicit list of colours.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ColorRange {
    Named(String),
    Colors(Vec<String>),
}

/// Long-to-wide reshaping of `parameter`/`value` row pairs.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct PivotSpec {
    pub keys: Vec<String>,
    pub parameter: String,
    pub value: String,
}

#[derive(Deserialize)]
struct RawCollection {
    id: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    params: serde_json::Value,
}

impl TryFrom<RawCollection> for CollectionConfig {
    type Error = FeatureError;

    fn try_from(raw: RawCollection) -> Result<Self> {
        let id = raw.id;
        let invalid = |e: serde_json::Error| {
            FeatureError::Config(format!("collection '{}': {}", id, e))
        };
        let source = match raw.kind.as_str() {
            "local" => Source::Local(serde_json::from_value(raw.params).map_err(invalid)?),
            "geodb" => Source::GeoDb(serde_json::from_value(raw.params).map_err(invalid)?),
            other => {
                return Err(FeatureError::Config(format!(
                    "collection '{}': unknown source type '{}'",
                    id, other
                )))
            }
        };
        Ok(CollectionConfig { id, source })
    }
}

impl CollectionConfig {
    pub fn params(&self) -> &CollectionParams {
        match &self.source {
            Source::Local(local) => &local.params,
            Source::GeoDb(remote) => &remote.params,
        }
    }
}

fn default_access_token_env() -> String {
    DEFAULT_ACCESS_TOKEN_ENV.to_string()
}

impl FromStr for Config {
    type Err = FeatureError;

    fn from_str(s: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(s)?;
        let mut seen = HashSet::new();
        for collection in &config.features {
            if !seen.insert(collection.id.as_str()) {
                return Err(FeatureError::Config(format!(
                    "duplicate collection id '{}'",
                    collection.id
                )));
            }
        }
        Ok(config)
    }
}

impl Config {
    /// Read a configuration file. Relative `file` and `eez` paths are
    /// resolved against the file's directory.
    pub fn from_path(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|source| FeatureError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: Config = contents.parse()?;
        if let Some(base) = path.parent() {
            config.resolve_paths(base);
        }
        log::debug!(
            "config: Loaded {} collections from {}",
            config.features.len(),
            path.display()
        );
        Ok(config)
    }

    fn resolve_paths(&mut self, base: &Path) {
        for collection in &mut self.features {
            if let Source::Local(local) = &mut collection.source {
                if local.file.is_relative() {
                    local.file = base.join(&local.file);
                }
            }
        }
        if let Some(eez) = &mut self.eez {
            if eez.is_relative() {
                *eez = base.join(&*eez);
            }
        }
    }

    pub fn has_remote_collections(&self) -> bool {
        self.features
            .iter()
            .any(|c| matches!(c.source, Source::GeoDb(_)))
    }
}
