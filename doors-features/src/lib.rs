//! Grouped feature normalizer for oceanographic feature collections.
//!
//! This crate turns configured, heterogeneous feature collections (point
//! stations, polygon regions, long-format parameter tables) into the
//! uniform shapes a dashboard needs: plottable variable names, nested
//! level values for cascading selections, and flat coordinate arrays for
//! maps.
//!
//! # Architecture
//!
//! - One cache slot per configured collection, filled on first access
//! - Loading dispatches on [`Source`](doors_core::config::Source): local
//!   CSV/GeoJSON files or a remote geo-database reached through an
//!   injected [`DataSourceClient`]
//! - Tables are reprojected to the reference CRS, clipped to the optional
//!   exclusion-zone mask and checked against the configured columns
//!   before they are cached
//!
//! # Usage
//!
//! ```rust,no_run
//! use doors_core::config::Config;
//! use doors_features::FeatureHandler;
//! use std::path::Path;
//!
//! let config = Config::from_path(Path::new("dashboards/bulgaria.json")).unwrap();
//! let handler = FeatureHandler::from_config(&config, None).unwrap();
//!
//! for id in handler.get_collections() {
//!     let points = handler.get_points_as_tuples(id).unwrap();
//!     println!("{}: {} points", id, points.lons.len());
//! }
//! ```

mod levels;
mod loader;
pub mod models;
mod queries;

pub use models::{GeometryKind, LevelTree, PointData, PolygonData};

use doors_core::config::{CollectionConfig, CollectionParams, Config};
use doors_core::source::DataSourceClient;
use doors_core::{FeatureError, Result, Table};
use geo::MultiPolygon;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

type Slot = Mutex<Option<Arc<Table>>>;

/// Configured feature collections with a lazily filled table cache.
///
/// Each collection has its own lock, so at most one load per collection
/// runs at a time while different collections load independently. The
/// handler is `Send + Sync` and can be shared between sessions behind an
/// `Arc`.
pub struct FeatureHandler {
    configs: Vec<CollectionConfig>,
    index: HashMap<String, usize>,
    slots: Vec<Slot>,
    mask: Option<MultiPolygon<f64>>,
    client: Option<Arc<dyn DataSourceClient>>,
}

impl FeatureHandler {
    /// Create a handler over `configs`.
    ///
    /// `mask` clips every loaded table; `client` serves `geodb`
    /// collections. Nothing is loaded until a table is first requested.
    pub fn new(
        configs: Vec<CollectionConfig>,
        mask: Option<MultiPolygon<f64>>,
        client: Option<Arc<dyn DataSourceClient>>,
    ) -> Result<Self> {
        let mut index = HashMap::with_capacity(configs.len());
        for (i, config) in configs.iter().enumerate() {
            if index.insert(config.id.clone(), i).is_some() {
                return Err(FeatureError::Config(format!(
                    "duplicate collection id '{}'",
                    config.id
                )));
            }
        }
        let slots = configs.iter().map(|_| Mutex::new(None)).collect();
        log::info!(
            "features: Configured {} collections{}",
            configs.len(),
            if mask.is_some() { " with exclusion-zone mask" } else { "" }
        );
        Ok(Self {
            configs,
            index,
            slots,
            mask,
            client,
        })
    }

    /// Create a handler from a configuration document, reading its
    /// exclusion-zone mask when one is configured.
    pub fn from_config(config: &Config, client: Option<Arc<dyn DataSourceClient>>) -> Result<Self> {
        let mask = config
            .eez
            .as_deref()
            .map(loader::read_mask)
            .transpose()?;
        FeatureHandler::new(config.features.clone(), mask, client)
    }

    /// Configured collection ids, in configuration order.
    pub fn get_collections(&self) -> Vec<&str> {
        self.configs.iter().map(|c| c.id.as_str()).collect()
    }

    /// First configured collection, if any.
    pub fn get_default_collection(&self) -> Option<&str> {
        self.configs.first().map(|c| c.id.as_str())
    }

    /// Table of `collection`, loading and caching it on first call.
    ///
    /// Later calls return the same `Arc` until the collection is reset.
    pub fn get_dataframe(&self, collection: &str) -> Result<Arc<Table>> {
        let position = self.position(collection)?;
        let mut slot = lock(&self.slots[position]);
        if let Some(table) = slot.as_ref() {
            log::debug!("features: Cache hit for '{}'", collection);
            return Ok(Arc::clone(table));
        }
        let table = Arc::new(self.read_features(&self.configs[position])?);
        log::info!(
            "features: Loaded {} rows for '{}'",
            table.len(),
            collection
        );
        *slot = Some(Arc::clone(&table));
        Ok(table)
    }

    /// Whether `collection` currently has a cached table.
    pub fn is_loaded(&self, collection: &str) -> Result<bool> {
        let position = self.position(collection)?;
        Ok(lock(&self.slots[position]).is_some())
    }

    /// Drop the cached table of `collection` so the next access re-reads it.
    pub fn reset(&self, collection: &str) -> Result<()> {
        let position = self.position(collection)?;
        if lock(&self.slots[position]).take().is_some() {
            log::info!("features: Reset cache for '{}'", collection);
        }
        Ok(())
    }

    /// Drop every cached table.
    pub fn reset_all(&self) {
        for slot in &self.slots {
            lock(slot).take();
        }
        log::info!("features: Reset all cached collections");
    }

    fn position(&self, collection: &str) -> Result<usize> {
        self.index
            .get(collection)
            .copied()
            .ok_or_else(|| FeatureError::UnknownCollection(collection.to_string()))
    }

    fn config(&self, collection: &str) -> Result<&CollectionConfig> {
        Ok(&self.configs[self.position(collection)?])
    }

    fn params(&self, collection: &str) -> Result<&CollectionParams> {
        Ok(self.config(collection)?.params())
    }
}

// A panic during a load leaves the slot empty, so a poisoned lock is
// still usable.
fn lock(slot: &Slot) -> MutexGuard<'_, Option<Arc<Table>>> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}


#[cfg(test)]
mod tests {
    use super::testing::{fixture_path, MemoryClient};
    use super::*;
    use doors_core::config::Config;

    fn ports_config() -> Config {
        format!(
            r#"{{"features": [
                {{"id": "1", "type": "local", "params": {{"file": "{0}", "label": "mylabel"}}}},
                {{"id": "2", "type": "local", "params": {{"file": "{0}"}}}},
                {{"id": "3", "type": "local", "params": {{"file": "{0}", "label": "mylabel", "levels": []}}}},
                {{"id": "4", "type": "geodb", "params": {{"collection": "ports", "database": "harbours"}}}}
            ]}}"#,
            fixture_path("bulgaria_ports.csv")
        )
        .parse()
        .unwrap()
    }

    #[test]
    fn collections_keep_configuration_order() {
        let handler = FeatureHandler::from_config(&ports_config(), None).unwrap();
        assert_eq!(handler.get_collections(), vec!["1", "2", "3", "4"]);
        assert_eq!(handler.get_default_collection(), Some("1"));
    }

    #[test]
    fn empty_configuration() {
        let handler = FeatureHandler::new(Vec::new(), None, None).unwrap();
        assert!(handler.get_collections().is_empty());
        assert_eq!(handler.get_default_collection(), None);
    }

    #[test]
    fn get_dataframe_is_cached() {
        let handler = FeatureHandler::from_config(&ports_config(), None).unwrap();
        assert!(!handler.is_loaded("3").unwrap());
        let first = handler.get_dataframe("3").unwrap();
        let second = handler.get_dataframe("3").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(handler.is_loaded("3").unwrap());
        assert!(!handler.is_loaded("1").unwrap());
    }

    #[test]
    fn reset_forces_reload() {
        let csv = "name,geometry\nVarna,POINT (27.9 43.2)\n";
        let client = Arc::new(MemoryClient::with_csv("harbours", "ports", csv));
        let handler = FeatureHandler::from_config(&ports_config(), Some(client.clone())).unwrap();

        let first = handler.get_dataframe("4").unwrap();
        handler.get_dataframe("4").unwrap();
        assert_eq!(client.fetch_count(), 1);

        handler.reset("4").unwrap();
        assert!(!handler.is_loaded("4").unwrap());
        let reloaded = handler.get_dataframe("4").unwrap();
        assert_eq!(client.fetch_count(), 2);
        assert!(!Arc::ptr_eq(&first, &reloaded));
        assert_eq!(*first, *reloaded);

        handler.reset_all();
        assert!(!handler.is_loaded("4").unwrap());
    }

    #[test]
    fn unknown_collection_is_an_error() {
        let handler = FeatureHandler::from_config(&ports_config(), None).unwrap();
        assert!(matches!(
            handler.get_dataframe("5"),
            Err(FeatureError::UnknownCollection(ref id)) if id == "5"
        ));
        assert!(handler.reset("5").is_err());
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let config = ports_config();
        let mut features = config.features.clone();
        features.push(config.features[0].clone());
        assert!(matches!(
            FeatureHandler::new(features, None, None),
            Err(FeatureError::Config(_))
        ));
    }

    #[test]
    fn handler_is_shareable_across_threads() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<FeatureHandler>();

        let csv = "name,geometry\nVarna,POINT (27.9 43.2)\n";
        let client = Arc::new(MemoryClient::with_csv("harbours", "ports", csv));
        let handler = Arc::new(
            FeatureHandler::from_config(&ports_config(), Some(client.clone())).unwrap(),
        );
        let threads: Vec<_> = (0..8)
            .map(|_| {
                let handler = Arc::clone(&handler);
                std::thread::spawn(move || handler.get_dataframe("4").unwrap().len())
            })
            .collect();
        for t in threads {
            assert_eq!(t.join().unwrap(), 1);
        }
        assert_eq!(client.fetch_count(), 1);
    }
}
