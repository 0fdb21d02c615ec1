//! Blocking HTTP client for collections served by a PostgREST-style
//! geo-database.
//!
//! A collection `c` in database `d` is exposed as the table `d_c` and
//! fetched in full as GeoJSON:
//!
//! ```text
//! GET {server_url}/{database}_{collection}?select=*
//! Accept: application/geo+json
//! Authorization: Bearer <token>
//! ```
//!
//! Requests are not retried; failures surface as [`FeatureError::Remote`].

use doors_core::config::GeoDbSettings;
use doors_core::source::DataSourceClient;
use doors_core::{FeatureError, Result, Table};
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
const GEOJSON_MEDIA_TYPE: &str = "application/geo+json";

pub struct GeoDbClient {
    http: reqwest::blocking::Client,
    server_url: String,
    access_token: Option<String>,
}

impl GeoDbClient {
    pub fn new(server_url: &str, access_token: Option<String>) -> Result<Self> {
        let http = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| FeatureError::Remote(Box::new(e)))?;
        Ok(Self {
            http,
            server_url: server_url.trim_end_matches('/').to_string(),
            access_token,
        })
    }

    /// Build a client from configuration, reading the access token from the
    /// environment variable named in the settings.
    pub fn from_settings(settings: &GeoDbSettings) -> Result<Self> {
        let access_token = std::env::var(&settings.access_token_env).ok();
        if access_token.is_none() {
            log::warn!(
                "geodb: {} is not set, requests to {} are unauthenticated",
                settings.access_token_env,
                settings.server_url
            );
        }
        GeoDbClient::new(&settings.server_url, access_token)
    }

    pub fn collection_url(&self, collection: &str, database: &str) -> String {
        format!("{}/{}_{}?select=*", self.server_url, database, collection)
    }
}

impl DataSourceClient for GeoDbClient {
    fn get_collection(&self, collection: &str, database: &str) -> Result<Table> {
        let url = self.collection_url(collection, database);
        log::info!("geodb: Fetching {}", url);

        let mut request = self.http.get(&url).header("Accept", GEOJSON_MEDIA_TYPE);
        if let Some(token) = &self.access_token {
            request = request.bearer_auth(token);
        }
        let response = request
            .send()
            .map_err(|e| FeatureError::Remote(Box::new(e)))?;

        if !response.status().is_success() {
            return Err(FeatureError::Remote(
                format!("geo-database error for {}: {}", url, response.status()).into(),
            ));
        }
        let body = response
            .text()
            .map_err(|e| FeatureError::Remote(Box::new(e)))?;
        let table = Table::from_geojson_str(&body)?;
        log::debug!(
            "geodb: Received {} features for {}_{}",
            table.len(),
            database,
            collection
        );
        Ok(table)
    }
}
