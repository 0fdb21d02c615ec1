//! Reading collection tables from their configured sources.
//!
//! Every loader follows the same pipeline before a table is cached:
//!
//! 1. read the raw table (local file or remote geo-database)
//! 2. reshape it (`convert_from_parameters`) and narrow it to the
//!    configured columns (remote only)
//! 3. reproject to [`REFERENCE_CRS`] when the configured `crs` differs
//! 4. clip to the exclusion-zone mask, if any
//! 5. check that every configured column exists

use crate::FeatureHandler;
use doors_core::config::{
    CollectionConfig, CollectionParams, LocalSource, RemoteSource, Source, REFERENCE_CRS,
};
use doors_core::geometry::{clip_geometry, polygons_to_mask, Crs};
use doors_core::{FeatureError, Result, Table};
use geo::MultiPolygon;
use std::path::Path;

impl FeatureHandler {
    pub(crate) fn read_features(&self, config: &CollectionConfig) -> Result<Table> {
        let crs = Crs::parse(config.params().crs())?;
        let table = match &config.source {
            Source::Local(local) => read_local(local)?,
            Source::GeoDb(remote) => self.read_remote(&config.id, remote)?,
        };
        let table = reproject(table, crs);
        let table = self.clip(table);
        validate_schema(&config.id, &table, config.params())?;
        Ok(table)
    }

    fn read_remote(&self, id: &str, remote: &RemoteSource) -> Result<Table> {
        let client = self.client.as_ref().ok_or_else(|| {
            FeatureError::Config(format!(
                "collection '{}' reads from the geo-database but no data source client was provided",
                id
            ))
        })?;
        let mut table = client.get_collection(&remote.collection, &remote.database)?;
        log::debug!(
            "loader: Fetched {} rows from {}/{}",
            table.len(),
            remote.database,
            remote.collection
        );
        let params = &remote.params;
        if let Some(pivot) = &params.convert_from_parameters {
            table = table.pivot_parameters(pivot)?;
        }
        if params.variables.is_some() {
            table = table.select(&remote_columns(&table, params))?;
        }
        Ok(table)
    }

    fn clip(&self, table: Table) -> Table {
        match &self.mask {
            Some(mask) => {
                let before = table.len();
                let clipped = table.filter_map_geometries(|g| clip_geometry(g, mask));
                log::debug!(
                    "loader: Clipped {} of {} rows outside the mask",
                    before - clipped.len(),
                    before
                );
                clipped
            }
            None => table,
        }
    }
}

fn read_local(local: &LocalSource) -> Result<Table> {
    let path = local.file.as_path();
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match extension.as_deref() {
        Some("csv") => Table::from_csv_str(&read_file(path)?),
        Some("geojson") | Some("json") => Table::from_geojson_str(&read_file(path)?),
        _ => Err(FeatureError::UnsupportedFormat(path.to_path_buf())),
    }
}

fn read_file(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|source| FeatureError::Read {
        path: path.to_path_buf(),
        source,
    })
}

fn reproject(table: Table, crs: Crs) -> Table {
    if crs.is_reference() {
        return table;
    }
    log::debug!("loader: Reprojecting {} rows to {}", table.len(), REFERENCE_CRS);
    table.filter_map_geometries(|g| Some(crs.to_reference(g)))
}

/// Columns kept from a remote table when variables are configured: levels,
/// label, time column (when present) and the variables themselves.
fn remote_columns(table: &Table, params: &CollectionParams) -> Vec<String> {
    let mut columns: Vec<String> = Vec::new();
    let mut push = |name: &str| {
        if !columns.iter().any(|c| c == name) {
            columns.push(name.to_string());
        }
    };
    for level in params.levels() {
        push(level);
    }
    if let Some(label) = &params.label {
        push(label);
    }
    if table.has_column(params.time_column()) {
        push(params.time_column());
    }
    for variable in params.variables.iter().flatten() {
        push(variable);
    }
    columns
}

/// Fail when a configured column is absent from the loaded table.
fn validate_schema(id: &str, table: &Table, params: &CollectionParams) -> Result<()> {
    let mut expected: Vec<&str> = Vec::new();
    expected.extend(params.label.as_deref());
    expected.extend(params.levels().iter().map(String::as_str));
    expected.extend(params.variables.iter().flatten().map(String::as_str));
    expected.extend(params.colorcodevariable.as_ref().map(|c| c.name.as_str()));
    expected.extend(params.time_column.as_deref());

    match expected.into_iter().find(|column| !table.has_column(column)) {
        Some(column) => Err(FeatureError::MissingColumn {
            context: format!("collection '{}'", id),
            column: column.to_string(),
        }),
        None => Ok(()),
    }
}

/// Read an exclusion-zone boundary file into a single mask.
pub(crate) fn read_mask(path: &Path) -> Result<MultiPolygon<f64>> {
    let table = Table::from_geojson_str(&read_file(path)?)?;
    let mask = polygons_to_mask(table.geometries());
    log::info!(
        "loader: Loaded exclusion-zone mask with {} polygons from {}",
        mask.0.len(),
        path.display()
    );
    Ok(mask)
}

#[cfg(test)]
mod tests {
    use crate::testing::{fixture_path, MemoryClient};
    use crate::FeatureHandler;
    use doors_core::config::Config;
    use doors_core::{FeatureError, Value};
    use geo::Geometry;
    use std::sync::Arc;

    fn handler(config_json: String, client: Option<MemoryClient>) -> FeatureHandler {
        let config: Config = config_json.parse().unwrap();
        let client = client.map(|c| Arc::new(c) as Arc<dyn doors_core::source::DataSourceClient>);
        FeatureHandler::from_config(&config, client).unwrap()
    }

    #[test]
    fn reads_local_csv() {
        let handler = handler(
            format!(
                r#"{{"features": [{{"id": "ports", "type": "local", "params": {{"file": "{}"}}}}]}}"#,
                fixture_path("bulgaria_ports.csv")
            ),
            None,
        );
        let table = handler.get_dataframe("ports").unwrap();
        assert_eq!(table.len(), 7);
        assert_eq!(table.columns(), &["mylabel", "country", "berths"]);
    }

    #[test]
    fn reads_local_geojson() {
        let handler = handler(
            format!(
                r#"{{"features": [{{"id": "areas", "type": "local", "params": {{"file": "{}", "label": "sitename"}}}}]}}"#,
                fixture_path("marine_areas.geojson")
            ),
            None,
        );
        let table = handler.get_dataframe("areas").unwrap();
        assert_eq!(table.len(), 2);
        assert!(matches!(table.geometries()[1], Geometry::MultiPolygon(_)));
    }

    #[test]
    fn clips_to_exclusion_zone() {
        let handler = handler(
            format!(
                r#"{{"features": [{{"id": "ports", "type": "local", "params": {{"file": "{}", "label": "mylabel"}}}}],
                    "eez": "{}"}}"#,
                fixture_path("bulgaria_ports.csv"),
                fixture_path("eez_west.geojson")
            ),
            None,
        );
        let table = handler.get_dataframe("ports").unwrap();
        let labels: Vec<_> = table.column("mylabel").unwrap().cloned().collect();
        assert_eq!(
            labels,
            vec![
                Value::from("Terminal East"),
                Value::from("Terminal Bulk Cargoes"),
                Value::from("Terminal 2A"),
                Value::from("Terminal West"),
            ]
        );
    }

    #[test]
    fn reprojects_web_mercator_csv() {
        let path = std::env::temp_dir().join(format!("doors-mercator-{}.csv", std::process::id()));
        std::fs::write(&path, "name,geometry\norigin,POINT (0 0)\n").unwrap();
        let handler = handler(
            format!(
                r#"{{"features": [{{"id": "m", "type": "local", "params": {{"file": "{}", "crs": "EPSG:3857"}}}}]}}"#,
                path.display()
            ),
            None,
        );
        let table = handler.get_dataframe("m").unwrap();
        let Geometry::Point(p) = &table.geometries()[0] else {
            panic!("expected point");
        };
        assert!(p.x().abs() < 1e-9 && p.y().abs() < 1e-9);
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn unsupported_crs_fails_load() {
        let handler = handler(
            format!(
                r#"{{"features": [{{"id": "p", "type": "local", "params": {{"file": "{}", "crs": "EPSG:32635"}}}}]}}"#,
                fixture_path("bulgaria_ports.csv")
            ),
            None,
        );
        assert!(matches!(
            handler.get_dataframe("p"),
            Err(FeatureError::UnsupportedCrs(_))
        ));
        assert!(!handler.is_loaded("p").unwrap());
    }

    #[test]
    fn missing_file_and_unknown_format() {
        let handler = handler(
            r#"{"features": [
                {"id": "gone", "type": "local", "params": {"file": "/nonexistent/ports.csv"}},
                {"id": "shp", "type": "local", "params": {"file": "/data/eez.shp"}}
            ]}"#
            .to_string(),
            None,
        );
        assert!(matches!(
            handler.get_dataframe("gone"),
            Err(FeatureError::Read { .. })
        ));
        assert!(matches!(
            handler.get_dataframe("shp"),
            Err(FeatureError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn configured_label_must_exist() {
        let handler = handler(
            format!(
                r#"{{"features": [{{"id": "ports", "type": "local", "params": {{"file": "{}", "label": "name", "levels": ["country"]}}}}]}}"#,
                fixture_path("bulgaria_ports.csv")
            ),
            None,
        );
        let err = handler.get_dataframe("ports").unwrap_err();
        assert!(
            matches!(err, FeatureError::MissingColumn { ref column, .. } if column == "name"),
            "{}",
            err
        );
        assert!(err.to_string().contains("collection 'ports'"));
    }

    #[test]
    fn geodb_without_client_is_a_configuration_error() {
        let handler = handler(
            r#"{"features": [{"id": "chl", "type": "geodb", "params": {"collection": "c", "database": "d"}}]}"#
                .to_string(),
            None,
        );
        assert!(matches!(
            handler.get_dataframe("chl"),
            Err(FeatureError::Config(_))
        ));
    }

    #[test]
    fn geodb_pivots_and_narrows_columns() {
        let csv = "\
id,created_at,station,sampling depth [m],cruise,parameter,value,geometry
1,2020-01-01,S1,5,C1,Phosphate,0.2,POINT (30.1 43.2)
2,2020-01-01,S1,5,C1,Silicon,3.1,POINT (30.1 43.2)
3,2020-01-01,S2,5,C1,Phosphate,0.5,POINT (30.5 43.0)
";
        let client = MemoryClient::with_csv("water-quality", "EMBLAS_Nutrients_2016_2019", csv);
        let handler = handler(
            r#"{"features": [{"id": "nutrients", "type": "geodb", "params": {
                "collection": "EMBLAS_Nutrients_2016_2019",
                "database": "water-quality",
                "label": "station",
                "levels": ["cruise", "station"],
                "convert_from_parameters": {"keys": ["station", "sampling depth [m]"],
                                            "parameter": "parameter", "value": "value"},
                "variables": ["Phosphate", "Silicon"]}}]}"#
                .to_string(),
            Some(client),
        );
        let table = handler.get_dataframe("nutrients").unwrap();
        assert_eq!(table.columns(), &["cruise", "station", "Phosphate", "Silicon"]);
        assert_eq!(table.len(), 2);
        assert_eq!(
            table.row(1).unwrap(),
            &[Value::from("C1"), Value::from("S2"), Value::Float(0.5), Value::Null]
        );
    }

    #[test]
    fn geodb_errors_propagate() {
        let handler = handler(
            r#"{"features": [{"id": "chl", "type": "geodb", "params": {"collection": "c", "database": "d"}}]}"#
                .to_string(),
            Some(MemoryClient::default()),
        );
        assert!(matches!(
            handler.get_dataframe("chl"),
            Err(FeatureError::Remote(_))
        ));
    }

    #[test]
    fn geodb_collections_are_reprojected() {
        let csv = "station,geometry\nVarna,POINT (3061038 5341450)\n";
        let handler = handler(
            r#"{"features": [{"id": "m", "type": "geodb", "params": {
                "collection": "stations", "database": "d", "crs": "EPSG:3857"}}]}"#
                .to_string(),
            Some(MemoryClient::with_csv("d", "stations", csv)),
        );
        let table = handler.get_dataframe("m").unwrap();
        let Geometry::Point(p) = &table.geometries()[0] else {
            panic!("expected point");
        };
        assert!((p.x() - 27.498).abs() < 0.01, "lon was {}", p.x());
        assert!((p.y() - 43.193).abs() < 0.01, "lat was {}", p.y());
    }

    #[test]
    fn unsupported_crs_skips_remote_fetch() {
        let client = Arc::new(MemoryClient::with_csv(
            "d",
            "stations",
            "station,geometry\nVarna,POINT (0 0)\n",
        ));
        let config: Config = r#"{"features": [{"id": "m", "type": "geodb", "params": {
                "collection": "stations", "database": "d", "crs": "EPSG:32635"}}]}"#
            .parse()
            .unwrap();
        let handler = FeatureHandler::from_config(&config, Some(client.clone())).unwrap();
        assert!(matches!(
            handler.get_dataframe("m"),
            Err(FeatureError::UnsupportedCrs(_))
        ));
        assert_eq!(client.fetch_count(), 0);
    }

    #[test]
    fn geodb_collections_are_clipped_to_exclusion_zone() {
        let csv = "\
station,geometry
Terminal East,POINT (27.479 42.486)
Terminal Nessebar,POINT (27.728 42.657)
Terminal West,POINT (27.457 42.485)
";
        let handler = handler(
            format!(
                r#"{{"features": [{{"id": "ports", "type": "geodb", "params": {{
                    "collection": "ports", "database": "harbours", "label": "station"}}}}],
                    "eez": "{}"}}"#,
                fixture_path("eez_west.geojson")
            ),
            Some(MemoryClient::with_csv("harbours", "ports", csv)),
        );
        let table = handler.get_dataframe("ports").unwrap();
        let stations: Vec<_> = table.column("station").unwrap().cloned().collect();
        assert_eq!(
            stations,
            vec![Value::from("Terminal East"), Value::from("Terminal West")]
        );
    }
}
