//! Tabular representation of a feature collection.
//!
//! A [`Table`] holds ordered attribute columns, row-major cells and one
//! geometry per row. The geometry is addressed as the column
//! [`GEOMETRY_COLUMN`] but is kept apart from the attribute cells.
//!
//! # Sources
//!
//! - **CSV** (has headers): attribute columns plus a `geometry` column of WKT
//! - **GeoJSON**: a `FeatureCollection`; attribute columns are the union of
//!   the features' properties in first-occurrence order

use crate::config::PivotSpec;
use crate::error::{FeatureError, Result};
use crate::geometry::parse_wkt;
use crate::value::Value;
use geo::Geometry;
use geojson::GeoJson;
use std::collections::HashMap;

/// Name of the geometry column.
pub const GEOMETRY_COLUMN: &str = "geometry";

#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
    geometries: Vec<Geometry<f64>>,
}

impl Table {
    /// Build a table, checking that every row matches the columns.
    pub fn new(
        columns: Vec<String>,
        rows: Vec<Vec<Value>>,
        geometries: Vec<Geometry<f64>>,
    ) -> Result<Self> {
        if rows.len() != geometries.len() {
            return Err(FeatureError::Config(format!(
                "table has {} rows but {} geometries",
                rows.len(),
                geometries.len()
            )));
        }
        if let Some((i, row)) = rows
            .iter()
            .enumerate()
            .find(|(_, row)| row.len() != columns.len())
        {
            return Err(FeatureError::Config(format!(
                "row {} has {} cells but the table has {} columns",
                i,
                row.len(),
                columns.len()
            )));
        }
        Ok(Self {
            columns,
            rows,
            geometries,
        })
    }

    /// Parse CSV text with a WKT `geometry` column.
    ///
    /// # Example CSV
    /// ```text
    /// mylabel,geometry
    /// Terminal East,POINT (27.479 42.486)
    /// ```
    pub fn from_csv_str(csv_data: &str) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_reader(csv_data.as_bytes());
        let headers = rdr.headers()?.clone();
        let geometry_index = headers
            .iter()
            .position(|h| h.trim() == GEOMETRY_COLUMN)
            .ok_or_else(|| FeatureError::MissingColumn {
                context: "CSV header".to_string(),
                column: GEOMETRY_COLUMN.to_string(),
            })?;
        let columns: Vec<String> = headers
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != geometry_index)
            .map(|(_, h)| h.trim().to_string())
            .collect();

        let mut rows = Vec::new();
        let mut geometries = Vec::new();
        for result in rdr.records() {
            let record = result?;
            let mut row = Vec::with_capacity(columns.len());
            for (i, cell) in record.iter().enumerate() {
                if i == geometry_index {
                    geometries.push(parse_wkt(cell)?);
                } else {
                    row.push(Value::parse_cell(cell));
                }
            }
            rows.push(row);
        }
        log::debug!(
            "table: Parsed {} CSV rows with {} columns",
            rows.len(),
            columns.len()
        );
        Table::new(columns, rows, geometries)
    }

    /// Parse a GeoJSON `FeatureCollection`. Features without geometry are
    /// skipped.
    pub fn from_geojson_str(geojson_data: &str) -> Result<Self> {
        let geojson: GeoJson = geojson_data.parse()?;
        let collection = match geojson {
            GeoJson::FeatureCollection(fc) => fc,
            GeoJson::Feature(f) => geojson::FeatureCollection {
                bbox: None,
                features: vec![f],
                foreign_members: None,
            },
            GeoJson::Geometry(_) => {
                return Err(FeatureError::Geometry(
                    "expected a FeatureCollection, found a bare geometry".to_string(),
                ))
            }
        };

        let mut columns: Vec<String> = Vec::new();
        let mut column_index: HashMap<String, usize> = HashMap::new();
        let mut properties = Vec::new();
        let mut geometries = Vec::new();
        let mut skipped = 0u32;
        for feature in collection.features {
            let Some(geometry) = feature.geometry else {
                skipped += 1;
                continue;
            };
            geometries.push(Geometry::<f64>::try_from(geometry)?);
            let props = feature.properties.unwrap_or_default();
            for key in props.keys() {
                if !column_index.contains_key(key) {
                    column_index.insert(key.clone(), columns.len());
                    columns.push(key.clone());
                }
            }
            properties.push(props);
        }
        if skipped > 0 {
            log::warn!("table: Skipped {} features without geometry", skipped);
        }

        let rows = properties
            .iter()
            .map(|props| {
                columns
                    .iter()
                    .map(|c| props.get(c).map_or(Value::Null, Value::from_json))
                    .collect()
            })
            .collect();
        Table::new(columns, rows, geometries)
    }

    /// Attribute column names in table order. The geometry column is not
    /// included.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn has_column(&self, name: &str) -> bool {
        name == GEOMETRY_COLUMN || self.columns.iter().any(|c| c == name)
    }

    pub fn column_index(&self, name: &str) -> Result<usize> {
        self.columns
            .iter()
            .position(|c| c == name)
            .ok_or_else(|| FeatureError::MissingColumn {
                context: "table".to_string(),
                column: name.to_string(),
            })
    }

    /// Values of one attribute column, in row order.
    pub fn column(&self, name: &str) -> Result<impl Iterator<Item = &Value> + '_> {
        let index = self.column_index(name)?;
        Ok(self.rows.iter().map(move |row| &row[index]))
    }

    pub fn geometries(&self) -> &[Geometry<f64>] {
        &self.geometries
    }

    pub fn row(&self, index: usize) -> Option<&[Value]> {
        self.rows.get(index).map(Vec::as_slice)
    }

    /// Cell at `row`, `column`. Panics when either index is out of range.
    pub fn cell(&self, row: usize, column: usize) -> &Value {
        &self.rows[row][column]
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Display text for a row: `column: value` for every attribute column,
    /// joined by `<br>`.
    pub fn row_label(&self, index: usize) -> String {
        self.columns
            .iter()
            .zip(&self.rows[index])
            .map(|(column, value)| format!("{}: {}", column, value))
            .collect::<Vec<_>>()
            .join("<br>")
    }

    /// Keep only the named attribute columns, in the given order.
    pub fn select(&self, names: &[String]) -> Result<Table> {
        let indices = names
            .iter()
            .map(|name| self.column_index(name))
            .collect::<Result<Vec<_>>>()?;
        let rows = self
            .rows
            .iter()
            .map(|row| indices.iter().map(|&i| row[i].clone()).collect())
            .collect();
        Ok(Table {
            columns: names.to_vec(),
            rows,
            geometries: self.geometries.clone(),
        })
    }

    /// Replace every geometry, dropping rows for which `f` returns `None`.
    pub fn filter_map_geometries<F>(self, mut f: F) -> Table
    where
        F: FnMut(&Geometry<f64>) -> Option<Geometry<f64>>,
    {
        let mut rows = Vec::with_capacity(self.rows.len());
        let mut geometries = Vec::with_capacity(self.geometries.len());
        for (row, geometry) in self.rows.into_iter().zip(self.geometries.iter()) {
            if let Some(mapped) = f(geometry) {
                rows.push(row);
                geometries.push(mapped);
            }
        }
        Table {
            columns: self.columns,
            rows,
            geometries,
        }
    }

    /// Reshape `parameter`/`value` row pairs into one column per parameter.
    ///
    /// Rows are grouped by the key columns. Each group yields one row with
    /// the remaining columns and geometry of its first row, followed by a
    /// column per distinct parameter name. Parameters a group lacks are
    /// `Null`. A parameter named like a remaining column is an error.
    pub fn pivot_parameters(&self, pivot: &PivotSpec) -> Result<Table> {
        let key_indices = pivot
            .keys
            .iter()
            .map(|k| self.column_index(k))
            .collect::<Result<Vec<_>>>()?;
        let parameter_index = self.column_index(&pivot.parameter)?;
        let value_index = self.column_index(&pivot.value)?;
        let kept: Vec<usize> = (0..self.columns.len())
            .filter(|&i| i != parameter_index && i != value_index)
            .collect();

        let mut parameters: Vec<String> = Vec::new();
        let mut parameter_slots: HashMap<String, usize> = HashMap::new();
        let mut groups: Vec<(usize, HashMap<usize, Value>)> = Vec::new();
        let mut group_slots: HashMap<Vec<&Value>, usize> = HashMap::new();

        for (row_index, row) in self.rows.iter().enumerate() {
            let key: Vec<&Value> = key_indices.iter().map(|&i| &row[i]).collect();
            let group = *group_slots.entry(key).or_insert_with(|| {
                groups.push((row_index, HashMap::new()));
                groups.len() - 1
            });
            let name = row[parameter_index].to_string();
            let slot = match parameter_slots.get(&name) {
                Some(&slot) => slot,
                None => {
                    if kept.iter().any(|&i| self.columns[i] == name) {
                        return Err(FeatureError::Config(format!(
                            "parameter '{}' in column '{}' clashes with an existing column",
                            name, pivot.parameter
                        )));
                    }
                    parameter_slots.insert(name.clone(), parameters.len());
                    parameters.push(name);
                    parameters.len() - 1
                }
            };
            groups[group].1.insert(slot, row[value_index].clone());
        }

        let mut columns: Vec<String> = kept.iter().map(|&i| self.columns[i].clone()).collect();
        columns.extend(parameters.iter().cloned());
        let mut rows = Vec::with_capacity(groups.len());
        let mut geometries = Vec::with_capacity(groups.len());
        for (first_row, mut values) in groups {
            let mut row: Vec<Value> = kept
                .iter()
                .map(|&i| self.rows[first_row][i].clone())
                .collect();
            row.extend((0..parameters.len()).map(|slot| values.remove(&slot).unwrap_or(Value::Null)));
            rows.push(row);
            geometries.push(self.geometries[first_row].clone());
        }
        log::debug!(
            "table: Pivoted {} rows into {} rows with {} parameters",
            self.rows.len(),
            rows.len(),
            parameters.len()
        );
        Table::new(columns, rows, geometries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::point;

    const STATIONS_CSV: &str = "\
cruise,station,sampling_depth,chlorophyll,geometry
C1,S1,5,0.4,POINT (30.1 43.2)
C1,S1,10,0.3,POINT (30.1 43.2)
C1,S2,5,,POINT (30.5 43.0)
C2,S3,5,0.9,POINT (29.8 44.1)
";

    #[test]
    fn test_from_csv_str() {
        let table = Table::from_csv_str(STATIONS_CSV).unwrap();
        assert_eq!(
            table.columns(),
            &["cruise", "station", "sampling_depth", "chlorophyll"]
        );
        assert_eq!(table.len(), 4);
        assert_eq!(table.cell(0, 2), &Value::Int(5));
        assert_eq!(table.cell(2, 3), &Value::Null);
        assert_eq!(
            table.geometries()[3],
            Geometry::Point(point!(x: 29.8, y: 44.1))
        );
        assert!(table.has_column("geometry"));
    }

    #[test]
    fn test_from_csv_requires_geometry() {
        let err = Table::from_csv_str("a,b\n1,2\n").unwrap_err();
        assert!(
            matches!(err, FeatureError::MissingColumn { ref column, .. } if column == "geometry")
        );
    }

    #[test]
    fn test_from_geojson_str_unions_properties() {
        let data = r#"{
            "type": "FeatureCollection",
            "features": [
                {"type": "Feature", "geometry": {"type": "Point", "coordinates": [27.9, 43.2]},
                 "properties": {"sitename": "Varna", "depth": 12}},
                {"type": "Feature", "geometry": null, "properties": {"sitename": "Nowhere"}},
                {"type": "Feature", "geometry": {"type": "Point", "coordinates": [27.5, 42.5]},
                 "properties": {"sitename": "Burgas", "salinity": 17.5}}
            ]
        }"#;
        let table = Table::from_geojson_str(data).unwrap();
        assert_eq!(table.columns(), &["sitename", "depth", "salinity"]);
        assert_eq!(table.len(), 2);
        assert_eq!(table.cell(0, 2), &Value::Null);
        assert_eq!(table.cell(1, 2), &Value::Float(17.5));
    }

    #[test]
    fn test_row_label_joins_columns_in_order() {
        let table = Table::new(
            vec![
                "lon".to_string(),
                "lat".to_string(),
                "chlorophyll".to_string(),
                "temperature".to_string(),
                "timestamp".to_string(),
            ],
            vec![vec![
                Value::Float(20.1),
                Value::Float(65.4),
                Value::Float(0.001),
                Value::Float(20.1),
                Value::from("2007-10-12T23:01:02"),
            ]],
            vec![Geometry::Point(point!(x: 20.1, y: 65.4))],
        )
        .unwrap();
        assert_eq!(
            table.row_label(0),
            "lon: 20.1<br>lat: 65.4<br>chlorophyll: 0.001<br>temperature: 20.1<br>timestamp: 2007-10-12T23:01:02"
        );
    }

    #[test]
    fn test_select_and_missing_column() {
        let table = Table::from_csv_str(STATIONS_CSV).unwrap();
        let selected = table
            .select(&["chlorophyll".to_string(), "station".to_string()])
            .unwrap();
        assert_eq!(selected.columns(), &["chlorophyll", "station"]);
        assert_eq!(selected.cell(3, 1), &Value::from("S3"));
        assert_eq!(selected.geometries().len(), 4);

        assert!(table.select(&["salinity".to_string()]).is_err());
    }

    #[test]
    fn test_filter_map_geometries_drops_rows() {
        let table = Table::from_csv_str(STATIONS_CSV).unwrap();
        let north = table.filter_map_geometries(|g| match g {
            Geometry::Point(p) if p.y() > 43.1 => Some(g.clone()),
            _ => None,
        });
        assert_eq!(north.len(), 3);
        let stations: Vec<_> = north.column("station").unwrap().cloned().collect();
        assert_eq!(
            stations,
            vec![Value::from("S1"), Value::from("S1"), Value::from("S3")]
        );
    }

    #[test]
    fn test_pivot_parameters() {
        let csv = "\
station,sampling depth [m],parameter,value,geometry
S1,5,Phosphate,0.2,POINT (30.1 43.2)
S1,5,Silicon,3.1,POINT (30.1 43.2)
S1,10,Phosphate,0.3,POINT (30.1 43.2)
S2,5,Silicon,2.5,POINT (30.5 43.0)
";
        let table = Table::from_csv_str(csv).unwrap();
        let pivot = PivotSpec {
            keys: vec!["station".to_string(), "sampling depth [m]".to_string()],
            parameter: "parameter".to_string(),
            value: "value".to_string(),
        };
        let wide = table.pivot_parameters(&pivot).unwrap();
        assert_eq!(
            wide.columns(),
            &["station", "sampling depth [m]", "Phosphate", "Silicon"]
        );
        assert_eq!(wide.len(), 3);
        assert_eq!(wide.row(0).unwrap()[2..], [Value::Float(0.2), Value::Float(3.1)]);
        assert_eq!(wide.row(1).unwrap()[2..], [Value::Float(0.3), Value::Null]);
        assert_eq!(wide.row(2).unwrap()[2..], [Value::Null, Value::Float(2.5)]);
        assert_eq!(
            wide.geometries()[2],
            Geometry::Point(point!(x: 30.5, y: 43.0))
        );
    }

    #[test]
    fn test_pivot_requires_columns() {
        let table = Table::from_csv_str(STATIONS_CSV).unwrap();
        let pivot = PivotSpec {
            keys: vec!["station".to_string()],
            parameter: "parameter".to_string(),
            value: "value".to_string(),
        };
        assert!(matches!(
            table.pivot_parameters(&pivot),
            Err(FeatureError::MissingColumn { .. })
        ));
    }

    #[test]
    fn test_pivot_rejects_parameter_named_like_column() {
        let csv = "\
station,parameter,value,geometry
S1,Silicon,3.1,POINT (30.1 43.2)
S1,station,7,POINT (30.1 43.2)
";
        let table = Table::from_csv_str(csv).unwrap();
        let pivot = PivotSpec {
            keys: vec!["station".to_string()],
            parameter: "parameter".to_string(),
            value: "value".to_string(),
        };
        let err = table.pivot_parameters(&pivot).unwrap_err();
        assert!(matches!(err, FeatureError::Config(_)));
        assert!(err.to_string().contains("'station'"), "{}", err);
    }
}
