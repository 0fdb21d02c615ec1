//! Derivations over cached collection tables.
//!
//! Configuration lookups never load data. Everything else goes through
//! [`FeatureHandler::get_dataframe`] and so shares its cache.

use crate::levels::nested_level_values;
use crate::models::{GeometryKind, LevelTree, PointData, PolygonData};
use crate::FeatureHandler;
use chrono::NaiveDateTime;
use doors_core::config::{ColorCodeConfig, DEFAULT_COLOR};
use doors_core::geometry::geometry_name;
use doors_core::time::value_to_timestamp;
use doors_core::{FeatureError, Result, Table, GEOMETRY_COLUMN};
use geo::{Geometry, Polygon};
use std::iter;

impl FeatureHandler {
    // ───────────────────── Configuration ─────────────────────

    /// Configured level columns, outermost first. Empty when none are set.
    pub fn get_levels(&self, collection: &str) -> Result<Vec<String>> {
        Ok(self.params(collection)?.levels().to_vec())
    }

    pub fn get_label(&self, collection: &str) -> Result<Option<&str>> {
        Ok(self.params(collection)?.label.as_deref())
    }

    /// Name of the time column, `timestamp` unless configured.
    pub fn get_time_column_name(&self, collection: &str) -> Result<&str> {
        Ok(self.params(collection)?.time_column())
    }

    pub fn get_color_code_config(&self, collection: &str) -> Result<Option<&ColorCodeConfig>> {
        Ok(self.params(collection)?.colorcodevariable.as_ref())
    }

    /// Map mode passed through to the renderer; empty when unset.
    pub fn get_map_mode(&self, collection: &str) -> Result<&str> {
        Ok(self.params(collection)?.mapmode.as_deref().unwrap_or(""))
    }

    pub fn get_color(&self, collection: &str) -> Result<&str> {
        Ok(self.params(collection)?.color.as_deref().unwrap_or(DEFAULT_COLOR))
    }

    /// Display title, falling back to the collection id.
    pub fn get_title<'a>(&'a self, collection: &'a str) -> Result<&'a str> {
        Ok(self.params(collection)?.title.as_deref().unwrap_or(collection))
    }

    // ───────────────────── Variables ─────────────────────

    /// Plottable columns of a collection.
    ///
    /// A configured `variables` list is returned as is. Otherwise every
    /// table column except geometry, time, label and level columns,
    /// sorted alphabetically.
    pub fn get_variables(&self, collection: &str) -> Result<Vec<String>> {
        let params = self.params(collection)?;
        if let Some(variables) = &params.variables {
            return Ok(variables.clone());
        }
        let table = self.get_dataframe(collection)?;
        let time_column = params.time_column();
        let label = params.label.as_deref();
        let levels = params.levels();
        let mut variables: Vec<String> = table
            .columns()
            .iter()
            .filter(|c| {
                c.as_str() != GEOMETRY_COLUMN
                    && c.as_str() != time_column
                    && Some(c.as_str()) != label
                    && !levels.contains(*c)
            })
            .cloned()
            .collect();
        variables.sort();
        Ok(variables)
    }

    /// First plottable variable, if there is one.
    pub fn get_default_variable(&self, collection: &str) -> Result<Option<String>> {
        Ok(self.get_variables(collection)?.into_iter().next())
    }

    // ───────────────────── Levels ─────────────────────

    /// Distinct level values nested outermost first, or `None` when the
    /// collection has no levels.
    pub fn get_nested_level_values(&self, collection: &str) -> Result<Option<LevelTree>> {
        let levels = self.params(collection)?.levels();
        if levels.is_empty() {
            return Ok(None);
        }
        let table = self.get_dataframe(collection)?;
        let rows: Vec<usize> = (0..table.len()).collect();
        nested_level_values(&table, &rows, levels).map(Some)
    }

    // ───────────────────── Time ─────────────────────

    /// Earliest and latest timestamp in the time column.
    pub fn get_time_range(&self, collection: &str) -> Result<(NaiveDateTime, NaiveDateTime)> {
        let time_column = self.get_time_column_name(collection)?;
        let table = self.get_dataframe(collection)?;
        let mut range: Option<(NaiveDateTime, NaiveDateTime)> = None;
        for value in table.column(time_column)? {
            let ts = value_to_timestamp(value).ok_or_else(|| FeatureError::InvalidTimestamp {
                column: time_column.to_string(),
                value: value.to_string(),
            })?;
            range = Some(match range {
                Some((lo, hi)) => (lo.min(ts), hi.max(ts)),
                None => (ts, ts),
            });
        }
        range.ok_or_else(|| FeatureError::EmptyCollection(collection.to_string()))
    }

    // ───────────────────── Geometry ─────────────────────

    /// Geometry family of the first point or polygon feature.
    pub fn get_geometry_type(&self, collection: &str) -> Result<Option<GeometryKind>> {
        let table = self.get_dataframe(collection)?;
        Ok(table.geometries().iter().find_map(|g| match g {
            Geometry::Point(_) => Some(GeometryKind::Point),
            Geometry::Polygon(_) | Geometry::MultiPolygon(_) => Some(GeometryKind::Polygon),
            _ => None,
        }))
    }

    /// Point coordinates, labels and colour-code values, one entry per row.
    pub fn get_points_as_tuples(&self, collection: &str) -> Result<PointData> {
        let params = self.params(collection)?;
        let table = self.get_dataframe(collection)?;

        let mut lons = Vec::with_capacity(table.len());
        let mut lats = Vec::with_capacity(table.len());
        for geometry in table.geometries() {
            match geometry {
                Geometry::Point(p) => {
                    lons.push(p.x());
                    lats.push(p.y());
                }
                other => {
                    return Err(FeatureError::GeometryMismatch {
                        collection: collection.to_string(),
                        expected: "Point",
                        found: geometry_name(other),
                    })
                }
            }
        }

        let labels = labels(&table, params.label.as_deref())?;
        let color_values = params
            .colorcodevariable
            .as_ref()
            .map(|cc| table.column(&cc.name).map(|values| values.cloned().collect()))
            .transpose()?;

        Ok(PointData {
            lons,
            lats,
            labels,
            color_values,
        })
    }

    /// Exterior rings of all polygon features, flattened with a `None` gap
    /// after each ring. Non-polygon rows are skipped.
    pub fn get_polygon_data(&self, collection: &str) -> Result<PolygonData> {
        let params = self.params(collection)?;
        let table = self.get_dataframe(collection)?;
        let labels = labels(&table, params.label.as_deref())?;

        let mut data = PolygonData {
            lons: Vec::new(),
            lats: Vec::new(),
            hover_texts: Vec::new(),
        };
        for (geometry, label) in table.geometries().iter().zip(&labels) {
            let polygons: Vec<&Polygon<f64>> = match geometry {
                Geometry::Polygon(p) => vec![p],
                Geometry::MultiPolygon(mp) => mp.0.iter().collect(),
                _ => continue,
            };
            for polygon in polygons {
                let ring = polygon.exterior();
                data.lons
                    .extend(ring.coords().map(|c| Some(c.x)).chain(iter::once(None)));
                data.lats
                    .extend(ring.coords().map(|c| Some(c.y)).chain(iter::once(None)));
                data.hover_texts
                    .extend(iter::repeat(label.clone()).take(ring.0.len() + 1));
            }
        }
        Ok(data)
    }
}

/// Per-row display text: the label column when configured, otherwise every
/// attribute as `column: value`.
fn labels(table: &Table, label: Option<&str>) -> Result<Vec<String>> {
    match label {
        Some(label) => Ok(table.column(label)?.map(ToString::to_string).collect()),
        None => Ok((0..table.len()).map(|i| table.row_label(i)).collect()),
    }
}
