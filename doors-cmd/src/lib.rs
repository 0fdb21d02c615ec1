//! Command implementations for the doors CLI.
//!
//! Every command loads the configuration, builds a feature handler and
//! prints its answer as pretty JSON.

use anyhow::Context;
use clap::Subcommand;
use doors_core::config::Config;
use doors_core::source::DataSourceClient;
use doors_features::FeatureHandler;
use doors_geodb::GeoDbClient;
use serde::Serialize;
use serde_json::json;
use std::path::Path;
use std::sync::Arc;

#[derive(Subcommand)]
pub enum Command {
    /// List configured collection ids in configuration order
    Collections,

    /// Plottable variables of a collection
    Variables {
        /// Collection id
        id: String,
    },

    /// Configured level columns of a collection
    Levels {
        /// Collection id
        id: String,
    },

    /// Distinct level values, nested outermost first
    NestedLevels {
        /// Collection id
        id: String,
    },

    /// Point coordinates and labels of a point collection
    Points {
        /// Collection id
        id: String,
    },

    /// Flattened polygon rings of a polygon collection
    Polygons {
        /// Collection id
        id: String,
    },

    /// Earliest and latest timestamp of a collection
    TimeRange {
        /// Collection id
        id: String,
    },

    /// Summary of a collection's configuration and loaded table
    Describe {
        /// Collection id
        id: String,
    },
}

#[derive(Serialize)]
struct CollectionSummary<'a> {
    id: &'a str,
    title: &'a str,
    rows: usize,
    columns: &'a [String],
    geometry_type: Option<doors_features::GeometryKind>,
    label: Option<&'a str>,
    levels: Vec<String>,
    variables: Vec<String>,
    time_column: &'a str,
    time_range: Option<serde_json::Value>,
}

pub fn run(config_path: &Path, command: Command) -> anyhow::Result<()> {
    let config = Config::from_path(config_path)
        .with_context(|| format!("Failed to load config {}", config_path.display()))?;
    let client = match &config.geodb {
        Some(settings) => {
            Some(Arc::new(GeoDbClient::from_settings(settings)?) as Arc<dyn DataSourceClient>)
        }
        None => {
            if config.has_remote_collections() {
                log::warn!("cmd: geodb collections configured without a geodb section");
            }
            None
        }
    };
    let handler = FeatureHandler::from_config(&config, client)?;
    let output = execute(&handler, &command)?;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

/// Answer `command` against `handler` as a JSON document.
pub fn execute(handler: &FeatureHandler, command: &Command) -> anyhow::Result<serde_json::Value> {
    let output = match command {
        Command::Collections => serde_json::to_value(handler.get_collections())?,
        Command::Variables { id } => serde_json::to_value(handler.get_variables(id)?)?,
        Command::Levels { id } => serde_json::to_value(handler.get_levels(id)?)?,
        Command::NestedLevels { id } => {
            serde_json::to_value(handler.get_nested_level_values(id)?)?
        }
        Command::Points { id } => serde_json::to_value(handler.get_points_as_tuples(id)?)?,
        Command::Polygons { id } => serde_json::to_value(handler.get_polygon_data(id)?)?,
        Command::TimeRange { id } => time_range(handler, id)?,
        Command::Describe { id } => describe(handler, id)?,
    };
    Ok(output)
}

fn time_range(handler: &FeatureHandler, id: &str) -> anyhow::Result<serde_json::Value> {
    let (start, end) = handler.get_time_range(id)?;
    Ok(json!({ "start": start, "end": end }))
}

fn describe(handler: &FeatureHandler, id: &str) -> anyhow::Result<serde_json::Value> {
    let table = handler.get_dataframe(id)?;
    let time_column = handler.get_time_column_name(id)?;
    let time_range = if table.has_column(time_column) {
        Some(time_range(handler, id)?)
    } else {
        None
    };
    let summary = CollectionSummary {
        id,
        title: handler.get_title(id)?,
        rows: table.len(),
        columns: table.columns(),
        geometry_type: handler.get_geometry_type(id)?,
        label: handler.get_label(id)?,
        levels: handler.get_levels(id)?,
        variables: handler.get_variables(id)?,
        time_column,
        time_range,
    };
    log::debug!("cmd: Described '{}' with {} rows", id, summary.rows);
    Ok(serde_json::to_value(summary)?)
}
