//! Derived result structs for map and selection widgets.
//!
//! All structs derive `Serialize` so they can be handed to a charting
//! front-end as JSON.

use doors_core::Value;
use serde::ser::{Error, SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};
use std::collections::HashSet;

/// Parallel point arrays for a scatter map.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PointData {
    pub lons: Vec<f64>,
    pub lats: Vec<f64>,
    /// Configured label column, or `column: value` pairs joined by `<br>`.
    pub labels: Vec<String>,
    /// Values of the colour-code variable, when one is configured.
    pub color_values: Option<Vec<Value>>,
}

/// Flattened polygon rings for a line/fill map trace.
///
/// `None` separates consecutive rings so they are not joined when drawn.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PolygonData {
    pub lons: Vec<Option<f64>>,
    pub lats: Vec<Option<f64>>,
    /// One entry per coordinate (and gap), repeating the feature's label.
    pub hover_texts: Vec<String>,
}

/// Broad geometry family of a collection.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub enum GeometryKind {
    Point,
    /// Polygon or MultiPolygon.
    Polygon,
}

/// Distinct values of a collection's levels, nested outermost first.
///
/// The last level is a flat list; every other level maps each distinct
/// value to the tree of the rows holding it. Order is first occurrence.
///
/// Branch keys serialize as their display text. Serialization fails when
/// two distinct keys share a text (e.g. `5` and `"5"`).
#[derive(Debug, Clone, PartialEq)]
pub enum LevelTree {
    Leaves(Vec<Value>),
    Branches(Vec<(Value, LevelTree)>),
}

impl LevelTree {
    /// Values of the outermost level.
    pub fn keys(&self) -> Vec<&Value> {
        match self {
            LevelTree::Leaves(values) => values.iter().collect(),
            LevelTree::Branches(branches) => branches.iter().map(|(k, _)| k).collect(),
        }
    }

    /// Subtree below `key`. Leaves have no subtrees.
    pub fn get(&self, key: &Value) -> Option<&LevelTree> {
        match self {
            LevelTree::Leaves(_) => None,
            LevelTree::Branches(branches) => {
                branches.iter().find(|(k, _)| k == key).map(|(_, t)| t)
            }
        }
    }

    pub fn leaves(&self) -> Option<&[Value]> {
        match self {
            LevelTree::Leaves(values) => Some(values),
            LevelTree::Branches(_) => None,
        }
    }
}

impl Serialize for LevelTree {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            LevelTree::Leaves(values) => {
                let mut seq = serializer.serialize_seq(Some(values.len()))?;
                for value in values {
                    seq.serialize_element(value)?;
                }
                seq.end()
            }
            LevelTree::Branches(branches) => {
                let mut map = serializer.serialize_map(Some(branches.len()))?;
                let mut seen = HashSet::with_capacity(branches.len());
                for (key, subtree) in branches {
                    let text = key.to_string();
                    if !seen.insert(text.clone()) {
                        return Err(S::Error::custom(format!(
                            "level values of different types share the key '{}'",
                            text
                        )));
                    }
                    map.serialize_entry(&text, subtree)?;
                }
                map.end()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_tree_serializes_as_nested_json() {
        let tree = LevelTree::Branches(vec![
            (
                Value::from("C1"),
                LevelTree::Leaves(vec![Value::from("S1"), Value::from("S2")]),
            ),
            (Value::from("C2"), LevelTree::Leaves(vec![Value::Int(3)])),
        ]);
        let json = serde_json::to_string(&tree).unwrap();
        assert_eq!(json, r#"{"C1":["S1","S2"],"C2":[3]}"#);
    }

    #[test]
    fn level_tree_rejects_keys_with_same_text() {
        let tree = LevelTree::Branches(vec![
            (Value::Int(5), LevelTree::Leaves(vec![Value::from("A")])),
            (Value::from("5"), LevelTree::Leaves(vec![Value::from("B")])),
        ]);
        let err = serde_json::to_value(&tree).unwrap_err();
        assert!(err.to_string().contains("'5'"), "{}", err);

        let nested = LevelTree::Branches(vec![(Value::from("C1"), tree)]);
        assert!(serde_json::to_string(&nested).is_err());
    }

    #[test]
    fn level_tree_lookup() {
        let tree = LevelTree::Branches(vec![(
            Value::from("C1"),
            LevelTree::Leaves(vec![Value::from("S1")]),
        )]);
        assert_eq!(tree.keys(), vec![&Value::from("C1")]);
        let leaves = tree.get(&Value::from("C1")).and_then(LevelTree::leaves);
        assert_eq!(leaves, Some(&[Value::from("S1")][..]));
        assert!(tree.get(&Value::from("C9")).is_none());
    }

    #[test]
    fn polygon_gaps_serialize_as_null() {
        let data = PolygonData {
            lons: vec![Some(1.0), None],
            lats: vec![Some(2.0), None],
            hover_texts: vec!["a".to_string(), "a".to_string()],
        };
        let json = serde_json::to_string(&data).unwrap();
        assert_eq!(
            json,
            r#"{"lons":[1.0,null],"lats":[2.0,null],"hover_texts":["a","a"]}"#
        );
    }
}
