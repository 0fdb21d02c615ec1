//! Recursive grouping of a table by its level columns.

use crate::models::LevelTree;
use doors_core::{Result, Table, Value};
use std::collections::HashMap;

/// Group `rows` of `table` by `levels[0]`, recursing into each group with
/// the remaining levels. The last level yields the distinct values only.
pub(crate) fn nested_level_values(
    table: &Table,
    rows: &[usize],
    levels: &[String],
) -> Result<LevelTree> {
    let Some((level, rest)) = levels.split_first() else {
        return Ok(LevelTree::Leaves(Vec::new()));
    };
    let column = table.column_index(level)?;

    let mut groups: Vec<(&Value, Vec<usize>)> = Vec::new();
    let mut positions: HashMap<&Value, usize> = HashMap::new();
    for &row in rows {
        let value = table.cell(row, column);
        match positions.get(value) {
            Some(&group) => groups[group].1.push(row),
            None => {
                positions.insert(value, groups.len());
                groups.push((value, vec![row]));
            }
        }
    }

    if rest.is_empty() {
        return Ok(LevelTree::Leaves(
            groups.into_iter().map(|(value, _)| value.clone()).collect(),
        ));
    }
    let branches = groups
        .into_iter()
        .map(|(value, members)| Ok((value.clone(), nested_level_values(table, &members, rest)?)))
        .collect::<Result<Vec<_>>>()?;
    Ok(LevelTree::Branches(branches))
}
