use std::collections::BTreeSet;

use polars::prelude::*;
use serde_json::{Map, Value as Json};
use tracing::debug;

use crate::error::{PipelineError, PipelineResult};
use crate::table::Table;

/// Build a table of string columns from a JSON document.
///
/// An array of objects yields one row per object over the sorted union of their keys;
/// a lone object yields one row. An array of scalars becomes a single `value` column and
/// an empty array becomes a table without columns. Numbers keep their JSON spelling and
/// nested values their JSON text; null or absent fields are null cells.
pub fn json_to_table(j: &Json) -> PipelineResult<Table> {
    match j {
        Json::Array(arr) => {
            if arr.is_empty() {
                return Ok(Table::empty());
            }
            if arr.iter().all(|v| v.is_object()) {
                let objs: Vec<&Map<String, Json>> = arr.iter().filter_map(|v| v.as_object()).collect();
                objects_to_table(&objs)
            } else {
                let vals: Vec<Option<String>> = arr.iter().map(text_of).collect();
                let ser = Series::new("value".into(), vals);
                Ok(Table::from_frame(DataFrame::new(vec![ser.into()])?))
            }
        }
        Json::Object(map) => objects_to_table(&[map]),
        _ => Err(PipelineError::parse("unsupported JSON root: expected array or object")),
    }
}

/// Flatten a time-series-per-entity document into one row per (entity, observation).
///
/// The root must be an array of entity objects, each holding its scalar attributes
/// (e.g. `iso_code`, `country`) and an array of observations under `series_field`.
/// Each output row carries the entity's scalar attributes followed by the observation's
/// fields. Entities without the series field contribute no rows.
pub fn flatten_series(j: &Json, series_field: &str) -> PipelineResult<Table> {
    let entities = j
        .as_array()
        .ok_or_else(|| PipelineError::parse("time-series document must be a JSON array"))?;

    let mut parent_keys: Vec<String> = Vec::new();
    let mut child_keys: Vec<String> = Vec::new();
    for e in entities {
        let Some(obj) = e.as_object() else { continue };
        for (k, v) in obj {
            if k != series_field && !v.is_array() && !v.is_object() && !parent_keys.contains(k) {
                parent_keys.push(k.clone());
            }
        }
        if let Some(points) = obj.get(series_field).and_then(Json::as_array) {
            for p in points.iter().filter_map(Json::as_object) {
                for k in p.keys() {
                    if !child_keys.contains(k) {
                        child_keys.push(k.clone());
                    }
                }
            }
        }
    }
    // an observation field named like an entity attribute is shadowed by the attribute
    child_keys.retain(|k| !parent_keys.contains(k));

    let mut parents: Vec<Vec<Option<String>>> = vec![Vec::new(); parent_keys.len()];
    let mut children: Vec<Vec<Option<String>>> = vec![Vec::new(); child_keys.len()];
    for e in entities {
        let Some(obj) = e.as_object() else { continue };
        let Some(points) = obj.get(series_field).and_then(Json::as_array) else { continue };
        for p in points.iter().filter_map(Json::as_object) {
            for (k, col) in parent_keys.iter().zip(parents.iter_mut()) {
                col.push(obj.get(k).and_then(text_of));
            }
            for (k, col) in child_keys.iter().zip(children.iter_mut()) {
                col.push(p.get(k).and_then(text_of));
            }
        }
    }
    let cols: Vec<Column> = parent_keys
        .iter()
        .zip(parents)
        .chain(child_keys.iter().zip(children))
        .map(|(k, vals)| Series::new(k.as_str().into(), vals).into())
        .collect();
    let table = Table::from_frame(DataFrame::new(cols)?);
    debug!(target: "vaxboard::ingest", entities = entities.len(), rows = table.len(), series_field, "[JSON] flattened series");
    Ok(table)
}

fn objects_to_table(objs: &[&Map<String, Json>]) -> PipelineResult<Table> {
    let mut keys: BTreeSet<&str> = BTreeSet::new();
    for m in objs {
        keys.extend(m.keys().map(String::as_str));
    }
    let key_list: Vec<&str> = keys.into_iter().collect();
    debug!(target: "vaxboard::ingest", keys = ?key_list, "[JSON] array-of-objects keys inferred");

    let mut cols: Vec<Column> = Vec::with_capacity(key_list.len());
    for k in &key_list {
        let vals: Vec<Option<String>> = objs.iter().map(|m| m.get(*k).and_then(text_of)).collect();
        cols.push(Series::new((*k).into(), vals).into());
    }
    Ok(Table::from_frame(DataFrame::new(cols)?))
}

fn text_of(v: &Json) -> Option<String> {
    match v {
        Json::Null => None,
        Json::String(s) if s.is_empty() => None,
        Json::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}
