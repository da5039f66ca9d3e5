//! Per-format task extraction.
//!
//! [`plan`] resolves, once per file, which [`Extraction`] applies given the
//! file format, list mode, and target schema. The remaining functions turn
//! a decoded body into tasks for one extraction variant. Nothing here
//! touches storage; bodies and references are supplied by the caller.

use std::collections::BTreeSet;

use serde_json::{Number, Value};

use crate::error::ReadError;
use crate::format::FileFormat;
use crate::models::{Task, TaskData};
use crate::schema::TargetSchema;

const AMBIGUOUS_FIELD: &str = "Your label config has more than one data key and direct file upload \
     supports only one data key. To import data with multiple data keys, use a JSON or CSV file.";
const NOT_A_MAPPING: &str = "Task item should be dict";

/// How tasks are pulled out of one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extraction {
    /// One task per row of a delimited table.
    Delimited(u8),
    /// One task per non-empty line.
    Lines,
    /// One task per JSON object.
    Json,
    /// One task pointing at the file under a media field.
    MediaAsset(&'static str),
    /// One task holding the file body.
    HypertextBody,
    /// One task pointing at the file under the best-matching field.
    RawReference,
}

/// Chooses the extraction for a file.
///
/// Precedence: tabular and text lists (list mode only), JSON, media assets,
/// hypertext bodies, raw references. A raw file cannot be placed when the
/// schema has several fields.
pub fn plan(format: FileFormat, list_mode: bool, schema: &TargetSchema) -> Result<Extraction, ReadError> {
    let extraction = match format {
        FileFormat::Csv if list_mode => Extraction::Delimited(b','),
        FileFormat::Tsv if list_mode => Extraction::Delimited(b'\t'),
        FileFormat::Txt if list_mode => Extraction::Lines,
        FileFormat::Json => Extraction::Json,
        FileFormat::Image | FileFormat::Audio | FileFormat::Video => match format.media_field() {
            Some(field) if schema.contains(field) => Extraction::MediaAsset(field),
            _ => Extraction::RawReference,
        },
        FileFormat::Hypertext if schema.is_single_field() || schema.contains("text") => {
            Extraction::HypertextBody
        }
        _ if schema.is_single_field() => Extraction::RawReference,
        _ => return Err(ReadError::Invalid(AMBIGUOUS_FIELD.to_string())),
    };
    Ok(extraction)
}

/// Field for a whole-file task: `text`, else the sole field, else the
/// placeholder.
pub fn best_field(schema: &TargetSchema, undefined_field: &str) -> String {
    if schema.contains("text") {
        "text".to_string()
    } else {
        schema.sole_field().unwrap_or(undefined_field).to_string()
    }
}

/// Field for text lines: `text`, else `question`, else the sole field,
/// else the placeholder.
pub fn line_field(schema: &TargetSchema, undefined_field: &str) -> String {
    if schema.contains("text") {
        "text".to_string()
    } else if schema.contains("question") {
        "question".to_string()
    } else {
        schema.sole_field().unwrap_or(undefined_field).to_string()
    }
}

pub fn read_lines(text: &str, field: &str) -> Vec<Task> {
    text.lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| Task::single(field, line))
        .collect()
}

// ─── Delimited tables ───────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnType {
    Int,
    Float,
    Bool,
    Text,
}

fn parse_bool(cell: &str) -> Option<bool> {
    if cell.eq_ignore_ascii_case("true") {
        Some(true)
    } else if cell.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

fn parse_float(cell: &str) -> Option<f64> {
    cell.parse::<f64>().ok().filter(|f| f.is_finite())
}

fn infer_column<'a>(cells: impl Iterator<Item = &'a str>) -> ColumnType {
    let cells: Vec<&str> = cells.map(str::trim).filter(|c| !c.is_empty()).collect();
    if cells.is_empty() {
        ColumnType::Text
    } else if cells.iter().all(|c| c.parse::<i64>().is_ok()) {
        ColumnType::Int
    } else if cells.iter().all(|c| parse_float(c).is_some()) {
        ColumnType::Float
    } else if cells.iter().all(|c| parse_bool(c).is_some()) {
        ColumnType::Bool
    } else {
        ColumnType::Text
    }
}

fn cell_value(cell: &str, column: ColumnType) -> Value {
    if cell.is_empty() {
        return Value::String(String::new());
    }
    let trimmed = cell.trim();
    let typed = match column {
        ColumnType::Int => trimmed.parse::<i64>().ok().map(Value::from),
        ColumnType::Float => parse_float(trimmed)
            .and_then(Number::from_f64)
            .map(Value::Number),
        ColumnType::Bool => parse_bool(trimmed).map(Value::Bool),
        ColumnType::Text => None,
    };
    typed.unwrap_or_else(|| Value::String(cell.to_string()))
}

fn is_blank(record: &csv::StringRecord) -> bool {
    record.iter().all(str::is_empty) && record.len() <= 1
}

/// Reads a delimited table, one task per data row.
///
/// The first row is a header when `header_names` is empty or one of its
/// cells is in `header_names`; otherwise columns are named `column1..N` and
/// the first row is data.
pub fn read_delimited(
    text: &str,
    delimiter: u8,
    header_names: &BTreeSet<String>,
) -> Result<Vec<Task>, ReadError> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        if !is_blank(&record) {
            rows.push(record);
        }
    }
    let Some(first) = rows.first() else {
        return Ok(Vec::new());
    };

    let has_header =
        header_names.is_empty() || first.iter().any(|cell| header_names.contains(cell.trim()));
    let (headers, body): (Vec<String>, &[csv::StringRecord]) = if has_header {
        (first.iter().map(|h| h.trim().to_string()).collect(), &rows[1..])
    } else {
        (
            (1..=first.len()).map(|i| format!("column{}", i)).collect(),
            &rows[..],
        )
    };

    for (idx, row) in body.iter().enumerate() {
        if row.len() > headers.len() {
            return Err(ReadError::Invalid(format!(
                "row {} has {} fields, expected {}",
                idx + 1,
                row.len(),
                headers.len()
            )));
        }
    }

    let columns: Vec<ColumnType> = (0..headers.len())
        .map(|col| infer_column(body.iter().map(|row| row.get(col).unwrap_or(""))))
        .collect();

    Ok(body
        .iter()
        .map(|row| {
            let mut data = TaskData::new();
            for (col, header) in headers.iter().enumerate() {
                let cell = row.get(col).unwrap_or("");
                data.insert(header.clone(), cell_value(cell, columns[col]));
            }
            Task::from_data(data)
        })
        .collect())
}

// ─── JSON ───────────────────────────────────────────────────────────

fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
    }
}

/// Turns one JSON element into a task.
///
/// An object without a usable `data` key is itself the task data; otherwise
/// `data` must be an object and the remaining keys ride along as extras.
pub fn task_from_json_element(item: Value) -> Result<Task, ReadError> {
    let Value::Object(mut object) = item else {
        return Err(ReadError::Invalid(NOT_A_MAPPING.to_string()));
    };
    if object.get("data").map_or(true, is_falsy) {
        return Ok(Task::from_data(object));
    }
    match object.remove("data") {
        Some(Value::Object(data)) => {
            object.remove("file_upload_id");
            Ok(Task {
                data,
                extra: object,
                file_upload_id: None,
            })
        }
        _ => Err(ReadError::Invalid(NOT_A_MAPPING.to_string())),
    }
}

/// Accepts a single task object or an array of them.
pub fn tasks_from_json_value(value: Value) -> Result<Vec<Task>, ReadError> {
    let items = match value {
        Value::Array(items) => items,
        other => vec![other],
    };
    items.into_iter().map(task_from_json_element).collect()
}

pub fn read_json(text: &str) -> Result<Vec<Task>, ReadError> {
    let value: Value = serde_json::from_str(text)?;
    tasks_from_json_value(value)
}

/// Lenient JSON parse for payloads typed by hand: single quotes are
/// accepted as string delimiters. Returns `None` when the input is not
/// JSON or parses to an empty/falsy value.
pub fn str_to_json(input: &str) -> Option<Value> {
    serde_json::from_str::<Value>(&input.replace('\'', "\""))
        .ok()
        .filter(|value| !is_falsy(value))
}
