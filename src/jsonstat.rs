// https://json-stat.org/full/
//
// COMEXT answers with a single flat value map addressed by a mixed-radix index
// over the dataset's dimensions. Decoding walks that index back into one
// category position per dimension and resolves each position to its code and
// label.

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum DecodeError {
    #[error("{ids} dimension identifiers but {sizes} dimension sizes")]
    ShapeMismatch { ids: usize, sizes: usize },
    #[error("dimension `{dimension}` has non-positive size {size}")]
    NonPositiveSize { dimension: String, size: i64 },
    #[error("dimension sizes overflow the flat index space")]
    Overflow,
    #[error("flat index `{0}` is not a non-negative integer")]
    InvalidIndex(String),
    #[error("flat index {index} is outside the declared grid of {extent} cells")]
    IndexOutOfRange { index: u64, extent: u64 },
    #[error("`value` must be an object, an array or null, found {0}")]
    InvalidValues(&'static str),
}

/// Row-major addressing over a grid of dimension sizes. The last dimension
/// varies fastest.
#[derive(Debug, Clone, PartialEq)]
pub struct Grid {
    strides: Vec<u64>,
    extent: u64,
}

impl Grid {
    pub fn new(sizes: &[u64]) -> Result<Grid, DecodeError> {
        let mut strides = vec![1; sizes.len()];
        let mut extent: u64 = 1;

        for k in (0..sizes.len()).rev() {
            strides[k] = extent;
            extent = extent.checked_mul(sizes[k]).ok_or(DecodeError::Overflow)?;
        }

        Ok(Grid { strides, extent })
    }

    pub fn strides(&self) -> &[u64] {
        &self.strides
    }

    /// Number of cells in the grid.
    pub fn extent(&self) -> u64 {
        self.extent
    }

    pub fn coordinates(&self, index: u64) -> Vec<u64> {
        let mut remainder = index;
        self.strides
            .iter()
            .map(|stride| {
                let position = remainder / stride;
                remainder %= stride;
                position
            })
            .collect()
    }

    pub fn flat_index(&self, coordinates: &[u64]) -> u64 {
        coordinates
            .iter()
            .zip(&self.strides)
            .map(|(position, stride)| position * stride)
            .sum()
    }
}

/// One dataset dimension: its identifier, its cardinality and the category
/// tables used to turn a position back into a code and a label.
#[derive(Debug, Clone)]
pub struct Dimension {
    pub id: String,
    pub size: u64,
    codes: HashMap<u64, String>,
    labels: HashMap<String, String>,
}

impl Dimension {
    pub fn new<S: Into<String>>(id: S, size: u64) -> Dimension {
        Dimension {
            id: id.into(),
            size,
            codes: HashMap::new(),
            labels: HashMap::new(),
        }
    }

    pub fn category<S: Into<String>>(mut self, code: S, position: u64) -> Dimension {
        self.insert_category(code, position);
        self
    }

    pub fn label<S: Into<String>, T: Into<String>>(mut self, code: S, label: T) -> Dimension {
        self.insert_label(code, label);
        self
    }

    pub fn insert_category<S: Into<String>>(&mut self, code: S, position: u64) {
        self.codes.insert(position, code.into());
    }

    pub fn insert_label<S: Into<String>, T: Into<String>>(&mut self, code: S, label: T) {
        self.labels.insert(code.into(), label.into());
    }

    pub fn code_at(&self, position: u64) -> Option<&str> {
        self.codes.get(&position).map(String::as_str)
    }

    pub fn label_of(&self, code: &str) -> Option<&str> {
        self.labels.get(code).map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Coordinate {
    pub code: Option<String>,
    pub label: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub value: Option<f64>,
    pub coordinates: Vec<Coordinate>,
}

#[derive(Debug, Clone, Default)]
pub struct DecodedTable {
    pub dim_ids: Vec<String>,
    pub rows: Vec<Row>,
}

impl DecodedTable {
    /// `value`, then `<id>` and `<id>_label` for every dimension.
    pub fn columns(&self) -> Vec<String> {
        let mut columns = Vec::with_capacity(1 + 2 * self.dim_ids.len());
        columns.push("value".to_owned());
        for id in &self.dim_ids {
            columns.push(id.to_owned());
            columns.push(format!("{}_label", id));
        }
        columns
    }
}

/// Best-effort numeric coercion. Anything that doesn't read as a number is
/// missing rather than an error.
pub fn coerce_numeric(raw: &Value) -> Option<f64> {
    match raw {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|v| !v.is_nan()),
        _ => None,
    }
}

/// Reads the flat value map. Objects are keyed by decimal index strings; a
/// dense array addresses cells by position and its nulls are absent cells.
pub fn flat_entries(values: &Value) -> Result<Vec<(u64, &Value)>, DecodeError> {
    match values {
        Value::Null => Ok(Vec::new()),
        Value::Object(map) => map
            .iter()
            .map(|(key, raw)| match key.trim().parse::<u64>() {
                Ok(index) => Ok((index, raw)),
                Err(_) => Err(DecodeError::InvalidIndex(key.to_owned())),
            })
            .collect(),
        Value::Array(cells) => Ok(cells
            .iter()
            .enumerate()
            .filter(|(_, raw)| !raw.is_null())
            .map(|(index, raw)| (index as u64, raw))
            .collect()),
        Value::Bool(_) => Err(DecodeError::InvalidValues("a boolean")),
        Value::Number(_) => Err(DecodeError::InvalidValues("a number")),
        Value::String(_) => Err(DecodeError::InvalidValues("a string")),
    }
}

/// Turns flat `(index, raw value)` entries into labeled rows, one per entry,
/// in the order given. Every index is checked against the grid before any
/// row is produced.
pub fn decode<'a, I>(dimensions: &[Dimension], values: I) -> Result<DecodedTable, DecodeError>
where
    I: IntoIterator<Item = (u64, &'a Value)>,
{
    let dim_ids: Vec<String> = dimensions.iter().map(|d| d.id.to_owned()).collect();
    let values: Vec<(u64, &Value)> = values.into_iter().collect();

    if values.is_empty() {
        return Ok(DecodedTable { dim_ids, rows: Vec::new() });
    }

    if let Some(dimension) = dimensions.iter().find(|d| d.size == 0) {
        return Err(DecodeError::NonPositiveSize { dimension: dimension.id.to_owned(), size: 0 });
    }

    let sizes: Vec<u64> = dimensions.iter().map(|d| d.size).collect();
    let grid = Grid::new(&sizes)?;

    if let Some((index, _)) = values.iter().find(|(index, _)| *index >= grid.extent()) {
        return Err(DecodeError::IndexOutOfRange { index: *index, extent: grid.extent() });
    }

    let rows = values
        .into_iter()
        .map(|(index, raw)| {
            let coordinates = grid
                .coordinates(index)
                .into_iter()
                .zip(dimensions)
                .map(|(position, dimension)| {
                    let code = dimension.code_at(position);
                    Coordinate {
                        label: code.and_then(|c| dimension.label_of(c)).map(str::to_owned),
                        code: code.map(str::to_owned),
                    }
                })
                .collect();

            Row { value: coerce_numeric(raw), coordinates }
        })
        .collect();

    Ok(DecodedTable { dim_ids, rows })
}

/// Category metadata is read loosely: a malformed index entry or label only
/// costs that category, never the document.
#[derive(Deserialize, Debug, Default)]
pub struct CategoryMetadata {
    #[serde(default)]
    pub index: Value,   // `{code: position}` or `[code, ...]`
    #[serde(default)]
    pub label: Value,   // `{code: label}`
}

impl CategoryMetadata {
    /// `(code, position)` pairs. Positions that aren't non-negative integers
    /// and codes that aren't strings are skipped.
    pub fn positions(&self) -> Vec<(&str, u64)> {
        match &self.index {
            Value::Object(map) => map
                .iter()
                .filter_map(|(code, position)| Some((code.as_str(), position.as_u64()?)))
                .collect(),
            Value::Array(codes) => codes
                .iter()
                .enumerate()
                .filter_map(|(position, code)| Some((code.as_str()?, position as u64)))
                .collect(),
            _ => Vec::new(),
        }
    }

    /// `(code, label)` pairs; anything but a string label counts as absent.
    pub fn labels(&self) -> Vec<(&str, &str)> {
        match &self.label {
            Value::Object(map) => map
                .iter()
                .filter_map(|(code, label)| Some((code.as_str(), label.as_str()?)))
                .collect(),
            _ => Vec::new(),
        }
    }
}

#[derive(Deserialize, Debug, Default)]
pub struct DimensionMetadata {
    #[serde(default)]
    pub category: Option<CategoryMetadata>,
}

/// A JSON-stat dataset document as returned by COMEXT.
#[derive(Deserialize, Debug, Default)]
pub struct Dataset {
    #[serde(default)]
    pub id: Vec<String>,
    #[serde(default)]
    pub size: Vec<i64>,
    #[serde(default)]
    pub value: Value,
    #[serde(default)]
    pub dimension: Option<HashMap<String, DimensionMetadata>>,
}

impl Dataset {
    pub fn dimensions(&self) -> Result<Vec<Dimension>, DecodeError> {
        if self.id.len() != self.size.len() {
            return Err(DecodeError::ShapeMismatch { ids: self.id.len(), sizes: self.size.len() });
        }

        let mut dimensions = Vec::with_capacity(self.id.len());
        for (id, &size) in self.id.iter().zip(&self.size) {
            if size <= 0 {
                return Err(DecodeError::NonPositiveSize { dimension: id.to_owned(), size });
            }

            let mut dimension = Dimension::new(id.as_str(), size as u64);

            let category = self.dimension
                .as_ref()
                .and_then(|d| d.get(id))
                .and_then(|metadata| metadata.category.as_ref());

            if let Some(category) = category {
                for (code, position) in category.positions() {
                    dimension.insert_category(code, position);
                }
                for (code, label) in category.labels() {
                    dimension.insert_label(code, label);
                }
            }

            dimensions.push(dimension);
        }

        Ok(dimensions)
    }

    pub fn decode(&self) -> Result<DecodedTable, DecodeError> {
        let entries = flat_entries(&self.value)?;
        if entries.is_empty() {
            return Ok(DecodedTable { dim_ids: self.id.clone(), rows: Vec::new() });
        }

        let dimensions = self.dimensions()?;
        decode(&dimensions, entries)
    }
}

#[cfg(test)]
fn flow_geo() -> Vec<Dimension> {
    vec![
        Dimension::new("flow", 2).category("1", 0).category("2", 1),
        Dimension::new("geo", 3)
            .category("ES", 0)
            .category("FR", 1)
            .category("IT", 2)
            .label("ES", "Spain")
            .label("FR", "France"),
    ]
}

#[test]
fn test_strides_are_suffix_products() {
    let grid = Grid::new(&[2, 3]).unwrap();
    assert_eq!(grid.strides(), &[3, 1]);
    assert_eq!(grid.extent(), 6);

    let grid = Grid::new(&[4, 1, 5, 2]).unwrap();
    assert_eq!(grid.strides(), &[10, 10, 2, 1]);
    assert_eq!(grid.extent(), 40);
}

#[test]
fn test_stride_overflow_is_rejected() {
    assert_eq!(Grid::new(&[u64::MAX, 2]), Err(DecodeError::Overflow));
}

#[test]
fn test_coordinates_round_trip() {
    let grid = Grid::new(&[2, 3, 1, 4]).unwrap();
    for index in 0..grid.extent() {
        let coordinates = grid.coordinates(index);
        assert_eq!(coordinates[2], 0);
        assert!(coordinates[0] < 2 && coordinates[1] < 3 && coordinates[3] < 4);
        assert_eq!(grid.flat_index(&coordinates), index);
    }
}

#[test]
fn test_decode_worked_example() {
    let raw = serde_json::json!("10.5");
    let table = decode(&flow_geo(), vec![(4, &raw)]).unwrap();

    assert_eq!(table.columns(), vec!["value", "flow", "flow_label", "geo", "geo_label"]);
    assert_eq!(table.rows.len(), 1);

    let row = &table.rows[0];
    assert_eq!(row.value, Some(10.5));
    assert_eq!(row.coordinates[0], Coordinate { code: Some("2".to_owned()), label: None });
    assert_eq!(row.coordinates[1], Coordinate { code: Some("FR".to_owned()), label: Some("France".to_owned()) });
}

#[test]
fn test_decode_out_of_range_is_rejected() {
    let raw = serde_json::json!("x");
    let fine = serde_json::json!(1);
    let result = decode(&flow_geo(), vec![(0, &fine), (99, &raw)]);
    assert_eq!(result.unwrap_err(), DecodeError::IndexOutOfRange { index: 99, extent: 6 });
}

#[test]
fn test_decode_empty_values() {
    let table = decode(&flow_geo(), Vec::<(u64, &Value)>::new()).unwrap();
    assert!(table.rows.is_empty());

    // shape problems don't matter when nothing needs decoding
    let dataset: Dataset = serde_json::from_str(r#"{"id": ["a", "b"], "size": [0], "value": {}}"#).unwrap();
    assert!(dataset.decode().unwrap().rows.is_empty());

    let dataset: Dataset = serde_json::from_str(r#"{"id": ["a"], "size": [1]}"#).unwrap();
    assert!(dataset.decode().unwrap().rows.is_empty());
}

#[test]
fn test_decode_unresolved_position_is_local() {
    // geo position 2 is unknown here; flow still resolves
    let dimensions = vec![
        Dimension::new("flow", 2).category("1", 0).category("2", 1).label("1", "Import"),
        Dimension::new("geo", 3).category("ES", 0).label("ES", "Spain"),
    ];
    let raw = serde_json::json!(7);
    let table = decode(&dimensions, vec![(2, &raw)]).unwrap();
    let row = &table.rows[0];

    assert_eq!(row.value, Some(7.0));
    assert_eq!(row.coordinates[0], Coordinate { code: Some("1".to_owned()), label: Some("Import".to_owned()) });
    assert_eq!(row.coordinates[1], Coordinate { code: None, label: None });
}

#[test]
fn test_decode_non_numeric_value_still_emits_row() {
    let values = vec![serde_json::json!(":"), serde_json::Value::Null, serde_json::json!(" 3 ")];
    let table = decode(&flow_geo(), vec![(0, &values[0]), (1, &values[1]), (5, &values[2])]).unwrap();

    assert_eq!(table.rows.len(), 3);
    assert_eq!(table.rows[0].value, None);
    assert_eq!(table.rows[1].value, None);
    assert_eq!(table.rows[2].value, Some(3.0));
    assert_eq!(table.rows[2].coordinates[1].code.as_deref(), Some("IT"));
    assert_eq!(table.rows[2].coordinates[1].label, None);
}

#[test]
fn test_coerce_numeric() {
    assert_eq!(coerce_numeric(&serde_json::json!(2)), Some(2.0));
    assert_eq!(coerce_numeric(&serde_json::json!(" -1.5e3 ")), Some(-1500.0));
    assert_eq!(coerce_numeric(&serde_json::json!("NaN")), None);
    assert_eq!(coerce_numeric(&serde_json::json!(":")), None);
    assert_eq!(coerce_numeric(&serde_json::json!(true)), None);
    assert_eq!(coerce_numeric(&serde_json::json!([1])), None);
}

#[test]
fn test_decode_size_one_dimension() {
    let dimensions = vec![
        Dimension::new("freq", 1).category("A", 0).label("A", "Annual"),
        Dimension::new("time", 2).category("2019", 0).category("2020", 1),
    ];
    let raw = serde_json::json!(1.5);
    let table = decode(&dimensions, vec![(1, &raw)]).unwrap();
    let row = &table.rows[0];

    assert_eq!(row.coordinates[0].label.as_deref(), Some("Annual"));
    assert_eq!(row.coordinates[1].code.as_deref(), Some("2020"));
}

#[test]
fn test_dataset_document() {
    let document = r#"{
        "version": "2.0",
        "class": "dataset",
        "id": ["flow", "geo"],
        "size": [2, 3],
        "value": {"5": 1.25, "0": "12", "4": "10.5"},
        "dimension": {
            "flow": {"category": {"index": {"1": 0, "2": 1}}},
            "geo": {"category": {"index": ["ES", "FR", "IT"], "label": {"FR": "France", "IT": "Italy"}}}
        }
    }"#;

    let dataset: Dataset = serde_json::from_str(document).unwrap();
    let table = dataset.decode().unwrap();

    assert_eq!(table.rows.len(), 3);
    // document order, not index order
    assert_eq!(table.rows[0].value, Some(1.25));
    assert_eq!(table.rows[0].coordinates[0].code.as_deref(), Some("2"));
    assert_eq!(table.rows[0].coordinates[1].label.as_deref(), Some("Italy"));
    assert_eq!(table.rows[1].value, Some(12.0));
    assert_eq!(table.rows[1].coordinates[1].code.as_deref(), Some("ES"));
    assert_eq!(table.rows[1].coordinates[1].label, None);
    assert_eq!(table.rows[2].coordinates[1].label.as_deref(), Some("France"));
}

#[test]
fn test_dataset_dense_values_skip_nulls() {
    let document = r#"{"id": ["geo"], "size": [3], "value": [1, null, 3],
        "dimension": {"geo": {"category": {"index": ["ES", "FR", "IT"]}}}}"#;
    let dataset: Dataset = serde_json::from_str(document).unwrap();
    let table = dataset.decode().unwrap();

    assert_eq!(table.rows.len(), 2);
    assert_eq!(table.rows[1].coordinates[0].code.as_deref(), Some("IT"));
}

#[test]
fn test_dataset_malformed_category_metadata_is_local() {
    let document = r#"{
        "id": ["geo"],
        "size": [3],
        "value": {"0": 1, "1": 2, "2": 3},
        "dimension": {"geo": {"category": {
            "index": {"ES": 0, "FR": -1, "IT": 2.5, "PT": 1},
            "label": {"ES": null, "PT": "Portugal", "IT": 7}
        }}}
    }"#;

    let dataset: Dataset = serde_json::from_str(document).unwrap();
    let table = dataset.decode().unwrap();

    assert_eq!(table.rows.len(), 3);
    assert_eq!(table.rows[0].coordinates[0], Coordinate { code: Some("ES".to_owned()), label: None });
    assert_eq!(table.rows[1].coordinates[0], Coordinate { code: Some("PT".to_owned()), label: Some("Portugal".to_owned()) });
    assert_eq!(table.rows[2].coordinates[0], Coordinate { code: None, label: None });
}

#[test]
fn test_dataset_non_object_labels_and_odd_codes() {
    let document = r#"{
        "id": ["geo"],
        "size": [2],
        "value": [10, 20],
        "dimension": {"geo": {"category": {"index": [null, "FR"], "label": "France"}}}
    }"#;

    let dataset: Dataset = serde_json::from_str(document).unwrap();
    let table = dataset.decode().unwrap();

    assert_eq!(table.rows[0].coordinates[0], Coordinate { code: None, label: None });
    assert_eq!(table.rows[1].coordinates[0], Coordinate { code: Some("FR".to_owned()), label: None });
}

#[test]
fn test_dataset_missing_dimension_metadata() {
    let document = r#"{"id": ["flow", "geo"], "size": [2, 3], "value": {"1": 4}}"#;
    let dataset: Dataset = serde_json::from_str(document).unwrap();
    let table = dataset.decode().unwrap();

    assert_eq!(table.rows[0].value, Some(4.0));
    assert!(table.rows[0].coordinates.iter().all(|c| c.code.is_none() && c.label.is_none()));
}

#[test]
fn test_dataset_validation_errors() {
    let cases = vec![
        (r#"{"id": ["a", "b"], "size": [2], "value": {"0": 1}}"#, DecodeError::ShapeMismatch { ids: 2, sizes: 1 }),
        (r#"{"id": ["a"], "size": [0], "value": {"0": 1}}"#, DecodeError::NonPositiveSize { dimension: "a".to_owned(), size: 0 }),
        (r#"{"id": ["a"], "size": [-2], "value": {"0": 1}}"#, DecodeError::NonPositiveSize { dimension: "a".to_owned(), size: -2 }),
        (r#"{"id": ["a"], "size": [2], "value": {"-1": 1}}"#, DecodeError::InvalidIndex("-1".to_owned())),
        (r#"{"id": ["a"], "size": [2], "value": {"1.5": 1}}"#, DecodeError::InvalidIndex("1.5".to_owned())),
        (r#"{"id": ["a"], "size": [2], "value": "nope"}"#, DecodeError::InvalidValues("a string")),
        (r#"{"id": ["a", "b"], "size": [2, 3], "value": {"99": "x"}}"#, DecodeError::IndexOutOfRange { index: 99, extent: 6 }),
    ];

    for (document, expected) in cases {
        let dataset: Dataset = serde_json::from_str(document).unwrap();
        assert_eq!(dataset.decode().unwrap_err(), expected, "{}", document);
    }
}
