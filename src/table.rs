use std::fs;
use std::path::Path;

use serde_json::Value;

use crate::error::{AcquisitionError, Result};
use crate::jsonstat::coerce_numeric;

/// The uniform shape every source is reduced to: named columns and rows of
/// text cells. `None` is a missing cell and is written as an empty field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
}

impl Table {
    pub fn new(columns: Vec<String>) -> Table {
        Table {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Appends a column if it is not already there and returns its position.
    /// Existing rows get a missing cell.
    pub fn ensure_column(&mut self, name: &str) -> usize {
        match self.column_index(name) {
            Some(index) => index,
            None => {
                self.columns.push(name.to_owned());
                for row in self.rows.iter_mut() {
                    row.push(None);
                }
                self.columns.len() - 1
            }
        }
    }

    pub fn cell(&self, row: usize, column: &str) -> Option<&str> {
        let index = self.column_index(column)?;
        self.rows.get(row)?.get(index)?.as_deref()
    }

    pub fn column_cells(&self, column: &str) -> Vec<Option<&str>> {
        match self.column_index(column) {
            Some(index) => self.rows.iter().map(|row| row[index].as_deref()).collect(),
            None => Vec::new(),
        }
    }

    /// Appends the rows of `other`, matching columns by name. Columns only
    /// `other` has are added.
    pub fn append(&mut self, other: Table) {
        let positions: Vec<usize> = other.columns.iter().map(|c| self.ensure_column(c)).collect();
        let width = self.columns.len();

        for row in other.rows {
            let mut out = vec![None; width];
            for (cell, &position) in row.into_iter().zip(&positions) {
                out[position] = cell;
            }
            self.rows.push(out);
        }
    }

    /// Rewrites a column as numbers, blanking anything that doesn't coerce.
    pub fn coerce_numeric_column(&mut self, column: &str) {
        if let Some(index) = self.column_index(column) {
            for row in self.rows.iter_mut() {
                let coerced = row[index]
                    .take()
                    .and_then(|cell| coerce_numeric(&Value::String(cell)))
                    .map(|v| v.to_string());
                row[index] = coerced;
            }
        }
    }

    /// Builds a table from JSON objects. Columns are the union of keys in
    /// first-seen order; non-object entries are skipped.
    pub fn from_records(records: &[Value]) -> Table {
        let mut table = Table::default();

        for record in records {
            let object = match record.as_object() {
                Some(o) => o,
                None => continue,
            };

            let mut row = vec![None; table.columns.len()];
            for (key, value) in object {
                let index = table.ensure_column(key);
                if index >= row.len() {
                    row.resize(index + 1, None);
                }
                row[index] = json_cell(value);
            }
            table.rows.push(row);
        }

        table
    }

    /// Reads delimited text with a header row. Short rows are padded with
    /// missing cells; a row wider than the header is an error.
    pub fn from_csv(text: &str, delimiter: u8) -> Result<Table> {
        let text = text.trim_start_matches('\u{feff}');
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .flexible(true)
            .from_reader(text.as_bytes());

        let columns: Vec<String> = reader.headers()?.iter().map(str::to_owned).collect();
        let mut table = Table::new(columns);
        let width = table.columns.len();

        for record in reader.records() {
            let record = record?;
            if record.len() > width {
                let line = record.position().map(|p| p.line()).unwrap_or_default();
                return Err(AcquisitionError::InvalidInput(format!(
                    "CSV line {}: expected {} fields, saw {}", line, width, record.len()
                )));
            }

            let mut row: Vec<Option<String>> = record
                .iter()
                .map(|cell| if cell.is_empty() { None } else { Some(cell.to_owned()) })
                .collect();
            row.resize(width, None);
            table.rows.push(row);
        }

        Ok(table)
    }

    pub fn write_csv<W: std::io::Write>(&self, writer: W, delimiter: u8) -> Result<()> {
        let mut writer = csv::WriterBuilder::new().delimiter(delimiter).from_writer(writer);

        if !self.columns.is_empty() {
            writer.write_record(&self.columns)?;
        }
        for row in &self.rows {
            writer.write_record(row.iter().map(|cell| cell.as_deref().unwrap_or("")))?;
        }
        writer.flush()?;

        Ok(())
    }

    /// Writes the table to `path`, creating parent directories as needed.
    pub fn write_csv_file(&self, path: &Path, delimiter: u8) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let file = fs::File::create(path)?;
        self.write_csv(std::io::BufWriter::new(file), delimiter)
    }
}

pub(crate) fn json_cell(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.to_owned()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        nested => Some(nested.to_string()),
    }
}

#[test]
fn test_from_records_unions_columns() {
    let records: Vec<Value> = serde_json::from_str(r#"[
        {"date": "2020", "value": 1.5, "indicator": {"id": "GDP", "value": "Gross"}},
        {"date": "2021", "value": null, "decimal": 1},
        "not a record"
    ]"#).unwrap();

    let table = Table::from_records(&records);

    assert_eq!(table.columns, vec!["date", "value", "indicator", "decimal"]);
    assert_eq!(table.rows.len(), 2);
    assert_eq!(table.rows[0].len(), 4);
    assert_eq!(table.cell(0, "value"), Some("1.5"));
    assert_eq!(table.cell(0, "indicator"), Some(r#"{"id":"GDP","value":"Gross"}"#));
    assert_eq!(table.cell(0, "decimal"), None);
    assert_eq!(table.cell(1, "value"), None);
    assert_eq!(table.cell(1, "decimal"), Some("1"));
}

#[test]
fn test_from_csv_semicolons_and_bom() {
    let text = "\u{feff}Periodo;Total;Nota\n2023M01;1,5;\n2023M02;\"2;0\"\n";
    let table = Table::from_csv(text, b';').unwrap();

    assert_eq!(table.columns, vec!["Periodo", "Total", "Nota"]);
    assert_eq!(table.rows.len(), 2);
    assert_eq!(table.cell(0, "Total"), Some("1,5"));
    assert_eq!(table.cell(0, "Nota"), None);
    assert_eq!(table.cell(1, "Total"), Some("2;0"));
    assert_eq!(table.rows[1].len(), 3);
}

#[test]
fn test_from_csv_rejects_rows_wider_than_header() {
    let result = Table::from_csv("a,b\n1,2\n1,2,3\n", b',');

    match result {
        Err(AcquisitionError::InvalidInput(message)) => {
            assert_eq!(message, "CSV line 3: expected 2 fields, saw 3");
        },
        other => panic!("unexpected result {:?}", other),
    }

    let table = Table::from_csv("a,b,c\n1\n", b',').unwrap();
    assert_eq!(table.rows[0], vec![Some("1".to_owned()), None, None]);
}

#[test]
fn test_write_csv_quotes_and_missing() {
    let mut table = Table::new(vec!["a".to_owned(), "b".to_owned()]);
    table.rows.push(vec![Some("x,y".to_owned()), None]);
    table.rows.push(vec![Some("say \"hi\"".to_owned()), Some("2".to_owned())]);

    let mut buffer = Vec::new();
    table.write_csv(&mut buffer, b',').unwrap();

    assert_eq!(String::from_utf8(buffer).unwrap(), "a,b\n\"x,y\",\n\"say \"\"hi\"\"\",2\n");
}

#[test]
fn test_append_matches_columns_by_name() {
    let mut first = Table::new(vec!["REF_AREA".to_owned(), "TIME_PERIOD".to_owned()]);
    first.rows.push(vec![Some("ES".to_owned()), Some("2020".to_owned())]);

    let mut second = Table::new(vec!["TIME_PERIOD".to_owned(), "UNIT_MULT".to_owned()]);
    second.rows.push(vec![Some("2021".to_owned()), Some("0".to_owned())]);

    first.append(second);

    assert_eq!(first.columns, vec!["REF_AREA", "TIME_PERIOD", "UNIT_MULT"]);
    assert_eq!(first.rows[0], vec![Some("ES".to_owned()), Some("2020".to_owned()), None]);
    assert_eq!(first.rows[1], vec![None, Some("2021".to_owned()), Some("0".to_owned())]);
}

#[test]
fn test_coerce_numeric_column() {
    let records: Vec<Value> = serde_json::from_str(r#"[{"value": "12.5"}, {"value": "n/a"}, {"value": 3}, {"value": true}]"#).unwrap();
    let mut table = Table::from_records(&records);
    table.coerce_numeric_column("value");

    // booleans are missing here just as they are in decoded JSON-stat values
    assert_eq!(table.column_cells("value"), vec![Some("12.5"), None, Some("3"), None]);
}

#[test]
fn test_write_csv_file_creates_directories() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("out.csv");

    let table = Table::new(vec!["value".to_owned()]);
    table.write_csv_file(&path, b',').unwrap();

    assert_eq!(fs::read_to_string(&path).unwrap(), "value\n");
}
