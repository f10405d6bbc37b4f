// IMF SDMX-JSON CompactData service

use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{info, warn};

use super::{encode, HttpOptions, Request};
use crate::error::{AcquisitionError, Result};
use crate::jsonstat::coerce_numeric;
use crate::table::{json_cell, Table};

const API_ROOT: &str = "https://dataservices.imf.org/REST/SDMX_JSON.svc";

#[derive(Deserialize, Debug, Clone)]
pub struct ImfQuery {
    pub dataset: String,                // e.g. IFS
    pub key: String,                    // usually FREQ.COUNTRY.INDICATOR, e.g. M.ES.PCPI_IX
    pub start_period: Option<String>,
    pub end_period: Option<String>,
    pub description: Option<String>,
}

impl ImfQuery {
    pub fn request(&self) -> Result<Request> {
        if self.dataset.is_empty() {
            return Err(AcquisitionError::InvalidInput("IMF queries need a dataset (e.g. IFS)".to_owned()));
        }
        if self.key.is_empty() {
            return Err(AcquisitionError::InvalidInput("IMF queries need a series key (e.g. M.ES.PCPI_IX)".to_owned()));
        }

        Ok(Request::get(format!("{}/CompactData/{}/{}", API_ROOT, self.dataset, encode(&self.key)))
            .optional_query("startPeriod", self.start_period.as_deref())
            .optional_query("endPeriod", self.end_period.as_deref())
            .header("Accept", "application/json"))
    }

    pub fn fetch(&self, http: &HttpOptions) -> Result<Table> {
        let document = self.request()?.fetch_json(http)?;
        let table = parse(&document);

        if table.is_empty() {
            warn!(dataset = %self.dataset, key = %self.key, "IMF response holds no observations");
        } else {
            info!(dataset = %self.dataset, key = %self.key, rows = table.rows.len(), "fetched IMF series");
        }
        Ok(table)
    }
}

/// `Series` and `Obs` are each either a single object or a list of them.
fn one_or_many(value: &Value) -> Vec<&Value> {
    match value {
        Value::Array(items) => items.iter().collect(),
        Value::Object(_) => vec![value],
        _ => Vec::new(),
    }
}

fn observations(series: &Map<String, Value>) -> Vec<(String, Option<String>)> {
    let raw = match series.get("Obs") {
        Some(raw) => raw,
        None => return Vec::new(),
    };

    one_or_many(raw)
        .into_iter()
        .filter_map(Value::as_object)
        .filter_map(|obs| {
            let period = obs.get("@TIME_PERIOD").and_then(json_cell)?;
            let value = obs.get("@OBS_VALUE").and_then(coerce_numeric).map(|v| v.to_string());
            Some((period, value))
        })
        .collect()
}

/// Series attributes (the `@`-prefixed keys) become columns repeated for
/// every observation, followed by `TIME_PERIOD` and `OBS_VALUE`.
fn series_table(series: &Map<String, Value>) -> Option<Table> {
    let observations = observations(series);
    if observations.is_empty() {
        return None;
    }

    let attributes: Vec<(&str, Option<String>)> = series
        .iter()
        .filter(|(name, _)| name.starts_with('@'))
        .map(|(name, value)| (&name[1..], json_cell(value)))
        .collect();

    let mut columns: Vec<String> = attributes.iter().map(|(name, _)| name.to_string()).collect();
    columns.push("TIME_PERIOD".to_owned());
    columns.push("OBS_VALUE".to_owned());

    let mut table = Table::new(columns);
    for (period, value) in observations {
        let mut row: Vec<Option<String>> = attributes.iter().map(|(_, v)| v.clone()).collect();
        row.push(Some(period));
        row.push(value);
        table.rows.push(row);
    }

    Some(table)
}

pub fn parse(document: &Value) -> Table {
    let series = document
        .get("CompactData")
        .and_then(|c| c.get("DataSet"))
        .and_then(|d| d.get("Series"));

    let mut table = Table::default();
    if let Some(series) = series {
        for entry in one_or_many(series).into_iter().filter_map(Value::as_object) {
            if let Some(part) = series_table(entry) {
                table.append(part);
            }
        }
    }

    table
}

#[test]
fn test_request_encodes_key() {
    let query = ImfQuery {
        dataset: "IFS".to_owned(),
        key: "M.ES+FR.PCPI_IX".to_owned(),
        start_period: Some("2018".to_owned()),
        end_period: None,
        description: None,
    };

    assert_eq!(
        query.request().unwrap().url(),
        "https://dataservices.imf.org/REST/SDMX_JSON.svc/CompactData/IFS/M.ES%2BFR.PCPI_IX?startPeriod=2018"
    );
}

#[test]
fn test_request_needs_dataset_and_key() {
    let mut query = ImfQuery {
        dataset: String::new(),
        key: "M.ES.PCPI_IX".to_owned(),
        start_period: None,
        end_period: None,
        description: None,
    };
    assert!(query.request().is_err());

    query.dataset = "IFS".to_owned();
    query.key = String::new();
    assert!(query.request().is_err());
}

#[test]
fn test_parse_series_list() {
    let document = serde_json::json!({
        "CompactData": {"DataSet": {"Series": [
            {
                "@FREQ": "M", "@REF_AREA": "ES", "@INDICATOR": "PCPI_IX",
                "Obs": [
                    {"@TIME_PERIOD": "2020-01", "@OBS_VALUE": "104.3"},
                    {"@TIME_PERIOD": "2020-02", "@OBS_VALUE": "NaN"},
                    {"@OBS_VALUE": "1"}
                ]
            },
            {
                "@FREQ": "M", "@REF_AREA": "FR", "@UNIT_MULT": "0",
                "Obs": {"@TIME_PERIOD": "2020-01", "@OBS_VALUE": "105"}
            },
            {"@FREQ": "M", "@REF_AREA": "PT"}
        ]}}
    });

    let table = parse(&document);

    assert_eq!(table.columns, vec!["FREQ", "REF_AREA", "INDICATOR", "TIME_PERIOD", "OBS_VALUE", "UNIT_MULT"]);
    assert_eq!(table.rows.len(), 3);
    assert_eq!(table.cell(0, "OBS_VALUE"), Some("104.3"));
    assert_eq!(table.cell(1, "OBS_VALUE"), None);
    assert_eq!(table.cell(2, "REF_AREA"), Some("FR"));
    assert_eq!(table.cell(2, "INDICATOR"), None);
    assert_eq!(table.cell(2, "UNIT_MULT"), Some("0"));
    assert_eq!(table.cell(2, "OBS_VALUE"), Some("105"));
}

#[test]
fn test_parse_without_dataset() {
    assert!(parse(&serde_json::json!({"CompactData": {}})).is_empty());
    assert!(parse(&serde_json::json!({"CompactData": {"DataSet": {"Series": null}}})).is_empty());
}
