// Eurostat COMEXT statistics API, answers in JSON-stat

use serde::Deserialize;
use serde_json::Value;
use tracing::info;

use super::{Filters, HttpOptions, Request};
use crate::error::{AcquisitionError, Result};
use crate::jsonstat::Dataset;
use crate::table::Table;

const API_ROOT: &str = "https://ec.europa.eu/eurostat/api/comext/dissemination/statistics/1.0/data";

#[derive(Deserialize, Debug, Clone)]
pub struct ComextQuery {
    pub dataset: String,      // e.g. DS-059341
    pub filters: Filters,     // dimension -> codes, each code sent as its own parameter
    pub description: Option<String>,
}

impl ComextQuery {
    pub fn request(&self) -> Result<Request> {
        if self.filters.is_empty() {
            return Err(AcquisitionError::InvalidInput("COMEXT queries need at least one dimension filter".to_owned()));
        }

        let mut request = Request::get(format!("{}/{}", API_ROOT, self.dataset))
            .header("Accept", "application/json");

        for (dimension, values) in &self.filters {
            for value in values.values() {
                request = request.query(dimension.as_str(), value);
            }
        }

        Ok(request)
    }

    pub fn fetch(&self, http: &HttpOptions) -> Result<Table> {
        let request = self.request()?;
        let document = request.fetch_json(http)?;
        let table = parse(document)?;

        info!(dataset = %self.dataset, rows = table.rows.len(), "decoded COMEXT dataset");
        Ok(table)
    }
}

pub fn parse(document: Value) -> Result<Table> {
    let dataset: Dataset = serde_json::from_value(document)?;
    Ok(Table::from(dataset.decode()?))
}

#[test]
fn test_request_repeats_parameters() {
    let query: ComextQuery = toml::from_str(r#"
        dataset = "DS-059341"
        [filters]
        reporter = "ES"
        product = ["1509", "8703"]
        time = ["2019", "2020"]
    "#).unwrap();

    let request = query.request().unwrap();

    assert_eq!(
        request.url(),
        "https://ec.europa.eu/eurostat/api/comext/dissemination/statistics/1.0/data/DS-059341\
         ?product=1509&product=8703&reporter=ES&time=2019&time=2020"
    );
    assert_eq!(request.header_value("accept"), Some("application/json"));
}

#[test]
fn test_request_needs_filters() {
    let query: ComextQuery = toml::from_str(r#"
        dataset = "DS-059341"
        [filters]
    "#).unwrap();

    assert!(matches!(query.request(), Err(AcquisitionError::InvalidInput(_))));
}

#[test]
fn test_parse_labeled_table() {
    let document = serde_json::json!({
        "id": ["flow", "geo"],
        "size": [2, 3],
        "value": {"4": "10.5", "1": ":"},
        "dimension": {
            "flow": {"category": {"index": {"1": 0, "2": 1}, "label": {"1": "IMPORT"}}},
            "geo": {"category": {"index": {"ES": 0, "FR": 1, "IT": 2}, "label": {"FR": "France"}}}
        }
    });

    let table = parse(document).unwrap();

    assert_eq!(table.columns, vec!["value", "flow", "flow_label", "geo", "geo_label"]);
    assert_eq!(
        table.rows[0],
        vec![Some("10.5".to_owned()), Some("2".to_owned()), None, Some("FR".to_owned()), Some("France".to_owned())]
    );
    assert_eq!(
        table.rows[1],
        vec![None, Some("1".to_owned()), Some("IMPORT".to_owned()), Some("FR".to_owned()), Some("France".to_owned())]
    );
}

#[test]
fn test_parse_empty_response() {
    let table = parse(serde_json::json!({"id": ["flow"], "size": [2], "value": {}})).unwrap();
    assert!(table.is_empty());
    assert_eq!(table.columns, vec!["value", "flow", "flow_label"]);
}
