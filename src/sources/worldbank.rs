// World Bank Indicators API v2

use serde::Deserialize;
use serde_json::Value;
use tracing::info;

use super::{HttpOptions, Request};
use crate::error::{AcquisitionError, Result};
use crate::table::Table;

const API_ROOT: &str = "https://api.worldbank.org/v2";

fn default_per_page() -> u32 { 20000 }

#[derive(Deserialize, Debug, Clone)]
pub struct WorldBankQuery {
    pub country: String,        // ISO3, several joined with ';'
    pub indicator: String,      // e.g. NY.GDP.MKTP.KD.ZG
    pub date: Option<String>,   // e.g. 2000:2023
    #[serde(default = "default_per_page")]
    pub per_page: u32,
    pub description: Option<String>,
}

impl WorldBankQuery {
    pub fn request(&self) -> Request {
        Request::get(format!("{}/country/{}/indicator/{}", API_ROOT, self.country, self.indicator))
            .query("format", "json")
            .query("per_page", self.per_page.to_string())
            .optional_query("date", self.date.as_deref())
            .header("Accept", "application/json")
    }

    pub fn fetch(&self, http: &HttpOptions) -> Result<Table> {
        let request = self.request();
        let document = request.fetch_json(http)?;
        let table = parse(&document).map_err(|message| AcquisitionError::Payload {
            url: request.display_url(),
            message,
        })?;

        info!(country = %self.country, indicator = %self.indicator, rows = table.rows.len(), "fetched World Bank indicator");
        Ok(table)
    }
}

/// The body is `[paging metadata, records]`.
pub fn parse(document: &Value) -> std::result::Result<Table, String> {
    match document.as_array().and_then(|parts| parts.get(1)) {
        Some(Value::Array(records)) => Ok(Table::from_records(records)),
        _ => Err("no data array present; expected [metadata, records]".to_owned()),
    }
}

#[test]
fn test_request() {
    let query: WorldBankQuery = toml::from_str(r#"
        country = "ESP"
        indicator = "NY.GDP.MKTP.KD.ZG"
        date = "2000:2023"
    "#).unwrap();

    assert_eq!(
        query.request().url(),
        "https://api.worldbank.org/v2/country/ESP/indicator/NY.GDP.MKTP.KD.ZG?format=json&per_page=20000&date=2000%3A2023"
    );
}

#[test]
fn test_parse_records() {
    let document = serde_json::json!([
        {"page": 1, "pages": 1, "per_page": 20000, "total": 2},
        [
            {"indicator": {"id": "NY.GDP.MKTP.KD.ZG", "value": "GDP growth (annual %)"}, "countryiso3code": "ESP", "date": "2023", "value": 2.5, "decimal": 1},
            {"indicator": {"id": "NY.GDP.MKTP.KD.ZG", "value": "GDP growth (annual %)"}, "countryiso3code": "ESP", "date": "2022", "value": null, "decimal": 1}
        ]
    ]);

    let table = parse(&document).unwrap();
    assert_eq!(table.columns, vec!["indicator", "countryiso3code", "date", "value", "decimal"]);
    assert_eq!(table.cell(0, "value"), Some("2.5"));
    assert_eq!(table.cell(1, "value"), None);
}

#[test]
fn test_parse_error_message() {
    // what the API answers for an unknown indicator
    let document = serde_json::json!([{"message": [{"id": "120", "key": "Invalid value"}]}]);
    assert!(parse(&document).is_err());

    let document = serde_json::json!([{"page": 0}, null]);
    assert!(parse(&document).is_err());
}
