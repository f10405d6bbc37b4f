// Red Eléctrica e·sios indicators API

use chrono::{Local, NaiveDate};
use serde::Deserialize;
use serde_json::Value;
use tracing::info;

use super::{HttpOptions, Request};
use crate::config::Secrets;
use crate::error::{AcquisitionError, Result};
use crate::table::Table;

const API_ROOT: &str = "https://api.esios.ree.es/indicators";

fn default_language() -> String { "es".to_owned() }

#[derive(Deserialize, Debug, Clone)]
pub struct EsiosQuery {
    pub indicator: u32,                 // e.g. 1001
    pub date: Option<NaiveDate>,        // whole day in UTC; today when absent
    #[serde(default = "default_language")]
    pub language: String,
    pub description: Option<String>,
}

impl EsiosQuery {
    pub fn request(&self, token: &str, today: NaiveDate) -> Request {
        let day = self.date.unwrap_or(today).format("%Y-%m-%d");

        Request::get(format!("{}/{}", API_ROOT, self.indicator))
            .query("start_date", format!("{}T00:00:00Z", day))
            .query("end_date", format!("{}T23:59:59Z", day))
            .header("x-api-key", token)
            .header("Accept", "application/json")
            .header("Accept-Language", self.language.as_str())
            .header("Content-Type", "application/json")
    }

    pub fn fetch(&self, http: &HttpOptions, secrets: &Secrets) -> Result<Table> {
        let token = secrets.resolve("esios", "token", "ESIOS_TOKEN").ok_or_else(|| {
            AcquisitionError::Config("e·sios needs a token: set [esios] token in the secret config or ESIOS_TOKEN".to_owned())
        })?;

        let today = Local::now().naive_local().date();
        let request = self.request(&token, today);
        let document = request.fetch_json(http)?;
        let table = parse(&document).ok_or_else(|| AcquisitionError::Payload {
            url: request.display_url(),
            message: "no `indicator.values` found".to_owned(),
        })?;

        info!(indicator = self.indicator, rows = table.rows.len(), "fetched e·sios indicator");
        Ok(table)
    }
}

/// Values usually sit under `indicator.values`; some answers put them at the top level.
pub fn parse(document: &Value) -> Option<Table> {
    let values = document
        .get("indicator")
        .and_then(|i| i.get("values"))
        .filter(|v| !v.is_null())
        .or_else(|| document.get("values").filter(|v| !v.is_null()))?;

    let mut table = Table::from_records(values.as_array()?);
    table.coerce_numeric_column("value");
    Some(table)
}

#[test]
fn test_request_for_today() {
    let query: EsiosQuery = toml::from_str("indicator = 1001").unwrap();
    let today = NaiveDate::from_ymd_opt(2024, 3, 5).unwrap();
    let request = query.request("token", today);

    assert_eq!(
        request.url(),
        "https://api.esios.ree.es/indicators/1001?start_date=2024-03-05T00%3A00%3A00Z&end_date=2024-03-05T23%3A59%3A59Z"
    );
    assert_eq!(request.header_value("x-api-key"), Some("token"));
    assert_eq!(request.header_value("Accept-Language"), Some("es"));
}

#[test]
fn test_request_for_configured_date() {
    let query: EsiosQuery = toml::from_str(r#"
        indicator = 600
        date = "2023-12-31"
    "#).unwrap();
    let request = query.request("token", NaiveDate::from_ymd_opt(2024, 3, 5).unwrap());

    assert_eq!(request.query[0].1, "2023-12-31T00:00:00Z");
}

#[test]
fn test_parse_values() {
    let document = serde_json::json!({
        "indicator": {
            "name": "Término de facturación de energía activa del PVPC 2.0TD",
            "values": [
                {"value": 133.4, "datetime": "2024-03-05T00:00:00.000+01:00", "geo_id": 8741},
                {"value": "n/d", "datetime": "2024-03-05T01:00:00.000+01:00", "geo_id": 8741}
            ]
        }
    });

    let table = parse(&document).unwrap();
    assert_eq!(table.column_cells("value"), vec![Some("133.4"), None]);
    assert_eq!(table.cell(0, "geo_id"), Some("8741"));
}

#[test]
fn test_parse_top_level_values_and_missing() {
    let document = serde_json::json!({"values": [{"value": 1}]});
    assert_eq!(parse(&document).unwrap().rows.len(), 1);

    assert!(parse(&serde_json::json!({"indicator": {"name": "x"}})).is_none());
}

#[test]
fn test_missing_token() {
    std::env::remove_var("ESIOS_TOKEN");
    let query: EsiosQuery = toml::from_str("indicator = 1001").unwrap();
    let http = HttpOptions { connect_timeout: 1, receive_timeout: 1 };

    assert!(matches!(query.fetch(&http, &Secrets::default()), Err(AcquisitionError::Config(_))));
}
