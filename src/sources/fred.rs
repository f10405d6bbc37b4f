// https://fred.stlouisfed.org/docs/api/fred/series_observations.html

use std::collections::HashSet;

use serde::Deserialize;
use serde_json::Value;
use tracing::info;

use super::{HttpOptions, Request};
use crate::config::Secrets;
use crate::error::{AcquisitionError, Result};
use crate::table::Table;

const OBSERVATIONS_URL: &str = "https://api.stlouisfed.org/fred/series/observations";
const GRAPH_URL: &str = "https://fred.stlouisfed.org/graph/fredgraph.csv";

lazy_static! {
    static ref UNITS: HashSet<&'static str> = [
        "lin", "chg", "ch1", "pch", "pc1", "pca", "cch", "cca", "log"
    ].iter().cloned().collect();

    static ref FREQUENCIES: HashSet<&'static str> = [
        "d", "w", "bw", "m", "q", "sa", "a",
        "wef", "weth", "wew", "wetu", "wem", "wesu", "wesa", "bwew", "bwem"
    ].iter().cloned().collect();

    static ref AGGREGATION_METHODS: HashSet<&'static str> = [
        "avg", "sum", "eop"
    ].iter().cloned().collect();
}

fn default_sort_order() -> String { "asc".to_owned() }

#[derive(Deserialize, Debug, Clone)]
pub struct FredQuery {
    pub series_id: String,                      // e.g. GDPC1
    pub observation_start: Option<String>,      // YYYY-MM-DD
    pub observation_end: Option<String>,
    pub realtime_start: Option<String>,
    pub realtime_end: Option<String>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
    #[serde(default = "default_sort_order")]
    pub sort_order: String,
    pub units: Option<String>,
    pub frequency: Option<String>,
    pub aggregation_method: Option<String>,
    pub output_type: Option<u8>,                // 1 to 4
    pub vintage_dates: Option<String>,
    pub description: Option<String>,
}

impl FredQuery {
    pub fn validate(&self) -> Result<()> {
        if let Some(units) = &self.units {
            if !UNITS.contains(units.as_str()) {
                return Err(AcquisitionError::InvalidInput(format!("Invalid FRED units: {}", units)));
            }
        }
        if let Some(frequency) = &self.frequency {
            if !FREQUENCIES.contains(frequency.as_str()) {
                return Err(AcquisitionError::InvalidInput(format!("Invalid FRED frequency: {}", frequency)));
            }
        }
        if let Some(method) = &self.aggregation_method {
            if !AGGREGATION_METHODS.contains(method.as_str()) {
                return Err(AcquisitionError::InvalidInput(format!("Invalid FRED aggregation method: {}", method)));
            }
        }
        if let Some(output_type) = self.output_type {
            if !(1..=4).contains(&output_type) {
                return Err(AcquisitionError::InvalidInput(format!("FRED output_type must be one of 1, 2, 3, 4; got {}", output_type)));
            }
        }
        Ok(())
    }

    pub fn request(&self, api_key: &str) -> Result<Request> {
        self.validate()?;

        let limit = self.limit.map(|v| v.to_string());
        let offset = self.offset.map(|v| v.to_string());
        let output_type = self.output_type.map(|v| v.to_string());

        Ok(Request::get(OBSERVATIONS_URL)
            .query("series_id", self.series_id.as_str())
            .secret_query("api_key", api_key)
            .query("file_type", "json")
            .optional_query("observation_start", self.observation_start.as_deref())
            .optional_query("observation_end", self.observation_end.as_deref())
            .optional_query("realtime_start", self.realtime_start.as_deref())
            .optional_query("realtime_end", self.realtime_end.as_deref())
            .optional_query("limit", limit.as_deref())
            .optional_query("offset", offset.as_deref())
            .optional_query("sort_order", Some(self.sort_order.as_str()))
            .optional_query("units", self.units.as_deref())
            .optional_query("frequency", self.frequency.as_deref())
            .optional_query("aggregation_method", self.aggregation_method.as_deref())
            .optional_query("output_type", output_type.as_deref())
            .optional_query("vintage_dates", self.vintage_dates.as_deref())
            .header("Accept", "application/json"))
    }

    pub fn fetch(&self, http: &HttpOptions, secrets: &Secrets) -> Result<Table> {
        let api_key = secrets.resolve("fred", "key", "FRED_API_KEY").ok_or_else(|| {
            AcquisitionError::Config("FRED needs an API key: set [fred] key in the secret config or FRED_API_KEY".to_owned())
        })?;

        let request = self.request(&api_key)?;
        let document = request.fetch_json(http)?;
        let table = parse(&document).ok_or_else(|| AcquisitionError::Payload {
            url: request.display_url(),
            message: "missing `observations`".to_owned(),
        })?;

        info!(series = %self.series_id, rows = table.rows.len(), "fetched FRED observations");
        Ok(table)
    }
}

pub fn parse(document: &Value) -> Option<Table> {
    document
        .get("observations")
        .and_then(Value::as_array)
        .map(|records| Table::from_records(records))
}

/// A saved fredgraph chart, downloaded as CSV. No API key needed.
#[derive(Deserialize, Debug, Clone)]
pub struct FredGraphQuery {
    pub graph_id: String,       // e.g. 1wmdD
    pub description: Option<String>,
}

impl FredGraphQuery {
    pub fn request(&self) -> Request {
        Request::get(GRAPH_URL)
            .query("g", self.graph_id.as_str())
            .header("Accept", "text/csv")
    }

    pub fn fetch(&self, http: &HttpOptions) -> Result<Table> {
        let body = self.request().fetch_text(http)?;
        let table = Table::from_csv(&body, b',')?;

        info!(graph = %self.graph_id, rows = table.rows.len(), "fetched fredgraph CSV");
        Ok(table)
    }
}

#[cfg(test)]
fn gdp_query() -> FredQuery {
    toml::from_str(r#"
        series_id = "GDPC1"
        observation_start = "2000-01-01"
    "#).unwrap()
}

#[test]
fn test_request() {
    let request = gdp_query().request("secret").unwrap();

    assert_eq!(
        request.url(),
        "https://api.stlouisfed.org/fred/series/observations\
         ?series_id=GDPC1&api_key=secret&file_type=json&observation_start=2000-01-01&sort_order=asc"
    );
    assert!(!request.display_url().contains("secret"));
}

#[test]
fn test_request_optional_numbers() {
    let mut query = gdp_query();
    query.limit = Some(10);
    query.output_type = Some(2);
    query.units = Some("pch".to_owned());

    let request = query.request("k").unwrap();
    assert!(request.query.contains(&("limit".to_owned(), "10".to_owned())));
    assert!(request.query.contains(&("output_type".to_owned(), "2".to_owned())));
    assert!(request.query.contains(&("units".to_owned(), "pch".to_owned())));
}

#[test]
fn test_validation() {
    let mut query = gdp_query();
    query.units = Some("percent".to_owned());
    assert!(matches!(query.validate(), Err(AcquisitionError::InvalidInput(_))));

    let mut query = gdp_query();
    query.frequency = Some("hourly".to_owned());
    assert!(query.validate().is_err());

    let mut query = gdp_query();
    query.aggregation_method = Some("median".to_owned());
    assert!(query.validate().is_err());

    let mut query = gdp_query();
    query.output_type = Some(5);
    assert!(query.request("k").is_err());

    let mut query = gdp_query();
    query.frequency = Some("wesu".to_owned());
    query.aggregation_method = Some("eop".to_owned());
    assert!(query.validate().is_ok());
}

#[test]
fn test_missing_api_key() {
    std::env::remove_var("FRED_API_KEY");
    let http = HttpOptions { connect_timeout: 1, receive_timeout: 1 };

    let result = gdp_query().fetch(&http, &Secrets::default());
    assert!(matches!(result, Err(AcquisitionError::Config(_))));
}

#[test]
fn test_parse_observations() {
    let document = serde_json::json!({
        "realtime_start": "2024-01-01",
        "observations": [
            {"realtime_start": "2024-01-01", "realtime_end": "2024-01-01", "date": "2000-01-01", "value": "13878.147"},
            {"realtime_start": "2024-01-01", "realtime_end": "2024-01-01", "date": "2000-04-01", "value": "."}
        ]
    });

    let table = parse(&document).unwrap();
    assert_eq!(table.columns, vec!["realtime_start", "realtime_end", "date", "value"]);
    assert_eq!(table.cell(1, "value"), Some("."));

    assert!(parse(&serde_json::json!({"error_code": 400})).is_none());
}

#[test]
fn test_graph_request() {
    let query = FredGraphQuery { graph_id: "1wmdD".to_owned(), description: None };
    assert_eq!(query.request().url(), "https://fred.stlouisfed.org/graph/fredgraph.csv?g=1wmdD");
}
