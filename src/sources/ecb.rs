// https://data.ecb.europa.eu/help/api/data

use serde::Deserialize;
use tracing::info;

use super::{HttpOptions, Request};
use crate::error::{AcquisitionError, Result};
use crate::table::Table;

const API_ROOT: &str = "https://data-api.ecb.europa.eu/service/data";

#[derive(Deserialize, Debug, Clone)]
pub struct EcbQuery {
    pub dataset: String,     // e.g. BSI
    pub series_key: String,  // dimensions joined with '.', e.g. M.U2.Y.V.M30.X.I.U2.2300.Z01.A
    pub description: Option<String>,
}

impl EcbQuery {
    pub fn request(&self) -> Result<Request> {
        if self.dataset.is_empty() || self.series_key.is_empty() {
            return Err(AcquisitionError::InvalidInput("ECB queries need both a dataset and a series key".to_owned()));
        }

        Ok(Request::get(format!("{}/{}/{}", API_ROOT, self.dataset, self.series_key))
            .query("format", "csvdata")
            .header("Accept", "text/csv"))
    }

    pub fn fetch(&self, http: &HttpOptions) -> Result<Table> {
        let body = self.request()?.fetch_text(http)?;
        let table = Table::from_csv(&body, b',')?;

        info!(dataset = %self.dataset, series = %self.series_key, rows = table.rows.len(), "fetched ECB series");
        Ok(table)
    }
}

#[test]
fn test_request() {
    let query = EcbQuery {
        dataset: "BSI".to_owned(),
        series_key: "M.U2.Y.V.M30.X.I.U2.2300.Z01.A".to_owned(),
        description: None,
    };

    let request = query.request().unwrap();
    assert_eq!(request.url(), "https://data-api.ecb.europa.eu/service/data/BSI/M.U2.Y.V.M30.X.I.U2.2300.Z01.A?format=csvdata");
    assert_eq!(request.header_value("Accept"), Some("text/csv"));
}

#[test]
fn test_request_needs_series_key() {
    let query = EcbQuery { dataset: "BSI".to_owned(), series_key: String::new(), description: None };
    assert!(query.request().is_err());
}
