// SDMX REST data endpoint of the OECD Data Explorer

use serde::Deserialize;
use tracing::info;

use super::{HttpOptions, Request};
use crate::error::Result;
use crate::table::Table;

const API_ROOT: &str = "https://sdmx.oecd.org/public/rest/data";

#[derive(Deserialize, Debug, Clone)]
pub struct OecdQuery {
    pub agency: String,                 // e.g. OECD.ECO.MAD
    pub dataset: String,                // e.g. DSD_EO@DF_EO
    pub selection: String,              // e.g. FRA+DEU.PDTY.A
    #[serde(default)]
    pub version: String,                // empty means latest
    pub start_period: Option<String>,
    pub end_period: Option<String>,
    pub dimension_at_observation: Option<String>,
    pub description: Option<String>,
}

impl OecdQuery {
    pub fn request(&self) -> Request {
        let identifier = format!("{},{},{}", self.agency, self.dataset, self.version);

        Request::get(format!("{}/{}/{}", API_ROOT, identifier, self.selection))
            .optional_query("startPeriod", self.start_period.as_deref())
            .optional_query("endPeriod", self.end_period.as_deref())
            .optional_query("dimensionAtObservation", self.dimension_at_observation.as_deref())
            .header("Accept", "text/csv")
    }

    pub fn fetch(&self, http: &HttpOptions) -> Result<Table> {
        let body = self.request().fetch_text(http)?;
        let table = Table::from_csv(&body, b',')?;

        info!(agency = %self.agency, dataset = %self.dataset, rows = table.rows.len(), "fetched OECD data");
        Ok(table)
    }
}

#[test]
fn test_request() {
    let query: OecdQuery = toml::from_str(r#"
        agency = "OECD.ECO.MAD"
        dataset = "DSD_EO@DF_EO"
        selection = "FRA+DEU.PDTY.A"
        start_period = "1965"
        end_period = "2023"
        dimension_at_observation = "AllDimensions"
    "#).unwrap();

    assert_eq!(
        query.request().url(),
        "https://sdmx.oecd.org/public/rest/data/OECD.ECO.MAD,DSD_EO@DF_EO,/FRA+DEU.PDTY.A\
         ?startPeriod=1965&endPeriod=2023&dimensionAtObservation=AllDimensions"
    );
}

#[test]
fn test_request_without_periods() {
    let query: OecdQuery = toml::from_str(r#"
        agency = "OECD.SDD.TPS"
        dataset = "DSD_PRICES@DF_PRICES_ALL"
        selection = "ESP.M.N.CPI.PA._T.N.GY"
        version = "1.0"
    "#).unwrap();

    let request = query.request();
    assert!(request.query.is_empty());
    assert_eq!(request.base, "https://sdmx.oecd.org/public/rest/data/OECD.SDD.TPS,DSD_PRICES@DF_PRICES_ALL,1.0/ESP.M.N.CPI.PA._T.N.GY");
}
