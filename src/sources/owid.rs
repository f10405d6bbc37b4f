// Our World in Data grapher downloads

use serde::Deserialize;
use tracing::info;

use super::{Acquisition, HttpOptions, Request};
use crate::error::Result;
use crate::table::Table;

const API_ROOT: &str = "https://ourworldindata.org/grapher";

// OWID asks scripted downloads to identify themselves this way
const OWID_USER_AGENT: &str = "Our World In Data data fetch/1.0";

#[derive(Deserialize, Debug, Clone)]
pub struct OwidQuery {
    pub chart: String,                  // grapher slug, e.g. labor-productivity-per-hour-pennworldtable
    #[serde(default = "default_metadata")]
    pub metadata: bool,                 // also fetch <chart>.metadata.json
    pub description: Option<String>,
}

fn default_metadata() -> bool { true }

impl OwidQuery {
    fn request(&self, extension: &str) -> Request {
        Request::get(format!("{}/{}.{}", API_ROOT, self.chart, extension))
            .query("v", "1")
            .query("csvType", "full")
            .query("useColumnShortNames", "true")
            .header("User-Agent", OWID_USER_AGENT)
    }

    pub fn data_request(&self) -> Request {
        self.request("csv")
    }

    pub fn metadata_request(&self) -> Request {
        self.request("metadata.json")
    }

    pub fn fetch(&self, http: &HttpOptions) -> Result<Acquisition> {
        let body = self.data_request().fetch_text(http)?;
        let table = Table::from_csv(&body, b',')?;

        let metadata = if self.metadata {
            Some(self.metadata_request().fetch_json(http)?)
        } else {
            None
        };

        info!(chart = %self.chart, rows = table.rows.len(), "fetched OWID chart");
        Ok(Acquisition {
            table,
            delimiter: b',',
            metadata,
        })
    }
}

#[test]
fn test_requests() {
    let query: OwidQuery = toml::from_str(r#"chart = "labor-productivity-per-hour-pennworldtable""#).unwrap();

    assert!(query.metadata);
    assert_eq!(
        query.data_request().url(),
        "https://ourworldindata.org/grapher/labor-productivity-per-hour-pennworldtable.csv?v=1&csvType=full&useColumnShortNames=true"
    );
    assert_eq!(
        query.metadata_request().base,
        "https://ourworldindata.org/grapher/labor-productivity-per-hour-pennworldtable.metadata.json"
    );
    assert_eq!(query.data_request().header_value("user-agent"), Some(OWID_USER_AGENT));
}
