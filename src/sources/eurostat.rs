// Eurostat SDMX 3.0 dissemination API, CSV flavour

use serde::Deserialize;
use tracing::info;

use super::{Filters, HttpOptions, Request};
use crate::error::Result;
use crate::table::Table;

const API_ROOT: &str = "https://ec.europa.eu/eurostat/api/dissemination/sdmx/3.0/data/dataflow";

fn default_agency() -> String { "ESTAT".to_owned() }
fn default_version() -> String { "1.0".to_owned() }
fn default_lang() -> String { "en".to_owned() }
fn default_labels() -> String { "name".to_owned() }

#[derive(Deserialize, Debug, Clone)]
pub struct EurostatQuery {
    pub dataset: String,                        // e.g. nama_10_a64
    #[serde(default)]
    pub filters: Filters,                       // sent as c[dimension]=code1,code2
    #[serde(default = "default_agency")]
    pub agency: String,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default = "default_lang")]
    pub lang: String,
    #[serde(default = "default_labels")]
    pub labels: String,                         // "id", "name" or "both"
    pub description: Option<String>,
}

impl EurostatQuery {
    pub fn request(&self) -> Request {
        let mut request = Request::get(format!("{}/{}/{}/{}/", API_ROOT, self.agency, self.dataset, self.version))
            .header("Accept", "application/vnd.sdmx.data+csv; version=2.0.0");

        for (dimension, values) in &self.filters {
            request = request.query(format!("c[{}]", dimension), values.values().join(","));
        }

        request
            .query("compress", "false")
            .query("format", "csvdata")
            .query("formatVersion", "2.0")
            .query("lang", self.lang.as_str())
            .query("labels", self.labels.as_str())
    }

    pub fn fetch(&self, http: &HttpOptions) -> Result<Table> {
        let body = self.request().fetch_text(http)?;
        let table = Table::from_csv(&body, b',')?;

        info!(dataset = %self.dataset, rows = table.rows.len(), "fetched Eurostat dataset");
        Ok(table)
    }
}

#[test]
fn test_request() {
    let query: EurostatQuery = toml::from_str(r#"
        dataset = "nama_10_a64"
        [filters]
        geo = ["IT"]
        na_item = ["B1G"]
        unit = "CLV20_MEUR"
        TIME_PERIOD = "ge:1995"
    "#).unwrap();

    let request = query.request();

    assert_eq!(request.base, "https://ec.europa.eu/eurostat/api/dissemination/sdmx/3.0/data/dataflow/ESTAT/nama_10_a64/1.0/");
    let query: Vec<(&str, &str)> = request.query.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
    assert_eq!(query, vec![
        ("c[TIME_PERIOD]", "ge:1995"),
        ("c[geo]", "IT"),
        ("c[na_item]", "B1G"),
        ("c[unit]", "CLV20_MEUR"),
        ("compress", "false"),
        ("format", "csvdata"),
        ("formatVersion", "2.0"),
        ("lang", "en"),
        ("labels", "name"),
    ]);
    assert_eq!(request.header_value("Accept"), Some("application/vnd.sdmx.data+csv; version=2.0.0"));
}

#[test]
fn test_multiple_codes_join_with_commas() {
    let query: EurostatQuery = toml::from_str(r#"
        dataset = "prc_hicp_manr"
        lang = "fr"
        [filters]
        geo = ["ES", "PT"]
    "#).unwrap();

    let request = query.request();
    assert_eq!(request.query[0], ("c[geo]".to_owned(), "ES,PT".to_owned()));
    assert!(request.query.contains(&("lang".to_owned(), "fr".to_owned())));
}

#[test]
fn test_parse_sdmx_csv() {
    let body = "STRUCTURE,STRUCTURE_ID,freq,unit,geo,TIME_PERIOD,OBS_VALUE,OBS_FLAG\n\
                dataflow,ESTAT:NAMA_10_A64(1.0),Annual,\"Chain linked volumes (2020), million euro\",Italy,1995,1400.5,\n";
    let table = Table::from_csv(body, b',').unwrap();

    assert_eq!(table.cell(0, "unit"), Some("Chain linked volumes (2020), million euro"));
    assert_eq!(table.cell(0, "OBS_VALUE"), Some("1400.5"));
    assert_eq!(table.cell(0, "OBS_FLAG"), None);
}
