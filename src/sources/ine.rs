// INE (Spain) JAXI-T3 table downloads

use serde::Deserialize;
use tracing::info;

use super::{Acquisition, HttpOptions, Request};
use crate::error::Result;
use crate::table::Table;

const API_ROOT: &str = "https://www.ine.es/jaxiT3/files";

// INE serves and expects ';' separated files
const DELIMITER: u8 = b';';

fn default_nocab() -> String { "1".to_owned() }
fn default_directory() -> String { "t".to_owned() }
fn default_locale() -> String { "es".to_owned() }
fn default_variant() -> String { "csv_bdsc".to_owned() }

#[derive(Deserialize, Debug, Clone)]
pub struct IneQuery {
    pub table_id: String,                       // e.g. 67821
    #[serde(default = "default_nocab")]
    pub nocab: String,                          // "1" drops the extra header block
    #[serde(default = "default_directory")]
    pub directory: String,
    #[serde(default = "default_locale")]
    pub locale: String,
    #[serde(default = "default_variant")]
    pub variant: String,
    pub description: Option<String>,
}

impl IneQuery {
    pub fn request(&self) -> Request {
        Request::get(format!("{}/{}/{}/{}/{}.csv", API_ROOT, self.directory, self.locale, self.variant, self.table_id))
            .query("nocab", self.nocab.as_str())
            .header("Accept", "text/csv")
    }

    pub fn fetch(&self, http: &HttpOptions) -> Result<Acquisition> {
        let body = self.request().fetch_text(http)?;
        let table = Table::from_csv(&body, DELIMITER)?;

        info!(table = %self.table_id, rows = table.rows.len(), "fetched INE table");
        Ok(Acquisition {
            table,
            delimiter: DELIMITER,
            metadata: None,
        })
    }
}

#[test]
fn test_request_defaults() {
    let query: IneQuery = toml::from_str(r#"table_id = "67821""#).unwrap();

    assert_eq!(query.request().url(), "https://www.ine.es/jaxiT3/files/t/es/csv_bdsc/67821.csv?nocab=1");
}

#[test]
fn test_request_english() {
    let query: IneQuery = toml::from_str(r#"
        table_id = "50902"
        locale = "en"
        nocab = "0"
    "#).unwrap();

    assert_eq!(query.request().url(), "https://www.ine.es/jaxiT3/files/t/en/csv_bdsc/50902.csv?nocab=0");
}

#[test]
fn test_parse_body_keeps_text() {
    let body = "\u{feff}Total Nacional;Índices y tasas;Periodo;Total\nTotal Nacional;Índice;2024M01;112,345\n";
    let table = Table::from_csv(body, DELIMITER).unwrap();

    assert_eq!(table.columns[0], "Total Nacional");
    assert_eq!(table.cell(0, "Total"), Some("112,345"));
}
