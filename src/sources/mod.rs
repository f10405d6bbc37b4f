use std::collections::BTreeMap;

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::config::Secrets;
use crate::error::{AcquisitionError, Result};
use crate::table::Table;

pub mod comext;
pub mod ecb;
pub mod esios;
pub mod eurostat;
pub mod fred;
pub mod imf;
pub mod ine;
pub mod oecd;
pub mod owid;
pub mod worldbank;

pub const USER_AGENT: &str = "stat-acquisition/0.1";

// everything but the RFC 3986 unreserved characters
const UNRESERVED: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'.').remove(b'_').remove(b'~');

pub fn encode(component: &str) -> String {
    utf8_percent_encode(component, UNRESERVED).to_string()
}

#[derive(Debug, Clone, Copy)]
pub struct HttpOptions {
    pub connect_timeout: u64, // milliseconds
    pub receive_timeout: u64,
}

/// A single GET: base URL, query parameters in order, extra headers.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub base: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    redacted: Vec<String>,
}

impl Request {
    pub fn get<S: Into<String>>(base: S) -> Request {
        Request {
            base: base.into(),
            query: Vec::new(),
            headers: Vec::new(),
            redacted: Vec::new(),
        }
    }

    pub fn query<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Request {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn optional_query<K: Into<String>>(self, key: K, value: Option<&str>) -> Request {
        match value {
            Some(v) if !v.is_empty() => self.query(key, v),
            _ => self,
        }
    }

    /// A parameter whose value must never show up in logs or error messages.
    pub fn secret_query<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Request {
        let key = key.into();
        self.redacted.push(key.clone());
        self.query(key, value)
    }

    pub fn header<K: Into<String>, V: Into<String>>(mut self, name: K, value: V) -> Request {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn url(&self) -> String {
        self.render(false)
    }

    pub fn display_url(&self) -> String {
        self.render(true)
    }

    fn render(&self, redact: bool) -> String {
        if self.query.is_empty() {
            return self.base.to_owned();
        }

        let query: Vec<String> = self.query
            .iter()
            .map(|(key, value)| {
                if redact && self.redacted.contains(key) {
                    format!("{}=REDACTED", encode(key))
                } else {
                    format!("{}={}", encode(key), encode(value))
                }
            })
            .collect();

        let separator = if self.base.contains('?') { '&' } else { '?' };
        format!("{}{}{}", self.base, separator, query.join("&"))
    }

    pub fn call(&self, http: &HttpOptions) -> Result<ureq::Response> {
        let url = self.url();
        let shown = self.display_url();
        debug!(url = %shown, "requesting");

        let mut request = ureq::get(&url);
        request.set("User-Agent", USER_AGENT);
        for (name, value) in &self.headers {
            request.set(name, value);
        }

        let response = request
            .timeout_connect(http.connect_timeout)
            .timeout_read(http.receive_timeout)
            .call();

        if let Some(error) = response.synthetic_error() {
            return Err(AcquisitionError::Http { url: shown, message: error.to_string() });
        }

        if !response.ok() {
            return Err(AcquisitionError::Status {
                url: shown,
                status: response.status(),
                status_text: response.status_text().to_owned(),
            });
        }

        Ok(response)
    }

    pub fn fetch_text(&self, http: &HttpOptions) -> Result<String> {
        let response = self.call(http)?;
        response.into_string().map_err(|e| AcquisitionError::Http {
            url: self.display_url(),
            message: format!("Failed to read response body: {}", e),
        })
    }

    pub fn fetch_json(&self, http: &HttpOptions) -> Result<Value> {
        let response = self.call(http)?;
        response.into_json().map_err(|e| AcquisitionError::Payload {
            url: self.display_url(),
            message: format!("response is not valid JSON: {}", e),
        })
    }
}

/// A dimension filter: either one code or several.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum FilterValue {
    One(String),
    Many(Vec<String>),
}

impl FilterValue {
    pub fn values(&self) -> Vec<&str> {
        match self {
            FilterValue::One(v) => vec![v.as_str()],
            FilterValue::Many(vs) => vs.iter().map(String::as_str).collect(),
        }
    }
}

pub type Filters = BTreeMap<String, FilterValue>;

/// What a query produced: the table, the delimiter it should be written
/// with, and optional metadata to keep next to it.
#[derive(Debug)]
pub struct Acquisition {
    pub table: Table,
    pub delimiter: u8,
    pub metadata: Option<Value>,
}

impl From<Table> for Acquisition {
    fn from(table: Table) -> Self {
        Acquisition {
            table,
            delimiter: b',',
            metadata: None,
        }
    }
}

pub struct Context<'a> {
    pub http: HttpOptions,
    pub secrets: &'a Secrets,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(tag = "source", rename_all = "lowercase")]
pub enum Query {
    Comext(comext::ComextQuery),
    Eurostat(eurostat::EurostatQuery),
    Ecb(ecb::EcbQuery),
    Oecd(oecd::OecdQuery),
    Imf(imf::ImfQuery),
    WorldBank(worldbank::WorldBankQuery),
    Fred(fred::FredQuery),
    FredGraph(fred::FredGraphQuery),
    Ine(ine::IneQuery),
    Esios(esios::EsiosQuery),
    Owid(owid::OwidQuery),
}

impl Query {
    pub fn source(&self) -> &'static str {
        match self {
            Query::Comext(_) => "comext",
            Query::Eurostat(_) => "eurostat",
            Query::Ecb(_) => "ecb",
            Query::Oecd(_) => "oecd",
            Query::Imf(_) => "imf",
            Query::WorldBank(_) => "worldbank",
            Query::Fred(_) => "fred",
            Query::FredGraph(_) => "fredgraph",
            Query::Ine(_) => "ine",
            Query::Esios(_) => "esios",
            Query::Owid(_) => "owid",
        }
    }

    pub fn description(&self) -> Option<&str> {
        let description = match self {
            Query::Comext(q) => &q.description,
            Query::Eurostat(q) => &q.description,
            Query::Ecb(q) => &q.description,
            Query::Oecd(q) => &q.description,
            Query::Imf(q) => &q.description,
            Query::WorldBank(q) => &q.description,
            Query::Fred(q) => &q.description,
            Query::FredGraph(q) => &q.description,
            Query::Ine(q) => &q.description,
            Query::Esios(q) => &q.description,
            Query::Owid(q) => &q.description,
        };
        description.as_deref()
    }

    pub fn acquire(&self, context: &Context) -> Result<Acquisition> {
        let http = &context.http;
        match self {
            Query::Comext(q) => q.fetch(http).map(Acquisition::from),
            Query::Eurostat(q) => q.fetch(http).map(Acquisition::from),
            Query::Ecb(q) => q.fetch(http).map(Acquisition::from),
            Query::Oecd(q) => q.fetch(http).map(Acquisition::from),
            Query::Imf(q) => q.fetch(http).map(Acquisition::from),
            Query::WorldBank(q) => q.fetch(http).map(Acquisition::from),
            Query::Fred(q) => q.fetch(http, context.secrets).map(Acquisition::from),
            Query::FredGraph(q) => q.fetch(http).map(Acquisition::from),
            Query::Ine(q) => q.fetch(http),
            Query::Esios(q) => q.fetch(http, context.secrets).map(Acquisition::from),
            Query::Owid(q) => q.fetch(http),
        }
    }
}

#[test]
fn test_url_encodes_keys_and_values() {
    let request = Request::get("https://example.org/data/")
        .query("c[geo]", "IT,FR")
        .query("c[TIME_PERIOD]", "ge:1995")
        .query("plain", "a-b_c.d~e");

    assert_eq!(
        request.url(),
        "https://example.org/data/?c%5Bgeo%5D=IT%2CFR&c%5BTIME_PERIOD%5D=ge%3A1995&plain=a-b_c.d~e"
    );
}

#[test]
fn test_url_without_query_and_with_existing_query() {
    assert_eq!(Request::get("https://example.org/a").url(), "https://example.org/a");
    assert_eq!(
        Request::get("https://example.org/a?v=1").query("b", "2").url(),
        "https://example.org/a?v=1&b=2"
    );
}

#[test]
fn test_secret_query_is_redacted_for_display() {
    let request = Request::get("https://example.org/obs")
        .query("series_id", "GDPC1")
        .secret_query("api_key", "abc123");

    assert_eq!(request.url(), "https://example.org/obs?series_id=GDPC1&api_key=abc123");
    assert_eq!(request.display_url(), "https://example.org/obs?series_id=GDPC1&api_key=REDACTED");
}

#[test]
fn test_optional_query_skips_empty() {
    let request = Request::get("https://example.org")
        .optional_query("startPeriod", Some("2018"))
        .optional_query("endPeriod", None)
        .optional_query("dimensionAtObservation", Some(""));

    assert_eq!(request.query, vec![("startPeriod".to_owned(), "2018".to_owned())]);
}
