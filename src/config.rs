use std::collections::{BTreeMap, HashMap};
use std::env;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use crate::error::{AcquisitionError, Result};
use crate::sources::Query;

pub const DEFAULT_CONNECT_TIMEOUT: u64 = 30000;
pub const DEFAULT_RECEIVE_TIMEOUT: u64 = 180000; // SDMX endpoints are slow to start streaming

fn default_output_dir() -> PathBuf { PathBuf::from("output") }
fn default_connect_timeout() -> u64 { DEFAULT_CONNECT_TIMEOUT }
fn default_receive_timeout() -> u64 { DEFAULT_RECEIVE_TIMEOUT }

#[derive(Deserialize, Debug)]
pub struct AcquisitionConfig {
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default = "default_connect_timeout")]
    pub http_connect_timeout: u64,
    #[serde(default = "default_receive_timeout")]
    pub http_receive_timeout: u64,
    #[serde(default)]
    pub queries: BTreeMap<String, Query>, // key is the output file stem
    #[serde(default)]
    pub docs: DocsConfig,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        AcquisitionConfig {
            output_dir: default_output_dir(),
            http_connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            http_receive_timeout: DEFAULT_RECEIVE_TIMEOUT,
            queries: BTreeMap::new(),
            docs: DocsConfig::default(),
        }
    }
}

impl AcquisitionConfig {
    pub fn load(path: &Path) -> Result<AcquisitionConfig> {
        let text = fs::read_to_string(path).map_err(|e| {
            AcquisitionError::Config(format!("Failed to read acquisition config {}: {}", path.display(), e))
        })?;

        AcquisitionConfig::parse(&text)
    }

    pub fn parse(text: &str) -> Result<AcquisitionConfig> {
        Ok(toml::from_str(text)?)
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct Language {
    pub name: String,       // directory under the docs root
    pub extension: String,  // code files to include, e.g. ".py"
    pub fence: String,      // markdown code fence language
}

impl Language {
    fn new(name: &str, extension: &str, fence: &str) -> Language {
        Language {
            name: name.to_owned(),
            extension: extension.to_owned(),
            fence: fence.to_owned(),
        }
    }
}

fn default_docs_root() -> PathBuf { PathBuf::from(".") }
fn default_docs_output() -> PathBuf { PathBuf::from("repository_codes.md") }
fn default_languages() -> Vec<Language> {
    vec![
        Language::new("python", ".py", "python"),
        Language::new("R", ".R", "R"),
        Language::new("matlab", ".m", "matlab"),
        Language::new("stata", ".do", "stata"),
    ]
}

#[derive(Deserialize, Debug, Clone)]
pub struct DocsConfig {
    #[serde(default = "default_docs_root")]
    pub root: PathBuf,
    #[serde(default = "default_docs_output")]
    pub output: PathBuf,
    #[serde(default = "default_languages")]
    pub languages: Vec<Language>,
}

impl Default for DocsConfig {
    fn default() -> Self {
        DocsConfig {
            root: default_docs_root(),
            output: default_docs_output(),
            languages: default_languages(),
        }
    }
}

/// Private configuration (api keys, tokens), laid out as `[section] key = value`.
#[derive(Debug, Default)]
pub struct Secrets(HashMap<String, HashMap<String, String>>);

impl Secrets {
    /// A missing file is fine; a file that exists and fails to parse is not.
    pub fn load(path: &Path) -> Result<Secrets> {
        match fs::read_to_string(path) {
            Ok(text) => Secrets::parse(&text),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %path.display(), "no secret config");
                Ok(Secrets::default())
            },
            Err(e) => Err(AcquisitionError::Io(e)),
        }
    }

    pub fn parse(text: &str) -> Result<Secrets> {
        let sections: HashMap<String, HashMap<String, String>> = toml::from_str(text).map_err(|e| {
            AcquisitionError::Config(format!("Secret configuration exists yet failed to process as a TOML file: {}", e))
        })?;
        Ok(Secrets(sections))
    }

    pub fn get(&self, section: &str, key: &str) -> Option<&str> {
        self.0.get(section)?.get(key).map(String::as_str)
    }

    /// The secret file wins; the environment variable is the fallback.
    /// Empty values count as absent.
    pub fn resolve(&self, section: &str, key: &str, variable: &str) -> Option<String> {
        match self.get(section, key) {
            Some(v) if !v.is_empty() => Some(v.to_owned()),
            _ => env::var(variable).ok().filter(|v| !v.is_empty()),
        }
    }
}

#[test]
fn test_parse_queries() {
    let config = AcquisitionConfig::parse(r#"
        output_dir = "data"

        [queries.olive_oil]
        source = "comext"
        dataset = "DS-059341"
        filters = { reporter = "ES", partner = "US", product = ["1509", "8703"] }

        [queries.gdp_italy]
        source = "eurostat"
        dataset = "nama_10_a64"
        filters = { geo = ["IT"], unit = "CLV20_MEUR" }

        [queries.spain_gdp_growth]
        source = "worldbank"
        country = "ESP"
        indicator = "NY.GDP.MKTP.KD.ZG"

        [queries.fred_graph]
        source = "fredgraph"
        graph_id = "1wmdD"
    "#).unwrap();

    assert_eq!(config.output_dir, PathBuf::from("data"));
    assert_eq!(config.http_connect_timeout, DEFAULT_CONNECT_TIMEOUT);
    assert_eq!(config.queries.len(), 4);
    assert_eq!(config.queries["olive_oil"].source(), "comext");
    assert_eq!(config.queries["gdp_italy"].source(), "eurostat");
    assert_eq!(config.queries["spain_gdp_growth"].source(), "worldbank");
    assert_eq!(config.queries["fred_graph"].source(), "fredgraph");

    match &config.queries["olive_oil"] {
        Query::Comext(q) => assert_eq!(q.filters["product"].values(), vec!["1509", "8703"]),
        other => panic!("unexpected query {:?}", other),
    }
    match &config.queries["spain_gdp_growth"] {
        Query::WorldBank(q) => assert_eq!(q.per_page, 20000),
        other => panic!("unexpected query {:?}", other),
    }
}

#[test]
fn test_shipped_config_parses() {
    let config = AcquisitionConfig::parse(include_str!("../config/acquisition.toml")).unwrap();

    assert_eq!(config.queries.len(), 11);
    assert_eq!(config.queries["ine_ipc"].source(), "ine");
    assert_eq!(config.queries["ecb_bsi"].description(), Some("Euro area M3, monthly"));
    assert_eq!(config.queries["fred_graph"].description(), None);
}

#[test]
fn test_parse_rejects_unknown_source() {
    let result = AcquisitionConfig::parse(r#"
        [queries.nope]
        source = "bloomberg"
    "#);
    assert!(matches!(result, Err(AcquisitionError::Toml(_))));
}

#[test]
fn test_docs_defaults() {
    let config = AcquisitionConfig::parse("").unwrap();

    assert_eq!(config.docs.output, PathBuf::from("repository_codes.md"));
    assert_eq!(config.docs.languages.len(), 4);
    assert_eq!(config.docs.languages[1], Language::new("R", ".R", "R"));

    let config = AcquisitionConfig::parse(r#"
        [docs]
        root = "scripts"
        languages = [{ name = "rust", extension = ".rs", fence = "rust" }]
    "#).unwrap();
    assert_eq!(config.docs.root, PathBuf::from("scripts"));
    assert_eq!(config.docs.languages, vec![Language::new("rust", ".rs", "rust")]);
}

#[test]
fn test_secrets() {
    let secrets = Secrets::parse(r#"
        [fred]
        key = "abc"
        [esios]
        token = ""
    "#).unwrap();

    assert_eq!(secrets.get("fred", "key"), Some("abc"));
    assert_eq!(secrets.get("mars", "key"), None);
    assert_eq!(secrets.resolve("fred", "key", "STAT_ACQUISITION_TEST_UNSET"), Some("abc".to_owned()));

    env::set_var("STAT_ACQUISITION_TEST_TOKEN", "from-env");
    assert_eq!(secrets.resolve("esios", "token", "STAT_ACQUISITION_TEST_TOKEN"), Some("from-env".to_owned()));
    assert_eq!(secrets.resolve("esios", "token", "STAT_ACQUISITION_TEST_UNSET"), None);
}

#[test]
fn test_secrets_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let secrets = Secrets::load(&dir.path().join("secret.toml")).unwrap();
    assert_eq!(secrets.get("fred", "key"), None);

    let path = dir.path().join("broken.toml");
    fs::write(&path, "[fred\nkey = ").unwrap();
    assert!(matches!(Secrets::load(&path), Err(AcquisitionError::Config(_))));
}
