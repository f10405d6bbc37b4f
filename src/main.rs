use std::fs;
use std::path::{Path, PathBuf};
use std::process;

#[macro_use]
extern crate lazy_static;

use clap::{App, AppSettings, Arg, ArgMatches, SubCommand};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

mod config;
use config::{AcquisitionConfig, Secrets};

mod docs;

mod error;
use error::{AcquisitionError, Result};

mod integration;
mod jsonstat;

mod sources;
use sources::{Context, HttpOptions, Query};

mod table;

fn command_usage<'a, 'b>() -> App<'a, 'b> {
    App::new("stat-acquisition")
    .author("Matthew Scheffel <matt@dataheck.com>")
    .about("Downloads statistical datasets from public data APIs into CSV files")
    .setting(AppSettings::SubcommandRequiredElseHelp)
    .arg(
        Arg::with_name("config")
            .long("config")
            .takes_value(true)
            .global(true)
            .help("Location of acquisition configuration (queries, output, docs)")
            .default_value("config/acquisition.toml")
    )
    .arg(
        Arg::with_name("secret-config")
            .long("secret-config")
            .takes_value(true)
            .global(true)
            .help("Location of private configuration (api keys, tokens, etc.)")
            .default_value("config/secret.toml")
    )
    .arg(
        Arg::with_name("output-dir")
            .short("o")
            .long("output-dir")
            .takes_value(true)
            .global(true)
            .help("Directory that receives the CSV files. Overrides the configured output_dir.")
    )
    .arg(
        Arg::with_name("http-connect-timeout")
            .long("http-connect-timeout")
            .takes_value(true)
            .global(true)
            .help("HTTP connection timeout in milliseconds.")
    )
    .arg(
        Arg::with_name("http-receive-timeout")
            .long("http-receive-timeout")
            .takes_value(true)
            .global(true)
            .help("HTTP receive timeout in milliseconds. SDMX services can take minutes to answer large selections.")
    )
    .arg(
        Arg::with_name("verbose")
            .short("v")
            .long("verbose")
            .multiple(true)
            .global(true)
            .help("Raise log verbosity (-v debug, -vv trace). RUST_LOG takes precedence.")
    )
    .subcommand(
        SubCommand::with_name("list")
            .about("Lists the configured queries")
    )
    .subcommand(
        SubCommand::with_name("run")
            .about("Runs configured queries and writes <output-dir>/<query>.csv for each")
            .arg(
                Arg::with_name("queries")
                    .multiple(true)
                    .help("Names of the queries to run")
                    .required_unless("all")
            )
            .arg(
                Arg::with_name("all")
                    .short("a")
                    .long("all")
                    .takes_value(false)
                    .conflicts_with("queries")
                    .help("Run every configured query")
            )
    )
    .subcommand(
        SubCommand::with_name("decode")
            .about("Decodes a local JSON-stat file into a CSV file")
            .arg(
                Arg::with_name("input")
                    .required(true)
                    .help("JSON-stat document to decode")
            )
            .arg(
                Arg::with_name("output")
                    .long("output")
                    .takes_value(true)
                    .help("Destination CSV. Defaults to the input path with a .csv extension.")
            )
    )
    .subcommand(
        SubCommand::with_name("docs")
            .about("Builds one markdown document from the per-source readmes and scripts")
            .arg(
                Arg::with_name("root")
                    .long("root")
                    .takes_value(true)
                    .help("Directory holding one subdirectory per language")
            )
            .arg(
                Arg::with_name("output")
                    .long("output")
                    .takes_value(true)
                    .help("Markdown file to write")
            )
    )
}

fn init_logging(verbosity: u64) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level(verbosity)));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Default filter for a `-v` count when RUST_LOG is unset.
fn log_level(verbosity: u64) -> &'static str {
    match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    }
}

fn parse_millis(matches: &ArgMatches, name: &str) -> Result<Option<u64>> {
    match matches.value_of(name) {
        Some(value) => value.parse::<u64>().map(Some).map_err(|_| {
            AcquisitionError::InvalidInput(format!("Invalid {} specified: '{}'", name, value))
        }),
        None => Ok(None),
    }
}

/// Loads the acquisition config and applies the command line overrides.
fn load_config(matches: &ArgMatches, required: bool) -> Result<AcquisitionConfig> {
    let path = Path::new(matches.value_of("config").unwrap_or("config/acquisition.toml"));

    let mut config = if required || path.exists() {
        AcquisitionConfig::load(path)?
    } else {
        debug!(path = %path.display(), "no acquisition config, using defaults");
        AcquisitionConfig::default()
    };

    if let Some(output_dir) = matches.value_of("output-dir") {
        config.output_dir = PathBuf::from(output_dir);
    }
    if let Some(timeout) = parse_millis(matches, "http-connect-timeout")? {
        config.http_connect_timeout = timeout;
    }
    if let Some(timeout) = parse_millis(matches, "http-receive-timeout")? {
        config.http_receive_timeout = timeout;
    }

    Ok(config)
}

fn list_queries(config: &AcquisitionConfig) {
    if config.queries.is_empty() {
        println!("No queries configured.");
        return;
    }

    for (name, query) in &config.queries {
        println!("{:<32} {:<10} {}", name, query.source(), query.description().unwrap_or(""));
    }
}

fn run_query(name: &str, query: &Query, context: &Context, output_dir: &Path) -> Result<PathBuf> {
    info!(query = %name, source = query.source(), "running query");

    let acquisition = query.acquire(context)?;
    if acquisition.table.is_empty() {
        warn!(query = %name, "query returned no rows");
    }

    let path = output_dir.join(format!("{}.csv", name));
    acquisition.table.write_csv_file(&path, acquisition.delimiter)?;

    if let Some(metadata) = &acquisition.metadata {
        let metadata_path = output_dir.join(format!("{}.metadata.json", name));
        fs::write(&metadata_path, serde_json::to_string_pretty(metadata)?)?;
        info!(query = %name, path = %metadata_path.display(), "saved metadata");
    }

    info!(query = %name, rows = acquisition.table.rows.len(), path = %path.display(), "saved data");
    Ok(path)
}

/// Runs the selected queries one after another. Returns the number that failed.
fn run_queries(config: &AcquisitionConfig, secrets: &Secrets, matches: &ArgMatches) -> Result<usize> {
    let names: Vec<&str> = if matches.is_present("all") {
        config.queries.keys().map(String::as_str).collect()
    } else {
        matches.values_of("queries").map(|v| v.collect()).unwrap_or_default()
    };

    let unknown: Vec<&str> = names.iter().copied().filter(|n| !config.queries.contains_key(*n)).collect();
    if !unknown.is_empty() {
        return Err(AcquisitionError::InvalidInput(format!("Unknown queries: {}", unknown.join(", "))));
    }

    let context = Context {
        http: HttpOptions {
            connect_timeout: config.http_connect_timeout,
            receive_timeout: config.http_receive_timeout,
        },
        secrets,
    };

    let mut failures = 0;
    for name in names {
        if let Err(e) = run_query(name, &config.queries[name], &context, &config.output_dir) {
            error!(query = %name, error = %e, "query failed");
            failures += 1;
        }
    }

    Ok(failures)
}

fn decode_file(matches: &ArgMatches) -> Result<PathBuf> {
    let input = PathBuf::from(matches.value_of("input").unwrap_or_default());
    let output = matches.value_of("output").map(PathBuf::from).unwrap_or_else(|| input.with_extension("csv"));

    let document = serde_json::from_str(&fs::read_to_string(&input)?)?;
    let table = sources::comext::parse(document)?;
    table.write_csv_file(&output, b',')?;

    info!(input = %input.display(), rows = table.rows.len(), output = %output.display(), "decoded JSON-stat file");
    Ok(output)
}

fn run() -> Result<i32> {
    let matches = command_usage().get_matches();
    init_logging(matches.occurrences_of("verbose"));

    match matches.subcommand() {
        ("list", Some(sub)) => {
            let config = load_config(sub, true)?;
            list_queries(&config);
        },
        ("run", Some(sub)) => {
            let config = load_config(sub, true)?;
            let secrets = Secrets::load(Path::new(sub.value_of("secret-config").unwrap_or("config/secret.toml")))?;

            let failures = run_queries(&config, &secrets, sub)?;
            if failures > 0 {
                error!(failures, "some queries failed");
                return Ok(1);
            }
        },
        ("decode", Some(sub)) => {
            decode_file(sub)?;
        },
        ("docs", Some(sub)) => {
            let mut docs_config = load_config(sub, false)?.docs;
            if let Some(root) = sub.value_of("root") {
                docs_config.root = PathBuf::from(root);
            }
            if let Some(output) = sub.value_of("output") {
                docs_config.output = PathBuf::from(output);
            }

            docs::write(&docs_config)?;
        },
        _ => {},
    }

    Ok(0)
}

fn main() {
    match run() {
        Ok(code) => process::exit(code),
        Err(e) => {
            error!(error = %e, "acquisition failed");
            process::exit(1);
        }
    }
}

#[test]
fn test_log_level_follows_verbosity() {
    assert_eq!(log_level(0), "info");
    assert_eq!(log_level(1), "debug");
    assert_eq!(log_level(2), "trace");
    assert_eq!(log_level(5), "trace");
}
