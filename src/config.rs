//! Service configuration.
//!
//! Sources, later ones overriding earlier ones:
//! 1. Built-in defaults, set on the builder
//! 2. `config/default.toml` and `config/local.toml` (both optional)
//! 3. A file given with `--config`
//! 4. Environment variables prefixed with `DIMQUERY_`, using `__` between
//!    nested keys (`DIMQUERY_ELASTICSEARCH__URL`)
//! 5. Command-line arguments

use clap::Parser;
use config::{Config, ConfigBuilder, ConfigError, Environment, File};
use config::builder::DefaultState;
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::aggregation::SearchOptions;

#[derive(Parser, Debug, Default)]
#[command(author, version, about)]
pub struct CliArgs {
    /// Path to the configuration file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Address to listen on
    #[arg(long)]
    pub host: Option<String>,

    /// Port to listen on
    #[arg(long)]
    pub port: Option<u16>,

    /// Elasticsearch base URL
    #[arg(long)]
    pub es_url: Option<String>,

    /// Index (or index pattern) to query
    #[arg(long)]
    pub index: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub server: ServerSettings,
    pub elasticsearch: ElasticsearchSettings,
    pub query: QuerySettings,
}

#[derive(Debug, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize)]
pub struct ElasticsearchSettings {
    pub url: String,
    pub index: String,
    /// Upper bound on one search round trip.
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize)]
pub struct QuerySettings {
    pub max_groups: usize,
    pub timestamp_field: String,
}

impl QuerySettings {
    pub fn search_options(&self) -> SearchOptions {
        SearchOptions {
            timestamp_field: self.timestamp_field.clone(),
            max_groups: self.max_groups,
        }
    }
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        Self::builder(None)?.build()?.try_deserialize()
    }

    /// Loads settings with command-line overrides applied last.
    pub fn from_cli(cli: &CliArgs) -> Result<Self, ConfigError> {
        let mut builder = Self::builder(cli.config.as_deref())?;

        if let Some(ref host) = cli.host {
            builder = builder.set_override("server.host", host.as_str())?;
        }
        if let Some(port) = cli.port {
            builder = builder.set_override("server.port", port)?;
        }
        if let Some(ref url) = cli.es_url {
            builder = builder.set_override("elasticsearch.url", url.as_str())?;
        }
        if let Some(ref index) = cli.index {
            builder = builder.set_override("elasticsearch.index", index.as_str())?;
        }

        builder.build()?.try_deserialize()
    }

    fn builder(config_file: Option<&Path>) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        let config_dir = Path::new("config");

        let mut builder = Config::builder()
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 8080)?
            .set_default("elasticsearch.url", "http://localhost:9200")?
            .set_default("elasticsearch.index", "packetbeat-*")?
            .set_default("elasticsearch.timeout_secs", 30)?
            .set_default("query.max_groups", 100)?
            .set_default("query.timestamp_field", "timestamp")?
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            .add_source(File::from(config_dir.join("local.toml")).required(false));

        if let Some(path) = config_file {
            builder = builder.add_source(File::from(path));
        }

        Ok(builder.add_source(
            Environment::with_prefix("DIMQUERY")
                .prefix_separator("_")
                .separator("__"),
        ))
    }
}
