use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};

/// Command-line arguments for the kettle binary.
#[derive(Debug, Parser)]
#[command(name = "kettle", version, about = "Dependency-aware warm cache")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "KETTLE_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: Overrides,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the bundled shop scenario against an in-memory graph.
    Demo(DemoArgs),
    /// Print the resolved settings and exit.
    #[command(name = "show-config")]
    ShowConfig,
}

#[derive(Debug, Args, Clone)]
pub struct DemoArgs {
    /// Number of categories to seed.
    #[arg(long, default_value_t = 3)]
    pub categories: u32,
}

impl Default for DemoArgs {
    fn default() -> Self {
        Self { categories: 3 }
    }
}

#[derive(Debug, Args, Default, Clone)]
pub struct Overrides {
    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new(),
        global = true
    )]
    pub log_json: Option<bool>,

    /// Enable or disable caching.
    #[arg(
        long = "cache-enabled",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new(),
        global = true
    )]
    pub cache_enabled: Option<bool>,

    /// Override the maximum number of stored values.
    #[arg(long = "cache-store-limit", value_name = "COUNT", global = true)]
    pub cache_store_limit: Option<u64>,

    /// Override the number of events resolved per batch.
    #[arg(long = "cache-consume-batch-limit", value_name = "COUNT", global = true)]
    pub cache_consume_batch_limit: Option<u64>,
}
