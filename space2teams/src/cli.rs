use std::{fmt, path::PathBuf};

use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};
use log::LevelFilter;

use crate::export::DEFAULT_BATCH_SIZE;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Configuration file with the team mapping (defaults to $XDG_CONFIG_HOME/space2teams/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Directory holding the exported channels
    #[arg(short, long, global = true)]
    pub staging_dir: Option<PathBuf>,

    /// Log verbosity
    #[arg(short, long, value_name = "LEVEL", default_value_t = LogLevel::Info, global = true)]
    pub log_level: LogLevel,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Export Space channels into the staging directory
    Export(ExportArgs),
    /// Import the staging directory into Microsoft Teams
    Import(ImportArgs),
    /// Export, then import
    Migrate {
        #[command(flatten)]
        export: ExportArgs,
        #[command(flatten)]
        import: ImportArgs,
    },
}

#[derive(ClapArgs, Debug, Clone)]
pub struct ExportArgs {
    /// Space server URL
    #[arg(long, env = "SPACE_URL")]
    pub space_url: Option<String>,

    /// Space application client id
    #[arg(long, env = "SPACE_CLIENT_ID")]
    pub space_client_id: Option<String>,

    /// Space application client secret
    #[arg(long, env = "SPACE_CLIENT_SECRET", hide_env_values = true)]
    pub space_client_secret: Option<String>,

    /// Keep previously exported channels instead of wiping the staging directory
    #[arg(long)]
    pub keep_staging: bool,

    /// Channel to leave out of the export, can be repeated
    #[arg(long, value_name = "CHANNEL")]
    pub skip: Vec<String>,

    /// Channel to export even if the config file skips it, can be repeated
    #[arg(long, value_name = "CHANNEL")]
    pub include: Vec<String>,

    /// Messages fetched per request
    #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
    pub batch_size: usize,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct ImportArgs {
    /// Azure AD tenant id
    #[arg(long, env = "TENANT_ID")]
    pub tenant_id: Option<String>,

    /// Azure AD application client id
    #[arg(long, env = "MS_CLIENT_ID")]
    pub ms_client_id: Option<String>,

    /// Azure AD application client secret
    #[arg(long, env = "MS_CLIENT_SECRET", hide_env_values = true)]
    pub ms_client_secret: Option<String>,

    /// Remove existing teams without asking
    #[arg(short, long)]
    pub yes: bool,

    /// Hide the message progress bar
    #[arg(long)]
    pub no_progress: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    Off,
}

impl From<LogLevel> for LevelFilter {
    fn from(log_level: LogLevel) -> Self {
        match log_level {
            LogLevel::Trace => LevelFilter::Trace,
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Error => LevelFilter::Error,
            LogLevel::Off => LevelFilter::Off,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Trace => write!(f, "trace"),
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Warn => write!(f, "warn"),
            LogLevel::Error => write!(f, "error"),
            LogLevel::Off => write!(f, "off"),
        }
    }
}
