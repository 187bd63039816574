use std::{
    env,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, anyhow};
use config::{Config, File, FileFormat};
use log::debug;
use serde::Deserialize;

use crate::cli::{ExportArgs, ImportArgs};
use crate::import::{DEFAULT_TEAM_DESCRIPTION, ImportOptions};
use crate::mapping::{Mapping, MemberMapping, TeamMapping};
use crate::pacing::Pacing;
use crate::retry::{DEFAULT_ATTEMPTS, RetryBudget};

const CONFIG_FILE_NAME: &str = env!("CARGO_PKG_NAME");
const DEFAULT_STAGING_DIR: &str = "channels";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct TeamSettings {
    pub name: String,
    /// Exact channel names or `prefix-` patterns
    #[serde(default)]
    pub channels: Vec<String>,
    /// Member emails, owner first
    #[serde(default)]
    pub members: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Settings {
    pub staging_dir: Option<PathBuf>,

    pub space_url: Option<String>,
    pub space_client_id: Option<String>,
    pub space_client_secret: Option<String>,

    pub tenant_id: Option<String>,
    pub ms_client_id: Option<String>,
    pub ms_client_secret: Option<String>,

    pub fallback_member: Option<String>,
    pub team_description: String,
    pub skip_channels: Vec<String>,

    pub retry_attempts: u32,
    pub retry_backoff_secs: u64,
    pub messages_per_second: usize,
    pub message_pause_secs: u64,
    pub provisioning_pause_secs: u64,

    pub teams: Vec<TeamSettings>,
}

impl Default for Settings {
    fn default() -> Self {
        let pacing = Pacing::default();
        Settings {
            staging_dir: None,
            space_url: None,
            space_client_id: None,
            space_client_secret: None,
            tenant_id: None,
            ms_client_id: None,
            ms_client_secret: None,
            fallback_member: None,
            team_description: DEFAULT_TEAM_DESCRIPTION.to_string(),
            skip_channels: vec![],
            retry_attempts: DEFAULT_ATTEMPTS,
            retry_backoff_secs: 1,
            messages_per_second: pacing.messages_per_second,
            message_pause_secs: pacing.message_pause.as_secs(),
            provisioning_pause_secs: pacing.provisioning_pause.as_secs(),
            teams: vec![],
        }
    }
}

impl Settings {
    pub fn staging_dir(&self, cli: Option<&Path>) -> PathBuf {
        cli.map(Path::to_path_buf)
            .or_else(|| self.staging_dir.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_STAGING_DIR))
    }

    pub fn mapping(&self) -> Mapping {
        let mut channels = TeamMapping::new();
        let mut members = MemberMapping::new();

        for team in &self.teams {
            for pattern in &team.channels {
                channels.add(pattern, &team.name);
            }
            for email in &team.members {
                members.add(email, &team.name);
            }
        }

        Mapping::new(channels, members)
    }

    pub fn pacing(&self) -> Pacing {
        Pacing {
            messages_per_second: self.messages_per_second.max(1),
            message_pause: Duration::from_secs(self.message_pause_secs),
            provisioning_pause: Duration::from_secs(self.provisioning_pause_secs),
        }
    }

    pub fn retry_budget(&self) -> RetryBudget {
        RetryBudget::new(
            self.retry_attempts,
            Duration::from_secs(self.retry_backoff_secs),
        )
    }

    pub fn import_options(&self, show_progress: bool) -> ImportOptions {
        ImportOptions {
            team_description: self.team_description.clone(),
            fallback_member: self.fallback_member.clone(),
            pacing: self.pacing(),
            show_progress,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SpaceConfig {
    pub url: String,
    pub client_id: String,
    pub client_secret: String,
}

#[derive(Debug, Clone)]
pub struct GraphConfig {
    pub tenant_id: String,
    pub client_id: String,
    pub client_secret: String,
}

// Function to get the XDG_CONFIG_HOME path
fn get_xdg_config_path() -> Option<PathBuf> {
    // First check XDG_CONFIG_HOME environment variable
    if let Ok(xdg_config) = env::var("XDG_CONFIG_HOME") {
        return Some(PathBuf::from(xdg_config));
    }

    // If XDG_CONFIG_HOME is not set, fall back to $HOME/.config
    if let Ok(home) = env::var("HOME") {
        return Some(PathBuf::from(home).join(".config"));
    }

    None
}

/// Read `path`, or the per-user config file when no path is given.
pub fn load_settings(path: Option<&Path>) -> anyhow::Result<Settings> {
    let config_path = match path {
        Some(path) => {
            if !path.exists() {
                return Err(anyhow!("config file {} does not exist", path.display()));
            }
            path.to_path_buf()
        }
        None => match get_xdg_config_path() {
            Some(xdg_config) => xdg_config.join(CONFIG_FILE_NAME).join("config.toml"),
            None => return Ok(Settings::default()),
        },
    };

    if !config_path.exists() {
        debug!("no config file at {}", config_path.display());
        return Ok(Settings::default());
    }

    let settings: Settings = Config::builder()
        .add_source(File::from(config_path.clone()).format(FileFormat::Toml))
        .build()?
        .try_deserialize()
        .map_err(|e| {
            anyhow!(
                "Failed to deserialize config file {}: {}",
                config_path.display(),
                e
            )
        })?;

    debug!("loaded config from {}", config_path.display());
    Ok(settings)
}

pub fn parse_settings(toml: &str) -> anyhow::Result<Settings> {
    Config::builder()
        .add_source(File::from_str(toml, FileFormat::Toml))
        .build()?
        .try_deserialize()
        .context("Failed to deserialize settings")
}

// Flags and environment variables win over the config file
macro_rules! apply_if_none {
    ($value:expr, $settings:expr, $field:ident) => {
        $value.clone().or_else(|| $settings.$field.clone())
    };
}

fn required(value: Option<String>, name: &str, flag: &str, env_var: &str) -> anyhow::Result<String> {
    value.filter(|v| !v.is_empty()).ok_or_else(|| {
        anyhow!("missing {name}: pass --{flag}, set {env_var} or add {} to the config file", flag.replace('-', "_"))
    })
}

pub fn space_config(args: &ExportArgs, settings: &Settings) -> anyhow::Result<SpaceConfig> {
    Ok(SpaceConfig {
        url: required(
            apply_if_none!(args.space_url, settings, space_url),
            "Space URL",
            "space-url",
            "SPACE_URL",
        )?,
        client_id: required(
            apply_if_none!(args.space_client_id, settings, space_client_id),
            "Space client id",
            "space-client-id",
            "SPACE_CLIENT_ID",
        )?,
        client_secret: required(
            apply_if_none!(args.space_client_secret, settings, space_client_secret),
            "Space client secret",
            "space-client-secret",
            "SPACE_CLIENT_SECRET",
        )?,
    })
}

pub fn graph_config(args: &ImportArgs, settings: &Settings) -> anyhow::Result<GraphConfig> {
    Ok(GraphConfig {
        tenant_id: required(
            apply_if_none!(args.tenant_id, settings, tenant_id),
            "tenant id",
            "tenant-id",
            "TENANT_ID",
        )?,
        client_id: required(
            apply_if_none!(args.ms_client_id, settings, ms_client_id),
            "Microsoft client id",
            "ms-client-id",
            "MS_CLIENT_ID",
        )?,
        client_secret: required(
            apply_if_none!(args.ms_client_secret, settings, ms_client_secret),
            "Microsoft client secret",
            "ms-client-secret",
            "MS_CLIENT_SECRET",
        )?,
    })
}
