//! Configuration loading and management.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono_tz::Tz;
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use hs_calendar::FeedRules;
use hs_core::{EngineConfig, KeywordRules, Mapping, NoteFormat, TemplateError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Application configuration as layered by figment.
///
/// Account ids and secrets have no sensible default, so they stay optional
/// here and are checked by [`Config::settings`].
#[derive(Clone, Serialize, Deserialize)]
pub struct Config {
    pub harvest_token: Option<String>,
    pub harvest_account: Option<u64>,
    /// Calendar feed URL. Usually carries a private token.
    pub ics_url: Option<String>,
    pub default_project: Option<u64>,
    pub default_task: Option<u64>,
    pub nonbill_project: Option<u64>,
    pub nonbill_task: Option<u64>,
    pub default_jira: String,
    pub clone_tag: String,
    pub skip_keywords: Vec<String>,
    pub billable_keywords: Vec<String>,
    pub nonbill_keywords: Vec<String>,
    pub default_billable: bool,
    pub note_template: String,
    pub date_format: String,
    pub time_format: String,
    pub key_separator: String,
    pub timezone: String,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("harvest_token", &self.harvest_token.as_ref().map(|_| "[REDACTED]"))
            .field("harvest_account", &self.harvest_account)
            .field("ics_url", &self.ics_url.as_ref().map(|_| "[REDACTED]"))
            .field("default_project", &self.default_project)
            .field("default_task", &self.default_task)
            .field("nonbill_project", &self.nonbill_project)
            .field("nonbill_task", &self.nonbill_task)
            .field("default_jira", &self.default_jira)
            .field("clone_tag", &self.clone_tag)
            .field("skip_keywords", &self.skip_keywords)
            .field("billable_keywords", &self.billable_keywords)
            .field("nonbill_keywords", &self.nonbill_keywords)
            .field("default_billable", &self.default_billable)
            .field("note_template", &self.note_template)
            .field("date_format", &self.date_format)
            .field("time_format", &self.time_format)
            .field("key_separator", &self.key_separator)
            .field("timezone", &self.timezone)
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            harvest_token: None,
            harvest_account: None,
            ics_url: None,
            default_project: None,
            default_task: None,
            nonbill_project: None,
            nonbill_task: None,
            default_jira: "NOJIRA".to_string(),
            clone_tag: "[clone]".to_string(),
            skip_keywords: Vec::new(),
            billable_keywords: Vec::new(),
            nonbill_keywords: Vec::new(),
            default_billable: true,
            note_template: "{jira} {title} [{date} {start}] | {end}".to_string(),
            date_format: "%Y-%m-%d".to_string(),
            time_format: "%H:%M".to_string(),
            key_separator: "|".to_string(),
            timezone: "America/New_York".to_string(),
        }
    }
}

/// Validation failures for a loaded [`Config`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required setting `{0}` (set it in config.toml or HS_{upper})", upper = .0.to_uppercase())]
    Missing(&'static str),
    #[error("setting `harvest_token` cannot be empty")]
    EmptyToken,
    #[error("unknown timezone `{0}`")]
    UnknownTimezone(String),
    #[error("invalid note settings: {0}")]
    Notes(#[from] TemplateError),
}

/// Validated settings, ready to hand to the adapters and the engine.
#[derive(Clone)]
pub struct Settings {
    pub harvest_token: String,
    pub harvest_account: u64,
    pub ics_url: String,
    pub zone: Tz,
    pub engine: EngineConfig,
    pub feed: FeedRules,
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("harvest_token", &"[REDACTED]")
            .field("harvest_account", &self.harvest_account)
            .field("ics_url", &"[REDACTED]")
            .field("zone", &self.zone)
            .field("engine", &self.engine)
            .field("feed", &self.feed)
            .finish()
    }
}

impl Config {
    /// Loads configuration, optionally from a specific file.
    #[expect(
        clippy::result_large_err,
        reason = "figment::Error is large but only returned at startup"
    )]
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, figment::Error> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        // Load from default config location
        if let Some(config_dir) = dirs_config_path() {
            figment = figment.merge(Toml::file(config_dir.join("config.toml")));
        }

        // Load from specified config file
        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        // Load from environment variables (HS_*)
        figment = figment.merge(Env::prefixed("HS_"));

        figment.extract()
    }

    /// Checks required values and builds the runtime settings.
    pub fn settings(&self) -> Result<Settings, ConfigError> {
        let harvest_token = required(self.harvest_token.clone(), "harvest_token")?;
        if harvest_token.trim().is_empty() {
            return Err(ConfigError::EmptyToken);
        }
        let harvest_account = required(self.harvest_account, "harvest_account")?;
        let ics_url = required(self.ics_url.clone(), "ics_url")?;

        let default_mapping = Mapping {
            project_id: required(self.default_project, "default_project")?,
            task_id: required(self.default_task, "default_task")?,
        };
        // Non-billable blocks are never written, so the pair is optional.
        let non_billable_mapping = Mapping {
            project_id: self.nonbill_project.unwrap_or(default_mapping.project_id),
            task_id: self.nonbill_task.unwrap_or(default_mapping.task_id),
        };

        let zone: Tz = self
            .timezone
            .parse()
            .map_err(|_| ConfigError::UnknownTimezone(self.timezone.clone()))?;
        let notes = NoteFormat::new(
            &self.note_template,
            &self.date_format,
            &self.time_format,
            &self.key_separator,
            zone,
        )?;

        let feed = FeedRules {
            keywords: KeywordRules::new(
                self.skip_keywords.as_slice(),
                self.billable_keywords.as_slice(),
                self.nonbill_keywords.as_slice(),
                self.default_billable,
            ),
            clone_marker: self.clone_tag.clone(),
            default_jira: self.default_jira.clone(),
            zone,
        };

        Ok(Settings {
            harvest_token,
            harvest_account,
            ics_url,
            zone,
            engine: EngineConfig {
                default_mapping,
                non_billable_mapping,
                notes,
            },
            feed,
        })
    }
}

fn required<T>(value: Option<T>, name: &'static str) -> Result<T, ConfigError> {
    value.ok_or(ConfigError::Missing(name))
}

/// Returns the platform-specific config directory for harvest-sync.
///
/// On Linux: `~/.config/harvest-sync`
pub fn dirs_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("harvest-sync"))
}
