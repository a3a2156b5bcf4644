// Configuration loading and parsing (config/mockdraft.toml).

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Deserialize;
use thiserror::Error;

use crate::prediction::score::ScoringRules;

/// Name of the config file under `config/` (and its template under `defaults/`).
pub const CONFIG_FILE: &str = "mockdraft.toml";

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("validation error for field `{field}`: {message}")]
    ValidationError { field: String, message: String },

    #[error("failed to initialize config from defaults: {message}")]
    DefaultsCopyError { message: String },
}

// ---------------------------------------------------------------------------
// Top-level assembled Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Config {
    pub event: EventConfig,
    pub draft: DraftConfig,
    pub scoring: ScoringRules,
    pub db_path: String,
    pub data_paths: DataPaths,
}

// ---------------------------------------------------------------------------
// mockdraft.toml structs
// ---------------------------------------------------------------------------

/// Raw deserialization target for the whole file.
#[derive(Debug, Clone, Deserialize)]
struct ConfigFile {
    event: EventConfig,
    #[serde(default)]
    draft: DraftConfig,
    #[serde(default)]
    scoring: ScoringRules,
    database: DatabaseSection,
    data: DataPaths,
}

#[derive(Debug, Clone, Deserialize)]
struct DatabaseSection {
    path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventConfig {
    pub id: String,
    pub name: String,
    /// RFC 3339 timestamp (quoted) after which predictions lock.
    #[serde(default)]
    pub prediction_deadline: Option<DateTime<Utc>>,
    #[serde(default)]
    pub teams: Vec<TeamConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TeamConfig {
    pub name: String,
    #[serde(default)]
    pub captains: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DraftConfig {
    /// Minimum number of slots generated for the snake order.
    pub max_generated_picks: usize,
}

impl Default for DraftConfig {
    fn default() -> Self {
        DraftConfig {
            max_generated_picks: 200,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DataPaths {
    /// CSV with `name,group,note` columns.
    pub players: String,
}

// ---------------------------------------------------------------------------
// Loading logic
// ---------------------------------------------------------------------------

/// Load and validate `config/mockdraft.toml` relative to `base_dir`.
///
/// Does not copy defaults; prefer `load_config()` for that.
pub fn load_config_from(base_dir: &Path) -> Result<Config, ConfigError> {
    let path = base_dir.join("config").join(CONFIG_FILE);
    let text = read_file(&path)?;
    let file: ConfigFile = toml::from_str(&text).map_err(|e| ConfigError::ParseError {
        path: path.clone(),
        source: e,
    })?;

    let config = Config {
        event: file.event,
        draft: file.draft,
        scoring: file.scoring,
        db_path: file.database.path,
        data_paths: file.data,
    };

    validate(&config)?;

    Ok(config)
}

/// Copy `defaults/mockdraft.toml` to `config/` if the latter is missing.
/// Returns the copied path, if any.
pub fn ensure_config_files(base_dir: &Path) -> Result<Option<PathBuf>, ConfigError> {
    let default_path = base_dir.join("defaults").join(CONFIG_FILE);
    let config_dir = base_dir.join("config");
    let target = config_dir.join(CONFIG_FILE);

    if target.exists() {
        return Ok(None);
    }
    if !default_path.exists() {
        return Err(ConfigError::DefaultsCopyError {
            message: format!(
                "neither {} nor {} found; run from the project root",
                target.display(),
                default_path.display()
            ),
        });
    }

    std::fs::create_dir_all(&config_dir).map_err(|e| ConfigError::DefaultsCopyError {
        message: format!("failed to create config directory: {e}"),
    })?;
    std::fs::copy(&default_path, &target).map_err(|e| ConfigError::DefaultsCopyError {
        message: format!("failed to copy {}: {e}", default_path.display()),
    })?;

    Ok(Some(target))
}

/// Convenience wrapper: loads config relative to the current working directory,
/// copying defaults first when needed.
pub fn load_config() -> Result<Config, ConfigError> {
    let cwd = std::env::current_dir().map_err(|_| ConfigError::FileNotFound {
        path: PathBuf::from("."),
    })?;
    ensure_config_files(&cwd)?;
    load_config_from(&cwd)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn read_file(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
        path: path.to_path_buf(),
    })
}

fn invalid(field: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError {
        field: field.to_string(),
        message: message.into(),
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validate(config: &Config) -> Result<(), ConfigError> {
    if config.event.id.trim().is_empty() {
        return Err(invalid("event.id", "must not be empty"));
    }
    if config.event.name.trim().is_empty() {
        return Err(invalid("event.name", "must not be empty"));
    }

    let mut names = HashSet::new();
    for (idx, team) in config.event.teams.iter().enumerate() {
        let name = team.name.trim().to_lowercase();
        if name.is_empty() {
            return Err(invalid(&format!("event.teams[{idx}].name"), "must not be empty"));
        }
        if !names.insert(name) {
            return Err(invalid(
                &format!("event.teams[{idx}].name"),
                format!("duplicate team name '{}'", team.name),
            ));
        }
    }

    if config.draft.max_generated_picks == 0 {
        return Err(invalid("draft.max_generated_picks", "must be greater than 0"));
    }

    // Points must not grow as a prediction gets further from the actual pick.
    let s = &config.scoring;
    if s.exact == 0 {
        return Err(invalid("scoring.exact", "must be greater than 0"));
    }
    let ladder: &[(&str, u32)] = &[
        ("scoring.exact", s.exact),
        ("scoring.off_by_one", s.off_by_one),
        ("scoring.off_by_two", s.off_by_two),
        ("scoring.off_by_three", s.off_by_three),
    ];
    for pair in ladder.windows(2) {
        let (closer, closer_pts) = pair[0];
        let (further, further_pts) = pair[1];
        if further_pts > closer_pts {
            return Err(invalid(
                further,
                format!("{further_pts} exceeds {closer} ({closer_pts})"),
            ));
        }
    }

    if config.db_path.trim().is_empty() {
        return Err(invalid("database.path", "must not be empty"));
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
