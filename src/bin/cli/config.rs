use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Named bundle of defaults selected with `--profile`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Profile {
    pub database: Option<String>,
    pub directory: Option<PathBuf>,
    pub schema: Option<PathBuf>,
}

/// Defaults left after merging the selected profile over the `[database]`
/// section. Command-line arguments still take precedence over these.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Settings {
    pub database: Option<String>,
    pub directory: Option<PathBuf>,
    pub schema: Option<PathBuf>,
}

#[derive(Debug, Default)]
pub struct CliConfig {
    path: Option<PathBuf>,
    data: RawConfig,
    profiles: HashMap<String, Profile>,
}

impl CliConfig {
    pub fn load(explicit: Option<PathBuf>) -> Result<Self, ConfigError> {
        let required = explicit.is_some();
        let path = explicit.or_else(default_config_path);
        let data = match path.as_ref() {
            Some(config_path) if config_path.exists() => read_file(config_path)?,
            Some(config_path) if required => {
                return Err(ConfigError::Missing {
                    path: config_path.clone(),
                })
            }
            _ => RawConfig::default(),
        };
        let profiles = parse_profiles(&data)?;
        Ok(Self {
            path,
            data,
            profiles,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn default_profile_name(&self) -> Option<&str> {
        self.data.default_profile.as_deref()
    }

    pub fn profile(&self, name: &str) -> Option<&Profile> {
        self.profiles.get(name)
    }

    /// Merges `profile` (or the configured default profile) over the
    /// `[database]` section.
    pub fn resolve(&self, profile: Option<&str>) -> Result<Settings, ConfigError> {
        let section = &self.data.database;
        let mut settings = Settings {
            database: section.default.clone(),
            directory: section.directory.clone(),
            schema: section.schema.clone(),
        };
        let selected = profile.or_else(|| self.default_profile_name());
        if let Some(name) = selected {
            let chosen = self
                .profile(name)
                .ok_or_else(|| ConfigError::ProfileNotFound {
                    name: name.to_string(),
                })?;
            if chosen.database.is_some() {
                settings.database = chosen.database.clone();
            }
            if chosen.directory.is_some() {
                settings.directory = chosen.directory.clone();
            }
            if chosen.schema.is_some() {
                settings.schema = chosen.schema.clone();
            }
        }
        Ok(settings)
    }
}

fn read_file(path: &Path) -> Result<RawConfig, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn parse_profiles(data: &RawConfig) -> Result<HashMap<String, Profile>, ConfigError> {
    let mut profiles = HashMap::new();
    for (name, raw) in &data.profiles {
        profiles.insert(
            name.clone(),
            Profile {
                database: raw.database.clone(),
                directory: raw.directory.clone(),
                schema: raw.schema.clone(),
            },
        );
    }
    if let Some(default_name) = data.default_profile.as_ref() {
        if !profiles.contains_key(default_name) {
            return Err(ConfigError::ProfileNotFound {
                name: default_name.clone(),
            });
        }
    }
    Ok(profiles)
}

#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    #[serde(default)]
    database: DatabaseSection,
    #[serde(default)]
    profiles: HashMap<String, RawProfile>,
    #[serde(default)]
    default_profile: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabaseSection {
    default: Option<String>,
    directory: Option<PathBuf>,
    schema: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct RawProfile {
    database: Option<String>,
    directory: Option<PathBuf>,
    schema: Option<PathBuf>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read CLI config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse CLI config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("CLI config {path} does not exist")]
    Missing { path: PathBuf },
    #[error("profile '{name}' not found")]
    ProfileNotFound { name: String },
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|base| base.join("pokedex").join("cli.toml"))
}
