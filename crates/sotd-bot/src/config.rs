// Configuration loading and parsing (bot.toml, credentials.toml).

use serde::Deserialize;
use sotd_core::engine::EngineConfig;
use std::path::{Path, PathBuf};
use thiserror::Error;

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
    pub bracket: BracketConfig,
    pub channels: ChannelsConfig,
    pub playlists: PlaylistsConfig,
    pub discord: DiscordConfig,
    pub spotify: SpotifyConfig,
    pub credentials: CredentialsConfig,
    pub gateway_port: u16,
    pub db_path: String,
}

impl Config {
    /// The slice of settings the vote engine runs on.
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            votes_to_win: self.bracket.votes_to_win,
            mention_role: self.bracket.mention_role.clone(),
            vote_channel: self.channels.vote.clone(),
            announce_channel: self.channels.announce.clone(),
            voting_playlist: self.playlists.voting.clone(),
            winners_playlist: self.playlists.winners.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// bot.toml structs
// ---------------------------------------------------------------------------

/// Raw deserialization target for the entire bot.toml file.
#[derive(Debug, Clone, Deserialize)]
struct BotFile {
    bracket: BracketConfig,
    channels: ChannelsConfig,
    playlists: PlaylistsConfig,
    gateway: GatewaySection,
    database: DatabaseSection,
    discord: DiscordConfig,
    spotify: SpotifyConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BracketConfig {
    pub votes_to_win: usize,
    pub mention_role: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChannelsConfig {
    /// Channel whose match messages collect votes.
    pub vote: String,
    /// Channel results are announced in.
    pub announce: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlaylistsConfig {
    pub voting: String,
    pub winners: String,
}

#[derive(Debug, Clone, Deserialize)]
struct GatewaySection {
    port: u16,
}

#[derive(Debug, Clone, Deserialize)]
struct DatabaseSection {
    path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DiscordConfig {
    pub api_base: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SpotifyConfig {
    pub api_base: String,
    pub accounts_base: String,
}

// ---------------------------------------------------------------------------
// credentials.toml structs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Default)]
pub struct CredentialsConfig {
    pub discord_token: Option<String>,
    pub spotify_client_id: Option<String>,
    pub spotify_client_secret: Option<String>,
    pub spotify_refresh_token: Option<String>,
}

// ---------------------------------------------------------------------------
// Loading logic
// ---------------------------------------------------------------------------

/// Load and validate configuration from `config/bot.toml` and (optionally)
/// `config/credentials.toml`, relative to `base_dir`.
///
/// Does not copy defaults; `load_config()` does that first.
pub(crate) fn load_config_from(base_dir: &Path) -> Result<Config, ConfigError> {
    let config_dir = base_dir.join("config");

    // --- bot.toml (required) ---
    let bot_path = config_dir.join("bot.toml");
    let bot_text = read_file(&bot_path)?;
    let bot_file: BotFile = toml::from_str(&bot_text).map_err(|e| ConfigError::ParseError {
        path: bot_path.clone(),
        source: e,
    })?;

    // --- credentials.toml (optional) ---
    let credentials_path = config_dir.join("credentials.toml");
    let credentials = if credentials_path.exists() {
        let cred_text = read_file(&credentials_path)?;
        toml::from_str(&cred_text).map_err(|e| ConfigError::ParseError {
            path: credentials_path.clone(),
            source: e,
        })?
    } else {
        CredentialsConfig::default()
    };

    let config = Config {
        bracket: bot_file.bracket,
        channels: bot_file.channels,
        playlists: bot_file.playlists,
        discord: bot_file.discord,
        spotify: bot_file.spotify,
        credentials,
        gateway_port: bot_file.gateway.port,
        db_path: bot_file.database.path,
    };

    validate(&config)?;

    Ok(config)
}

/// Ensure all config files exist by copying missing ones from `defaults/`.
/// Returns the list of files that were copied. Skips `.example` files.
pub fn ensure_config_files(base_dir: &Path) -> Result<Vec<PathBuf>, ConfigError> {
    let defaults_dir = base_dir.join("defaults");
    let config_dir = base_dir.join("config");

    if !defaults_dir.exists() {
        if !config_dir.exists() {
            return Err(ConfigError::DefaultsCopyError {
                message: format!(
                    "neither defaults/ nor config/ directory found in {}; \
                     run from the bot crate directory or ensure defaults/ is present",
                    base_dir.display()
                ),
            });
        }
        return Ok(vec![]);
    }

    std::fs::create_dir_all(&config_dir).map_err(|e| ConfigError::DefaultsCopyError {
        message: format!("failed to create config directory: {e}"),
    })?;

    let mut copied = Vec::new();

    let entries = std::fs::read_dir(&defaults_dir).map_err(|e| ConfigError::DefaultsCopyError {
        message: format!("failed to read defaults directory: {e}"),
    })?;

    for entry in entries {
        let entry = entry.map_err(|e| ConfigError::DefaultsCopyError {
            message: format!("failed to read defaults entry: {e}"),
        })?;
        let path = entry.path();

        if !path.is_file() {
            continue;
        }
        let Some(file_name) = path.file_name() else {
            continue;
        };
        if file_name.to_str().is_some_and(|n| n.ends_with(".example")) {
            continue;
        }
        let target = config_dir.join(file_name);

        match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&target)
        {
            Ok(mut dest) => {
                let content = std::fs::read(&path).map_err(|e| ConfigError::DefaultsCopyError {
                    message: format!("failed to read {}: {e}", path.display()),
                })?;
                std::io::Write::write_all(&mut dest, &content).map_err(|e| {
                    ConfigError::DefaultsCopyError {
                        message: format!("failed to write {}: {e}", target.display()),
                    }
                })?;
                copied.push(target);
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {}
            Err(e) => {
                return Err(ConfigError::DefaultsCopyError {
                    message: format!("failed to create {}: {e}", target.display()),
                });
            }
        }
    }

    Ok(copied)
}

/// Load config relative to the current working directory, copying defaults
/// into place first.
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

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validate(config: &Config) -> Result<(), ConfigError> {
    if config.bracket.votes_to_win == 0 {
        return Err(ConfigError::ValidationError {
            field: "bracket.votes_to_win".into(),
            message: "must be greater than 0".into(),
        });
    }

    let required: &[(&str, &str)] = &[
        ("bracket.mention_role", config.bracket.mention_role.as_str()),
        ("channels.vote", config.channels.vote.as_str()),
        ("channels.announce", config.channels.announce.as_str()),
        ("playlists.voting", config.playlists.voting.as_str()),
        ("playlists.winners", config.playlists.winners.as_str()),
        ("discord.api_base", config.discord.api_base.as_str()),
        ("spotify.api_base", config.spotify.api_base.as_str()),
        ("spotify.accounts_base", config.spotify.accounts_base.as_str()),
    ];
    for (name, val) in required {
        if val.trim().is_empty() {
            return Err(ConfigError::ValidationError {
                field: name.to_string(),
                message: "must not be empty".into(),
            });
        }
    }

    if config.playlists.voting == config.playlists.winners {
        return Err(ConfigError::ValidationError {
            field: "playlists.winners".into(),
            message: "must differ from playlists.voting".into(),
        });
    }

    if config.gateway_port == 0 {
        return Err(ConfigError::ValidationError {
            field: "gateway.port".into(),
            message: "must be greater than 0".into(),
        });
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
