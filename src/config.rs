use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_ENDPOINT: &str = "http://localhost:5000";
pub const DEFAULT_GREETING: &str = "Welcome! How can I help you today?";

// ── Routes ────────────────────────────────────────────────────────────────────

/// Paths of the three assistant-service operations, relative to `endpoint`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Routes {
    pub new_chat: String,
    pub chat: String,
    pub orchestrate: String,
}

impl Default for Routes {
    fn default() -> Self {
        Self {
            new_chat: "/new_chat".to_string(),
            chat: "/chat".to_string(),
            orchestrate: "/orchestrate".to_string(),
        }
    }
}

// ── Profile ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    /// Base URL of the assistant service
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// First assistant turn shown at startup and after every reset
    #[serde(default = "default_greeting")]
    pub greeting: String,
    /// Delay between revealed words in the TUI. 0 shows replies at once.
    #[serde(default = "default_reveal_interval_ms")]
    pub reveal_interval_ms: u64,
    #[serde(default)]
    pub routes: Routes,
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

fn default_greeting() -> String {
    DEFAULT_GREETING.to_string()
}

fn default_reveal_interval_ms() -> u64 {
    35
}

impl Default for Profile {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            greeting: default_greeting(),
            reveal_interval_ms: default_reveal_interval_ms(),
            routes: Routes::default(),
        }
    }
}

// ── Config file ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigFile {
    /// Which profile to use when none is specified
    #[serde(default = "default_profile_name")]
    pub default_profile: String,

    #[serde(default)]
    pub profiles: HashMap<String, Profile>,
}

fn default_profile_name() -> String {
    "default".to_string()
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self { default_profile: default_profile_name(), profiles: HashMap::new() }
    }
}

impl ConfigFile {
    /// Load from disk, or return a default config if the file doesn't exist yet.
    pub fn load() -> Result<Self> {
        Self::load_from(&config_path())
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file at {}", path.display()))?;
        toml::from_str(&raw)
            .with_context(|| format!("Failed to parse config file at {}", path.display()))
    }

    /// Write a starter config file to disk (only if it doesn't exist).
    pub fn write_default_if_missing() -> Result<PathBuf> {
        let path = config_path();
        write_default_to(&path)?;
        Ok(path)
    }

    /// Resolve the active profile given an optional override name.
    pub fn resolve_profile(&self, name: Option<&str>) -> Option<&Profile> {
        let key = name.unwrap_or(&self.default_profile);
        self.profiles.get(key)
    }

    /// Profile names, sorted, for `--profiles`.
    pub fn profile_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.profiles.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

fn write_default_to(path: &Path) -> Result<()> {
    if path.exists() {
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    fs::write(path, DEFAULT_CONFIG_TOML)
        .with_context(|| format!("Failed to write config file at {}", path.display()))
}

// ── Resolved runtime config (after merging file + CLI overrides) ──────────────

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub endpoint: String,
    pub greeting: String,
    pub reveal_interval_ms: u64,
    pub routes: Routes,
    /// Profile name that was resolved (for display)
    pub profile_name: String,
}

impl ResolvedConfig {
    /// Merge config file profile with CLI overrides.
    /// Priority: CLI args > env vars (handled by clap) > config file profile > built-in defaults
    pub fn resolve(
        file: &ConfigFile,
        profile_override: Option<&str>,
        endpoint_override: Option<&str>,
    ) -> Self {
        let profile_name = profile_override
            .unwrap_or(&file.default_profile)
            .to_string();

        let base = file
            .resolve_profile(profile_override)
            .cloned()
            .unwrap_or_default();

        Self {
            endpoint: endpoint_override
                .map(str::to_string)
                .unwrap_or(base.endpoint),
            greeting: base.greeting,
            reveal_interval_ms: base.reveal_interval_ms,
            routes: base.routes,
            profile_name,
        }
    }
}

// ── Paths ─────────────────────────────────────────────────────────────────────

pub fn config_path() -> PathBuf {
    dirs_config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("loandesk")
        .join("config.toml")
}

fn dirs_config_dir() -> Option<PathBuf> {
    // XDG_CONFIG_HOME or ~/.config on Linux/macOS
    std::env::var("XDG_CONFIG_HOME")
        .ok()
        .map(PathBuf::from)
        .or_else(|| {
            std::env::var("HOME")
                .ok()
                .map(|h| PathBuf::from(h).join(".config"))
        })
}

/// Directory for the log file: XDG_DATA_HOME or ~/.local/share.
pub fn data_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .ok()
        .map(PathBuf::from)
        .or_else(|| {
            std::env::var("HOME")
                .ok()
                .map(|h| PathBuf::from(h).join(".local").join("share"))
        })
        .unwrap_or_else(|| PathBuf::from("."))
        .join("loandesk")
}

// ── Default config template written on first run ──────────────────────────────

const DEFAULT_CONFIG_TOML: &str = r#"# loandesk configuration
# Run `loandesk --init` to regenerate this file.

default_profile = "local"

# ── Local assistant service (default) ────────────────────────────────────────
[profiles.local]
endpoint           = "http://localhost:5000"
greeting           = "Welcome! How can I help you today?"
reveal_interval_ms = 35   # 0 disables the word-by-word reveal

# Route overrides, if the service is mounted under a prefix
# [profiles.local.routes]
# new_chat    = "/new_chat"
# chat        = "/chat"
# orchestrate = "/orchestrate"

# ── Staging example ──────────────────────────────────────────────────────────
# [profiles.staging]
# endpoint = "https://loans-staging.example.com/api"
"#;
