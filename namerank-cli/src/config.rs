/// Config file loading and creation for the namerank CLI.
///
/// Config lives at ~/.config/namerank/config.toml.
/// All fields are optional; CLI args override config values.
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::bail;

#[derive(Deserialize, Default)]
pub struct NamerankConfig {
    pub user: Option<String>,
    pub store: Option<PathBuf>,
    pub outbox: Option<PathBuf>,
    pub endpoint: Option<String>,
    pub max_matches: Option<usize>,
    pub transition_ms: Option<i64>,
    pub retries: Option<usize>,
}

const DEFAULT_CONFIG_TEMPLATE: &str = "\
# namerank configuration
# All values here can be overridden by CLI flags.

# Name sessions are saved under (defaults to $USER)
# user = \"ana\"

# Where session progress is kept between runs
# store = \"/home/ana/.local/share/namerank/sessions.json\"

# Ratings that could not be delivered wait here until `namerank flush`
# outbox = \"/home/ana/.local/share/namerank/outbox.jsonl\"

# Endpoint that receives final ratings (POST <endpoint>/ratings)
# API key: use NAMERANK_API_KEY env var or --api-key flag (not stored in config)
# endpoint = \"http://localhost:8080\"

# Stop a session after this many votes even if pairs remain
# max_matches = 30

# Pause after each vote, in milliseconds
# transition_ms = 500

# Delivery retries before a payload goes to the outbox
# retries = 3
";

fn home_dir() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| bail("HOME environment variable not set"));
    PathBuf::from(home)
}

/// Returns the default config path: ~/.config/namerank/config.toml
pub fn config_path() -> PathBuf {
    home_dir().join(".config").join("namerank").join("config.toml")
}

/// Returns the default data directory: ~/.local/share/namerank
pub fn data_dir() -> PathBuf {
    home_dir().join(".local").join("share").join("namerank")
}

/// Load config from a file path. Returns default (all None) if file doesn't exist.
pub fn load_config(path: &Path) -> NamerankConfig {
    match std::fs::read_to_string(path) {
        Ok(content) => parse_config(&content)
            .unwrap_or_else(|e| bail(format!("Failed to parse config at {}: {e}", path.display()))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => NamerankConfig::default(),
        Err(e) => bail(format!("Failed to read config at {}: {e}", path.display())),
    }
}

fn parse_config(content: &str) -> Result<NamerankConfig, toml::de::Error> {
    toml::from_str(content)
}

/// Create the default config file. Errors if it already exists.
pub fn create_default_config() -> PathBuf {
    let path = config_path();

    if path.exists() {
        bail(format!("Config file already exists at {}", path.display()));
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .unwrap_or_else(|e| bail(format!("Failed to create directory {}: {e}", parent.display())));
    }

    std::fs::write(&path, DEFAULT_CONFIG_TEMPLATE)
        .unwrap_or_else(|e| bail(format!("Failed to write config to {}: {e}", path.display())));

    path
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_parses_to_defaults() {
        let cfg = parse_config(DEFAULT_CONFIG_TEMPLATE).unwrap();
        assert!(cfg.user.is_none());
        assert!(cfg.endpoint.is_none());
        assert!(cfg.max_matches.is_none());
    }

    #[test]
    fn test_parse_values() {
        let cfg = parse_config(
            "user = \"ana\"\nmax_matches = 12\ntransition_ms = 0\nstore = \"/tmp/s.json\"\n",
        )
        .unwrap();
        assert_eq!(cfg.user.as_deref(), Some("ana"));
        assert_eq!(cfg.max_matches, Some(12));
        assert_eq!(cfg.transition_ms, Some(0));
        assert_eq!(cfg.store, Some(PathBuf::from("/tmp/s.json")));
    }

    #[test]
    fn test_unknown_type_rejected() {
        assert!(parse_config("max_matches = \"lots\"").is_err());
    }
}
