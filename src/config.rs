//! Configuration loading for chatterbox.
//!
//! Configuration is resolved from three fallback sources (tried in order):
//!
//! 1. **JSON file** via `--config <path>` CLI flag
//! 2. **JSON file** via `CHATTERBOX_CONFIG` environment variable
//! 3. **Environment variables** — `CHATTERBOX_URL` + `CHATTERBOX_EMAIL` +
//!    `CHATTERBOX_PASSWORD`
//!
//! A `--server` flag overrides the server URL from any source.

use clap::{Parser, Subcommand};
use serde::Deserialize;
use std::path::PathBuf;

/// CLI arguments parsed by `clap`.
#[derive(Parser)]
#[command(
    name = "chatterbox",
    version,
    about = "Terminal client for the ChatterBox pairing chat"
)]
pub struct Cli {
    /// Path to config file (JSON)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Server base URL (overrides the config file)
    #[arg(long)]
    pub server: Option<String>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create the account, then enter the chat.
    Signup {
        /// Preferred language code (en, es, fr, de, ja, zh-cn)
        #[arg(long, default_value = "en")]
        language: String,

        /// Image file to upload as the initial avatar
        #[arg(long)]
        avatar: Option<PathBuf>,
    },
}

/// Raw JSON config file structure.
#[derive(Deserialize)]
struct ConfigFile {
    server_url: String,
    email: String,
    password: String,
}

/// Validated configuration ready for use.
pub struct ResolvedConfig {
    pub server_url: String,
    pub email: String,
    pub password: String,
}

/// Load and validate configuration from CLI args, config file, or env vars.
pub fn load_config(cli: &Cli) -> Result<ResolvedConfig, String> {
    let mut config = if let Some(path) = &cli.config {
        load_from_file(&expand_tilde(path))?
    } else if let Ok(path) = std::env::var("CHATTERBOX_CONFIG") {
        load_from_file(&expand_tilde(&PathBuf::from(path)))?
    } else {
        load_from_env()?
    };

    if let Some(server) = &cli.server {
        config.server_url = server.clone();
    }
    validate(&config)?;
    Ok(config)
}

/// Expand a leading `~` to `$HOME`.
fn expand_tilde(path: &PathBuf) -> PathBuf {
    let s = path.to_string_lossy();
    if let Some(rest) = s.strip_prefix("~/") {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(rest);
        }
    }
    path.clone()
}

fn load_from_file(path: &PathBuf) -> Result<ResolvedConfig, String> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config file {}: {}", path.display(), e))?;

    let config: ConfigFile = serde_json::from_str(&contents)
        .map_err(|e| format!("Failed to parse config file {}: {}", path.display(), e))?;

    Ok(ResolvedConfig {
        server_url: config.server_url,
        email: config.email,
        password: config.password,
    })
}

fn load_from_env() -> Result<ResolvedConfig, String> {
    let server_url = std::env::var("CHATTERBOX_URL").map_err(|_| {
        "No configuration found. Pass --config, set CHATTERBOX_CONFIG, \
         or set CHATTERBOX_URL + CHATTERBOX_EMAIL + CHATTERBOX_PASSWORD"
            .to_string()
    })?;
    let email =
        std::env::var("CHATTERBOX_EMAIL").map_err(|_| "CHATTERBOX_EMAIL not set".to_string())?;
    let password = std::env::var("CHATTERBOX_PASSWORD")
        .map_err(|_| "CHATTERBOX_PASSWORD not set".to_string())?;
    Ok(ResolvedConfig {
        server_url,
        email,
        password,
    })
}

fn validate(config: &ResolvedConfig) -> Result<(), String> {
    if !config.server_url.starts_with("http://") && !config.server_url.starts_with("https://") {
        return Err(format!(
            "server_url must be an http(s) URL, got '{}'",
            config.server_url
        ));
    }
    if config.email.is_empty() {
        return Err("email is empty".to_string());
    }
    if config.password.is_empty() {
        return Err("password is empty".to_string());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(server_url: &str, email: &str, password: &str) -> ResolvedConfig {
        ResolvedConfig {
            server_url: server_url.into(),
            email: email.into(),
            password: password.into(),
        }
    }

    #[test]
    fn accepts_http_and_https_urls() {
        assert!(validate(&config("http://localhost:8000", "a@x.com", "pw")).is_ok());
        assert!(validate(&config("https://chat.example.com", "a@x.com", "pw")).is_ok());
    }

    #[test]
    fn rejects_non_http_urls() {
        assert!(validate(&config("localhost:8000", "a@x.com", "pw")).is_err());
        assert!(validate(&config("ws://localhost:8000", "a@x.com", "pw")).is_err());
    }

    #[test]
    fn rejects_empty_credentials() {
        assert!(validate(&config("http://localhost:8000", "", "pw")).is_err());
        assert!(validate(&config("http://localhost:8000", "a@x.com", "")).is_err());
    }

    #[test]
    fn tilde_expansion_leaves_plain_paths_alone() {
        let path = PathBuf::from("/etc/chatterbox.json");
        assert_eq!(expand_tilde(&path), path);
    }
}
