//! Server credentials loaded from a netrc-style config file when the CLI
//! doesn't supply them directly.
//!
//! Grounded on `cmdline.py::get_config`: a `key value` per line file,
//! checked at `~/.nzbstream` first and `~/.netrc` as a fallback, so
//! users who already keep NNTP credentials in their netrc don't need a
//! second file.

use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("no config file found at {0} or ~/.netrc")]
    NotFound(String),

    #[error("could not read config file '{path}'")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("config file is missing required key '{0}'")]
    MissingKey(&'static str),
}

#[derive(Debug, Clone, Default)]
pub struct NntpConfig {
    pub server: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub port: Option<u16>,
}

/// Search `~/.nzbstream` then `~/.netrc` for NNTP credentials, returning
/// whatever keys were present (missing keys stay `None` so CLI flags can
/// still fill them in afterward).
pub fn load_config() -> Result<NntpConfig, ConfigError> {
    let home = dirs::home_dir();

    if let Some(path) = home.as_deref().map(|h| h.join(".nzbstream")) {
        if path.exists() {
            return parse_config_file(&path);
        }
    }

    if let Some(path) = home.as_deref().map(|h| h.join(".netrc")) {
        if path.exists() {
            return parse_config_file(&path);
        }
    }

    Err(ConfigError::NotFound(
        home.map(|h| h.join(".nzbstream").display().to_string())
            .unwrap_or_else(|| "~/.nzbstream".to_string()),
    ))
}

fn parse_config_file(path: &Path) -> Result<NntpConfig, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let mut config = NntpConfig::default();
    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once(char::is_whitespace) else {
            continue;
        };
        let value = value.trim();
        match key {
            "machine" | "server" => config.server = Some(value.to_string()),
            "login" | "username" => config.username = Some(value.to_string()),
            "password" => config.password = Some(value.to_string()),
            "port" => config.port = value.parse().ok(),
            _ => {}
        }
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parses_netrc_style_key_value_lines() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "machine news.example.com").unwrap();
        writeln!(file, "login alice").unwrap();
        writeln!(file, "password hunter2").unwrap();
        writeln!(file, "port 563").unwrap();

        let config = parse_config_file(file.path()).unwrap();
        assert_eq!(config.server.as_deref(), Some("news.example.com"));
        assert_eq!(config.username.as_deref(), Some("alice"));
        assert_eq!(config.password.as_deref(), Some("hunter2"));
        assert_eq!(config.port, Some(563));
    }

    #[test]
    fn ignores_comments_and_blank_lines() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# a comment").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "machine news.example.com").unwrap();

        let config = parse_config_file(file.path()).unwrap();
        assert_eq!(config.server.as_deref(), Some("news.example.com"));
    }
}
