use crate::config::FeishuConfig;
use serde::Deserialize;
use std::fmt;
use std::fs;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, warn};

/// Feishu application credentials used for the tenant token exchange.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct Credentials {
    pub app_id: String,
    pub app_secret: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("app_id", &self.app_id)
            .field("app_secret", &"***")
            .finish()
    }
}

impl Credentials {
    fn is_complete(&self) -> bool {
        !self.app_id.trim().is_empty() && !self.app_secret.trim().is_empty()
    }
}

#[derive(Debug, Error)]
pub enum CredentialsError {
    #[error("failed to read credentials file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse credentials file {path}: {source}")]
    Parse {
        path: String,
        source: serde_yaml::Error,
    },
}

/// Environment variables win over the file. Missing credentials are a normal
/// state and come back as `None`; a broken file is logged and treated the same.
pub fn resolve(cfg: &FeishuConfig, path_override: Option<&Path>) -> Option<Credentials> {
    if let Some(creds) = from_env(&cfg.app_id_env, &cfg.app_secret_env) {
        debug!("feishu credentials taken from environment");
        return Some(creds);
    }

    let path = path_override.unwrap_or_else(|| Path::new(&cfg.credentials_path));
    match load_from_file(path) {
        Ok(found) => found,
        Err(err) => {
            warn!(error = %err, "ignoring unusable credentials file");
            None
        }
    }
}

fn from_env(app_id_env: &str, app_secret_env: &str) -> Option<Credentials> {
    let creds = Credentials {
        app_id: non_empty_env(app_id_env)?,
        app_secret: non_empty_env(app_secret_env)?,
    };
    Some(creds)
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Reads `app_id` / `app_secret` from a YAML or JSON file. `Ok(None)` when
/// the file does not exist or leaves a field blank.
pub fn load_from_file(path: &Path) -> Result<Option<Credentials>, CredentialsError> {
    if !path.exists() {
        debug!(path = %path.display(), "no credentials file");
        return Ok(None);
    }
    let path_display = path.display().to_string();
    let text = fs::read_to_string(path).map_err(|source| CredentialsError::Read {
        path: path_display.clone(),
        source,
    })?;
    let creds: Credentials =
        serde_yaml::from_str(&text).map_err(|source| CredentialsError::Parse {
            path: path_display,
            source,
        })?;
    Ok(creds.is_complete().then_some(creds))
}
