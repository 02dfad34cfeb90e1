//! Configuration and data-directory resolution.
//!
//! Resolution order:
//!   1. `--data-dir PATH`  (explicit override)
//!   2. `./apns-token/`    (project-local, if it exists)
//!   3. `~/.apns-token/`   (global default)

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::key::KeySource;
use crate::provider::TokenProviderConfig;

/// Top-level config from `config.toml`.
#[derive(Deserialize, Clone)]
pub struct Config {
    pub auth: AuthConfig,
    #[serde(skip)]
    data_dir: PathBuf,
}

#[derive(Deserialize, Clone)]
pub struct AuthConfig {
    pub key_id: String,
    pub team_id: String,
    pub bundle_id: String,
    /// Path to the `.p8` file or the PEM itself.
    pub private_key: String,
    #[serde(default)]
    pub private_key_secret: Option<String>,
}

impl Config {
    /// Load and validate config from a data directory.
    pub fn load(data_dir: &Path) -> Result<Self> {
        let path = data_dir.join("config.toml");
        let contents = std::fs::read_to_string(&path)
            .with_context(|| format!("could not read {}", path.display()))?;
        let mut cfg: Config = toml::from_str(&contents)
            .with_context(|| format!("invalid TOML in {}", path.display()))?;

        for (field, value) in [
            ("key_id", &cfg.auth.key_id),
            ("team_id", &cfg.auth.team_id),
            ("bundle_id", &cfg.auth.bundle_id),
            ("private_key", &cfg.auth.private_key),
        ] {
            if value.trim().is_empty() {
                anyhow::bail!("[auth] {field} is empty in {}", path.display());
            }
        }

        cfg.data_dir = data_dir.to_path_buf();
        Ok(cfg)
    }

    /// Provider settings. The key file is not read here.
    pub fn provider_config(&self) -> TokenProviderConfig {
        let a = &self.auth;
        let source = resolve_key(&a.private_key, &self.data_dir);
        let cfg = TokenProviderConfig::new(&a.key_id, &a.team_id, &a.bundle_id, source);
        match &a.private_key_secret {
            Some(secret) => cfg.with_secret(secret.clone()),
            None => cfg,
        }
    }
}

/// Resolve the data directory.
///
/// Priority: explicit `--data-dir` > `./apns-token/` > `~/.apns-token/`
pub fn resolve_data_dir(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(p) = explicit {
        return Ok(p.to_path_buf());
    }

    let local = PathBuf::from("apns-token");
    if local.join("config.toml").exists() {
        return Ok(std::fs::canonicalize(&local).unwrap_or(local));
    }

    let home = dirs::home_dir().context("could not determine home directory")?;
    Ok(home.join(".apns-token"))
}

/// Return the path to `init` into: `./apns-token/` or `~/.apns-token/`.
pub fn init_data_dir(global: bool) -> Result<PathBuf> {
    if global {
        let home = dirs::home_dir().context("could not determine home directory")?;
        Ok(home.join(".apns-token"))
    } else {
        Ok(PathBuf::from("apns-token"))
    }
}

/// A private key value is either inline PEM or a path. Paths get `~`
/// expanded and are taken relative to the data directory.
fn resolve_key(value: &str, relative_to: &Path) -> KeySource {
    let trimmed = value.trim_start();
    if trimmed.starts_with("-----BEGIN") {
        return KeySource::Pem(trimmed.to_string());
    }

    let expanded = shellexpand::tilde(value);
    let path = Path::new(expanded.as_ref());
    if path.is_relative() {
        KeySource::Path(relative_to.join(path))
    } else {
        KeySource::Path(path.to_path_buf())
    }
}

/// Template config for `init`.
pub const CONFIG_TEMPLATE: &str = r#"# apns-token configuration
#
# Create a key under Certificates, Identifiers & Profiles > Keys with
# "Apple Push Notifications service (APNs)" enabled:
#   https://developer.apple.com/account/resources/authkeys/list

[auth]
key_id    = "YOUR_KEY_ID"
team_id   = "YOUR_TEAM_ID"
bundle_id = "com.example.myapp"
private_key = "AuthKey_YOUR_KEY_ID.p8"

# Only needed if the key was re-exported as encrypted PKCS#8.
# private_key_secret = "passphrase"
"#;
