//! Configuration: env files, environment settings and the optional TOML file
//!
//! Credentials only ever come from the environment (or an env file loaded into
//! it) and are wrapped in [`Secret`] so they never reach logs or terminal output.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Configuration error type
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{var} is not set (export it or add it to .env.local / ~/.callctl/.env)")]
    Missing { var: &'static str },

    #[error("failed to read config file {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file {path:?}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// A credential whose `Debug` and `Display` never show the value.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Short hint safe for terminal output, e.g. `eyJh…(219 chars)`.
    pub fn hint(&self) -> String {
        let prefix: String = self.0.chars().take(4).collect();
        format!("{}…({} chars)", prefix, self.0.chars().count())
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("***")
    }
}

/// Load environment variables from env files.
///
/// Priority order (highest to lowest):
/// 1. Variables already set in the process
/// 2. ./.env.local
/// 3. ./.env
/// 4. ~/.callctl/.env
///
/// dotenvy never overwrites a variable that is already set, so loading in
/// this order gives earlier files precedence. Returns the files that loaded.
pub fn load_dotenv() -> Vec<PathBuf> {
    let mut candidates = vec![PathBuf::from(".env.local"), PathBuf::from(".env")];
    if let Some(dir) = config_dir() {
        candidates.push(dir.join(".env"));
    }

    let mut loaded = Vec::new();
    for path in candidates {
        if !path.exists() {
            continue;
        }
        match dotenvy::from_path(&path) {
            Ok(()) => {
                debug!("Loaded env file: {}", path.display());
                loaded.push(path);
            }
            Err(e) => debug!("Failed to load {}: {}", path.display(), e),
        }
    }

    if loaded.is_empty() {
        debug!("No env files found (.env.local, .env, ~/.callctl/.env)");
    } else {
        let names: Vec<String> = loaded.iter().map(|p| p.display().to_string()).collect();
        info!("Loaded configuration from: {}", names.join(", "));
    }

    loaded
}

/// Get the callctl config directory path (~/.callctl)
pub fn config_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".callctl"))
}

/// Which database key to authenticate with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyRole {
    /// Bypasses row-level security
    ServiceRole,
    /// Subject to row-level security
    Anon,
}

/// Settings read from the environment
#[derive(Debug, Clone, Default)]
pub struct Settings {
    pub supabase_url: Option<String>,
    pub service_role_key: Option<Secret>,
    pub anon_key: Option<Secret>,
    pub database_url: Option<Secret>,
    pub vapi_api_key: Option<Secret>,
    pub vapi_base_url: Option<String>,
    pub resend_api_key: Option<Secret>,
}

impl Settings {
    /// Read settings from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read settings through an arbitrary lookup (tests pass a map).
    ///
    /// Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |names: &[&str]| {
            names
                .iter()
                .filter_map(|name| lookup(name))
                .map(|v| v.trim().to_string())
                .find(|v| !v.is_empty())
        };

        Self {
            supabase_url: get(&["SUPABASE_URL", "NEXT_PUBLIC_SUPABASE_URL"])
                .map(|url| url.trim_end_matches('/').to_string()),
            service_role_key: get(&["SUPABASE_SERVICE_ROLE_KEY"]).map(Secret::new),
            anon_key: get(&["SUPABASE_ANON_KEY", "NEXT_PUBLIC_SUPABASE_ANON_KEY"]).map(Secret::new),
            database_url: get(&["DATABASE_URL"]).map(Secret::new),
            vapi_api_key: get(&["VAPI_API_KEY"]).map(Secret::new),
            vapi_base_url: get(&["VAPI_BASE_URL"]),
            resend_api_key: get(&["RESEND_API_KEY"]).map(Secret::new),
        }
    }

    pub fn require_supabase_url(&self) -> Result<&str, ConfigError> {
        self.supabase_url
            .as_deref()
            .ok_or(ConfigError::Missing { var: "SUPABASE_URL" })
    }

    /// The key for the requested role.
    pub fn require_key(&self, role: KeyRole) -> Result<&Secret, ConfigError> {
        match role {
            KeyRole::ServiceRole => self.service_role_key.as_ref().ok_or(ConfigError::Missing {
                var: "SUPABASE_SERVICE_ROLE_KEY",
            }),
            KeyRole::Anon => self
                .anon_key
                .as_ref()
                .ok_or(ConfigError::Missing { var: "SUPABASE_ANON_KEY" }),
        }
    }

    pub fn require_database_url(&self) -> Result<&Secret, ConfigError> {
        self.database_url
            .as_ref()
            .ok_or(ConfigError::Missing { var: "DATABASE_URL" })
    }

    pub fn require_vapi_key(&self) -> Result<&Secret, ConfigError> {
        self.vapi_api_key
            .as_ref()
            .ok_or(ConfigError::Missing { var: "VAPI_API_KEY" })
    }

    /// (variable, rendered value) pairs for `config show`; secrets as hints.
    pub fn describe(&self) -> Vec<(&'static str, String)> {
        fn secret(s: &Option<Secret>) -> String {
            s.as_ref().map(Secret::hint).unwrap_or_else(|| "(not set)".into())
        }
        fn plain(s: &Option<String>) -> String {
            s.clone().unwrap_or_else(|| "(not set)".into())
        }

        vec![
            ("SUPABASE_URL", plain(&self.supabase_url)),
            ("SUPABASE_SERVICE_ROLE_KEY", secret(&self.service_role_key)),
            ("SUPABASE_ANON_KEY", secret(&self.anon_key)),
            ("DATABASE_URL", secret(&self.database_url)),
            ("VAPI_API_KEY", secret(&self.vapi_api_key)),
            ("VAPI_BASE_URL", plain(&self.vapi_base_url)),
            ("RESEND_API_KEY", secret(&self.resend_api_key)),
        ]
    }
}

// ============================================================================
// TOML Configuration
// ============================================================================

/// Optional file configuration (~/.callctl/config.toml)
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct CallctlConfig {
    #[serde(default)]
    pub server: ServerSection,

    #[serde(default)]
    pub probe: ProbeSection,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerSection {
    /// Address for `callctl serve`
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Mount /debug routes
    #[serde(default)]
    pub debug_routes: bool,

    /// Allow any CORS origin
    #[serde(default)]
    pub cors_permissive: bool,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            debug_routes: false,
            cors_permissive: false,
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:3030".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProbeSection {
    /// Column used to delete trial rows
    #[serde(default = "default_key_column")]
    pub key_column: String,
}

impl Default for ProbeSection {
    fn default() -> Self {
        Self {
            key_column: default_key_column(),
        }
    }
}

fn default_key_column() -> String {
    "id".to_string()
}

impl CallctlConfig {
    /// Config file path: ~/.callctl/config.toml
    pub fn config_path() -> Option<PathBuf> {
        config_dir().map(|dir| dir.join("config.toml"))
    }

    /// Load ~/.callctl/config.toml, falling back to defaults when absent.
    pub fn load() -> Result<Self, ConfigError> {
        match Self::config_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(vars: &[(&str, &str)]) -> Settings {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_lookup(|name| map.get(name).cloned())
    }

    #[test]
    fn secret_is_redacted() {
        let s = Secret::new("eyJhbGciOiJIUzI1NiJ9.payload");
        assert_eq!(format!("{:?}", s), "Secret(***)");
        assert_eq!(s.to_string(), "***");
        assert_eq!(s.hint(), "eyJh…(28 chars)");
    }

    #[test]
    fn public_fallbacks_are_used() {
        let s = settings(&[
            ("NEXT_PUBLIC_SUPABASE_URL", "https://abc.supabase.co/"),
            ("NEXT_PUBLIC_SUPABASE_ANON_KEY", "anon"),
        ]);
        assert_eq!(s.require_supabase_url().unwrap(), "https://abc.supabase.co");
        assert_eq!(s.require_key(KeyRole::Anon).unwrap().expose(), "anon");
    }

    #[test]
    fn missing_key_names_the_variable() {
        let s = settings(&[("SUPABASE_SERVICE_ROLE_KEY", "   ")]);
        let err = s.require_key(KeyRole::ServiceRole).unwrap_err();
        assert!(err.to_string().contains("SUPABASE_SERVICE_ROLE_KEY"));
    }

    #[test]
    fn describe_never_leaks_secrets() {
        let s = settings(&[("VAPI_API_KEY", "vapi-secret-value")]);
        let rendered: Vec<String> = s.describe().into_iter().map(|(_, v)| v).collect();
        assert!(rendered.iter().all(|v| !v.contains("secret-value")));
    }

    #[test]
    fn file_config_defaults_and_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[server]\nbind = \"0.0.0.0:8080\"\ndebug_routes = true\n").unwrap();

        let config = CallctlConfig::load_from(&path).unwrap();
        assert_eq!(config.server.bind, "0.0.0.0:8080");
        assert!(config.server.debug_routes);
        assert!(!config.server.cors_permissive);
        assert_eq!(config.probe.key_column, "id");
    }

    #[test]
    fn invalid_toml_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[server\n").unwrap();

        assert!(matches!(
            CallctlConfig::load_from(&path),
            Err(ConfigError::Parse { .. })
        ));
    }
}
