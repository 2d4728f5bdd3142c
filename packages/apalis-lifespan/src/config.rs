use serde::{Deserialize, Serialize};

use crate::{broker::BrokerRole, error::ConfigError};

/// Variable holding the application path
pub const APP_PATH_VAR: &str = "APALIS_LIFESPAN_APP";
/// Variable holding the broker role, `worker` or `client`
pub const ROLE_VAR: &str = "APALIS_LIFESPAN_ROLE";

/// Config for the lifespan bridge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeConfig {
    app_path: String,
    #[serde(default)]
    role: BrokerRole,
}

impl BridgeConfig {
    /// Create a new config for the application at `app_path`
    pub fn new(app_path: impl Into<String>) -> Self {
        Self {
            app_path: app_path.into(),
            role: BrokerRole::default(),
        }
    }

    /// Role of the broker built from this config
    ///
    /// Defaults to [`BrokerRole::Worker`]
    pub fn with_role(mut self, role: BrokerRole) -> Self {
        self.role = role;
        self
    }

    /// Gets the application path.
    pub fn app_path(&self) -> &str {
        &self.app_path
    }

    /// Gets the broker role.
    pub fn role(&self) -> BrokerRole {
        self.role
    }

    /// Load the config from `APALIS_LIFESPAN_APP` and `APALIS_LIFESPAN_ROLE`
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`BridgeConfig::from_env`], falling back to `default_app_path`
    /// when `APALIS_LIFESPAN_APP` is unset. An invalid role is still an error.
    pub fn from_env_or(default_app_path: &str) -> Result<Self, ConfigError> {
        Self::from_lookup_or(|key| std::env::var(key).ok(), default_app_path)
    }

    /// Load the config through `lookup`, which maps a variable name to its value
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let app_path = app_path_from(&lookup).ok_or(ConfigError::Missing(APP_PATH_VAR))?;
        Self::with_role_from(app_path, &lookup)
    }

    /// Like [`BridgeConfig::from_lookup`], with a fallback application path
    pub fn from_lookup_or<F>(lookup: F, default_app_path: &str) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let app_path = app_path_from(&lookup).unwrap_or_else(|| default_app_path.to_owned());
        Self::with_role_from(app_path, &lookup)
    }

    fn with_role_from<F>(app_path: String, lookup: &F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let role = match lookup(ROLE_VAR) {
            Some(role) => role.parse()?,
            None => BrokerRole::default(),
        };
        Ok(Self::new(app_path).with_role(role))
    }
}

fn app_path_from<F>(lookup: &F) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(APP_PATH_VAR)
        .map(|path| path.trim().to_owned())
        .filter(|path| !path.is_empty())
}
