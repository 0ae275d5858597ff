//! Service principal credentials from the environment.

use thiserror::Error;

pub const CLIENT_ID: &str = "CLIENT_ID";
pub const CLIENT_SECRET: &str = "CLIENT_SECRET";
pub const TENANT_ID: &str = "TENANT_ID";
pub const SUBSCRIPTION_ID: &str = "SUBSCRIPTION_ID";

/// Subscription used by anonymous runs.
pub const ZERO_SUBSCRIPTION: &str = "00000000-0000-0000-0000-000000000000";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CredentialsError {
    #[error("Missing environment variable(s): {}", .0.join(", "))]
    Missing(Vec<&'static str>),
}

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
    pub tenant_id: String,
    pub subscription_id: String,
}

impl Credentials {
    pub fn from_env() -> Result<Self, CredentialsError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolve all variables through `lookup`. Empty values count as missing,
    /// and every missing variable is reported at once.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, CredentialsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut missing = Vec::new();
        let mut get = |key: &'static str| match lookup(key) {
            Some(value) if !value.trim().is_empty() => value,
            _ => {
                missing.push(key);
                String::new()
            }
        };

        let credentials = Self {
            client_id: get(CLIENT_ID),
            client_secret: get(CLIENT_SECRET),
            tenant_id: get(TENANT_ID),
            subscription_id: get(SUBSCRIPTION_ID),
        };

        if missing.is_empty() {
            Ok(credentials)
        } else {
            Err(CredentialsError::Missing(missing))
        }
    }

    pub fn anonymous() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            tenant_id: String::new(),
            subscription_id: ZERO_SUBSCRIPTION.to_string(),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("tenant_id", &self.tenant_id)
            .field("subscription_id", &self.subscription_id)
            .finish()
    }
}
