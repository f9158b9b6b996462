use std::time::Duration;

use serde::Deserialize;
use strum::{Display, EnumString};

use crate::engine::EngineConfig;
use crate::poller::PollerConfig;

/// Provider environment selected by `SMILE_SID_SERVER`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum Environment {
    Sandbox,
    Production,
}

/// Where capture tokens are minted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignerMode {
    /// HMAC-signed JWT minted in-process.
    #[default]
    Local,
    /// Provider token endpoint.
    Remote,
}

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    /// Server bind address (e.g., "0.0.0.0:3000").
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Provider partner ID
    pub smile_partner_id: String,

    /// Provider API key (signs requests, tokens and callbacks)
    pub smile_api_key: String,

    /// "0" for sandbox, "1" for production
    #[serde(default = "default_sid_server")]
    pub smile_sid_server: String,

    /// Default callback URL registered with tokens and submissions
    pub smile_callback_url: Option<String>,

    /// Override for the provider API root
    pub smile_api_base_url: Option<String>,

    /// PostgreSQL connection string. In-memory job store when unset.
    pub database_url: Option<String>,

    #[serde(default)]
    pub signer_mode: SignerMode,

    #[serde(default = "default_token_timeout")]
    pub token_timeout_secs: u64,

    #[serde(default = "default_submit_timeout")]
    pub submit_timeout_secs: u64,

    #[serde(default = "default_poll_timeout")]
    pub poll_timeout_secs: u64,

    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Max age of TOKEN_ISSUED/SUBMITTED jobs; also the poll ceiling.
    #[serde(default = "default_job_max_age")]
    pub job_max_age_secs: u64,

    /// How long a poll-derived outcome waits for a callback before finalizing.
    #[serde(default = "default_reconcile_grace")]
    pub reconcile_grace_secs: u64,

    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_sid_server() -> String {
    "0".to_string()
}

fn default_token_timeout() -> u64 {
    15
}

fn default_submit_timeout() -> u64 {
    30
}

fn default_poll_timeout() -> u64 {
    10
}

fn default_poll_interval() -> u64 {
    3
}

fn default_job_max_age() -> u64 {
    300
}

fn default_reconcile_grace() -> u64 {
    5
}

fn default_sweep_interval() -> u64 {
    30
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    pub fn environment(&self) -> Environment {
        if self.smile_sid_server.trim() == "1" {
            Environment::Production
        } else {
            Environment::Sandbox
        }
    }

    pub fn provider_base_url(&self) -> String {
        self.smile_api_base_url.clone().unwrap_or_else(|| {
            crate::services::provider::ProviderClient::default_base_url(self.environment())
                .to_string()
        })
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            token_timeout: Duration::from_secs(self.token_timeout_secs),
            submit_timeout: Duration::from_secs(self.submit_timeout_secs),
            max_age: Duration::from_secs(self.job_max_age_secs),
            reconcile_grace: Duration::from_secs(self.reconcile_grace_secs),
            ..EngineConfig::default()
        }
    }

    pub fn poller_config(&self) -> PollerConfig {
        PollerConfig {
            interval: Duration::from_secs(self.poll_interval_secs.max(1)),
            attempt_timeout: Duration::from_secs(self.poll_timeout_secs),
        }
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(extra: &[(&str, &str)]) -> Vec<(String, String)> {
        let mut v = vec![
            ("SMILE_PARTNER_ID".to_string(), "1234".to_string()),
            ("SMILE_API_KEY".to_string(), "key".to_string()),
        ];
        v.extend(extra.iter().map(|(k, val)| (k.to_string(), val.to_string())));
        v
    }

    #[test]
    fn test_defaults() {
        let config: AppConfig = envy::from_iter(vars(&[])).unwrap();
        assert_eq!(config.bind_addr, "0.0.0.0:3000");
        assert_eq!(config.environment(), Environment::Sandbox);
        assert_eq!(config.signer_mode, SignerMode::Local);
        assert!(config.database_url.is_none());

        let engine = config.engine_config();
        assert_eq!(engine.token_timeout, Duration::from_secs(15));
        assert_eq!(engine.submit_timeout, Duration::from_secs(30));
        assert_eq!(engine.max_age, Duration::from_secs(300));
        assert_eq!(config.poller_config().attempt_timeout, Duration::from_secs(10));
        assert_eq!(
            config.provider_base_url(),
            "https://testapi.smileidentity.com/v1"
        );
    }

    #[test]
    fn test_production_and_overrides() {
        let config: AppConfig = envy::from_iter(vars(&[
            ("SMILE_SID_SERVER", "1"),
            ("SIGNER_MODE", "remote"),
            ("POLL_INTERVAL_SECS", "5"),
            ("SMILE_API_BASE_URL", "http://localhost:9000/v1"),
        ]))
        .unwrap();
        assert_eq!(config.environment(), Environment::Production);
        assert_eq!(config.signer_mode, SignerMode::Remote);
        assert_eq!(config.poller_config().interval, Duration::from_secs(5));
        assert_eq!(config.provider_base_url(), "http://localhost:9000/v1");
        assert_eq!(Environment::Production.to_string(), "production");
    }

    #[test]
    fn test_missing_credentials_rejected() {
        let result: Result<AppConfig, _> = envy::from_iter(Vec::<(String, String)>::new());
        assert!(result.is_err());
    }
}
