use std::sync::Arc;

use crate::config::{AppConfig, Environment, SignerMode};
use crate::db;
use crate::engine::LifecycleEngine;
use crate::poller::{PollerConfig, ReconciliationPoller};
use crate::services::audit::{IncidentLog, RecentCallbacks};
use crate::services::clock::SystemClock;
use crate::services::provider::{ProviderClient, ProviderError};
use crate::services::signer::{HmacSigner, Signer};
use crate::store::{JobStore, MemoryJobStore, PgJobStore};

/// Callbacks kept for the debug view.
pub const RECENT_CALLBACKS: usize = 20;
/// Incidents kept for operators.
pub const INCIDENT_CAPACITY: usize = 500;

/// Partner identity and callback policy the routes need.
#[derive(Debug, Clone)]
pub struct PartnerSettings {
    pub partner_id: String,
    pub api_key: String,
    pub environment: Environment,
    /// Reject callbacks without a valid `x-smile-signature` header.
    pub verify_callback_signatures: bool,
}

impl PartnerSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        let environment = config.environment();
        Self {
            partner_id: config.smile_partner_id.clone(),
            api_key: config.smile_api_key.clone(),
            environment,
            verify_callback_signatures: environment == Environment::Production,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    #[error("Database setup failed: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Provider client setup failed: {0}")]
    Provider(#[from] ProviderError),
}

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<LifecycleEngine>,
    pub poller: Arc<ReconciliationPoller>,
    pub callbacks: Arc<RecentCallbacks>,
    pub settings: Arc<PartnerSettings>,
}

impl AppState {
    pub fn new(
        engine: Arc<LifecycleEngine>,
        poller_config: PollerConfig,
        settings: PartnerSettings,
    ) -> Self {
        Self {
            poller: Arc::new(ReconciliationPoller::new(Arc::clone(&engine), poller_config)),
            engine,
            callbacks: Arc::new(RecentCallbacks::new(RECENT_CALLBACKS)),
            settings: Arc::new(settings),
        }
    }

    pub fn incidents(&self) -> &Arc<IncidentLog> {
        self.engine.incidents()
    }

    /// Wire the store, signer and provider client described by `config`.
    pub async fn from_config(config: &AppConfig) -> Result<Self, BootstrapError> {
        let store: Arc<dyn JobStore> = match &config.database_url {
            Some(url) => {
                tracing::info!("Connecting to PostgreSQL job store");
                let pool = db::init_pool(url).await?;
                tracing::info!("Running database migrations");
                db::run_migrations(&pool).await?;
                Arc::new(PgJobStore::new(pool))
            }
            None => {
                tracing::warn!("DATABASE_URL not set, jobs are kept in memory only");
                Arc::new(MemoryJobStore::new())
            }
        };

        let environment = config.environment();
        let provider = Arc::new(ProviderClient::new(
            config.provider_base_url(),
            &config.smile_partner_id,
            &config.smile_api_key,
            environment,
            config.smile_callback_url.clone(),
        )?);

        let signer: Arc<dyn Signer> = match config.signer_mode {
            SignerMode::Local => Arc::new(HmacSigner::new(
                &config.smile_partner_id,
                &config.smile_api_key,
                environment,
                config.smile_callback_url.clone(),
            )),
            SignerMode::Remote => provider.clone(),
        };

        tracing::info!(
            environment = %environment,
            signer = ?config.signer_mode,
            provider = %config.provider_base_url(),
            "Lifecycle engine configured"
        );

        let engine = Arc::new(LifecycleEngine::new(
            store,
            signer,
            provider,
            Arc::new(IncidentLog::new(INCIDENT_CAPACITY)),
            Arc::new(SystemClock),
            config.engine_config(),
        ));

        Ok(Self::new(
            engine,
            config.poller_config(),
            PartnerSettings::from_config(config),
        ))
    }
}
