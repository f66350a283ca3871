use std::sync::Arc;

use calshare_core::account::{AccountTtls, Accounts};
use calshare_core::config::ServerConfig;
use calshare_core::holiday::HolidayClient;
use calshare_core::invitation::Invitations;
use calshare_core::mailer::{HttpMailer, LogMailer, Mailer};
use calshare_core::token::TokenSigner;
use calshare_core::{CalShareError, CalShareResult, Store};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<Store>,
    pub signer: Arc<TokenSigner>,
    pub accounts: Arc<Accounts>,
    pub invitations: Arc<Invitations>,
    pub holidays: Arc<HolidayClient>,
}

impl AppState {
    /// Build state around an already opened store and a mail transport.
    pub fn new(config: &ServerConfig, store: Store, mailer: Arc<dyn Mailer>) -> CalShareResult<Self> {
        let store = Arc::new(store);
        let signer = Arc::new(TokenSigner::new(config.token.secret.as_bytes()));
        let accounts = Accounts::new(
            store.clone(),
            mailer.clone(),
            signer.clone(),
            AccountTtls::from_config(&config.token)?,
            config.client_url.clone(),
        );
        let invitations = Invitations::new(
            store.clone(),
            mailer,
            signer.clone(),
            config.token.invite_ttl()?,
            config.client_url.clone(),
        );

        Ok(AppState {
            store,
            signer,
            accounts: Arc::new(accounts),
            invitations: Arc::new(invitations),
            holidays: Arc::new(HolidayClient::new(config.holidays.clone())),
        })
    }

    /// Open the configured database and pick a mail transport.
    pub fn from_config(config: &ServerConfig) -> CalShareResult<Self> {
        let store = Store::open(&config.database)?;

        let mailer: Arc<dyn Mailer> = if config.mail.is_configured() {
            Arc::new(HttpMailer::new(&config.mail))
        } else {
            tracing::warn!("mail API not configured; emails will only be logged");
            Arc::new(LogMailer)
        };

        Self::new(config, store, mailer)
    }
}

/// Run synchronous work (SQLite queries, password hashing) on tokio's
/// blocking pool so it does not stall the async workers.
pub async fn blocking<T, F>(work: F) -> CalShareResult<T>
where
    F: FnOnce() -> CalShareResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| CalShareError::Task(e.to_string()))?
}
