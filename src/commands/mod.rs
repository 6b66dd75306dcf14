//! User-level actions
//!
//! Each command validates its input, talks to the backend through the
//! shared client and records the outcome in the store. Errors come back as
//! `ApiError`; the caller decides how to surface them.

pub mod mashup;
pub mod session;
pub mod upload;

use std::sync::Arc;

use crate::engine::client::ApiClient;
use crate::error::ApiResult;
use crate::jobs::JobPoller;
use crate::services::settings::Settings;
use crate::store::{self, AppStore, SharedStore};

/// Everything a command needs: client, store and settings.
#[derive(Clone)]
pub struct AppContext {
    pub client: Arc<ApiClient>,
    pub store: SharedStore,
    pub settings: Settings,
}

impl AppContext {
    pub fn new(settings: Settings) -> ApiResult<Self> {
        let client = ApiClient::from_settings(&settings)?;
        Ok(Self {
            client: Arc::new(client),
            store: store::shared(AppStore::new()),
            settings,
        })
    }

    pub fn poller(&self) -> JobPoller<ApiClient> {
        JobPoller::new(
            Arc::clone(&self.client),
            Arc::clone(&self.store),
            self.settings.poll_interval(),
        )
    }

    /// Read from the store under its lock.
    pub fn with_store<T>(&self, f: impl FnOnce(&AppStore) -> T) -> T {
        f(&store::lock(&self.store))
    }

    /// Mutate the store under its lock.
    pub fn update_store<T>(&self, f: impl FnOnce(&mut AppStore) -> T) -> T {
        f(&mut store::lock(&self.store))
    }
}
