//! Shared request-path state.

use std::sync::Arc;

use crate::cache::{CacheEntry, CacheStore};
use crate::coalesce::Coalescer;
use crate::config::ProxyConfig;
use crate::error::ProxyError;
use crate::http::origin::OriginClient;
use crate::security::{Blacklist, BlacklistError};

/// Coalesces origin fetches by cache key.
pub type FetchGroup = Coalescer<Arc<CacheEntry>, ProxyError>;

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error(transparent)]
    Blacklist(#[from] BlacklistError),
    #[error("failed to build origin client: {0}")]
    Origin(#[from] rustls::Error),
}

/// Injected into every handler. Cheap to clone.
#[derive(Clone)]
pub struct ProxyState {
    pub config: Arc<ProxyConfig>,
    pub blacklist: Arc<Blacklist>,
    pub store: Arc<dyn CacheStore>,
    pub fetches: Arc<FetchGroup>,
    pub origin: OriginClient,
}

impl ProxyState {
    /// Compile the blacklist and build the origin client around `store`.
    pub fn new(config: ProxyConfig, store: Arc<dyn CacheStore>) -> Result<Self, StateError> {
        let blacklist = Blacklist::compile(&config.blacklist)?;
        if blacklist.is_empty() {
            tracing::debug!("No blacklist patterns; every path is cacheable");
        } else {
            tracing::info!(patterns = blacklist.len(), "Blacklist compiled");
        }
        let origin = OriginClient::new(&config.server, &config.origin)?;

        Ok(Self {
            config: Arc::new(config),
            blacklist: Arc::new(blacklist),
            store,
            fetches: Arc::new(FetchGroup::new()),
            origin,
        })
    }
}
