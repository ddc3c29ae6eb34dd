//! Provider registry resolving provider names to clients

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use vidhost_core::{Config, ProviderKind, VideoError, VideoResult};

use crate::mux::MuxClient;
use crate::traits::ProviderClient;
use crate::vimeo::VimeoClient;

/// Registry of provider clients keyed by provider kind.
///
/// Clients are built once from configuration and shared behind `Arc`, so every
/// resolve of the same name returns the same client.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    clients: Arc<RwLock<HashMap<ProviderKind, Arc<dyn ProviderClient>>>>,
}

impl ProviderRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a client for every provider whose credentials are configured.
    pub fn from_config(config: &Config) -> VideoResult<Self> {
        let mut clients: HashMap<ProviderKind, Arc<dyn ProviderClient>> = HashMap::new();

        if let Some(credentials) = &config.mux.credentials {
            let client = MuxClient::new(
                credentials.clone(),
                &config.mux.api_base_url,
                config.http_timeout(),
            )?;
            clients.insert(ProviderKind::Mux, Arc::new(client));
        }

        if let Some(token) = &config.vimeo.access_token {
            let client = VimeoClient::new(
                token.clone(),
                &config.vimeo.api_base_url,
                config.vimeo.folder_id.clone(),
                config.http_timeout(),
            )?;
            clients.insert(ProviderKind::Vimeo, Arc::new(client));
        }

        tracing::debug!(
            configured = ?clients.keys().collect::<Vec<_>>(),
            "Provider registry built"
        );

        Ok(Self {
            clients: Arc::new(RwLock::new(clients)),
        })
    }

    /// Register a client, replacing any client of the same kind
    pub async fn register(&self, client: Arc<dyn ProviderClient>) {
        let mut clients = self.clients.write().await;
        clients.insert(client.kind(), client);
    }

    /// Resolve a provider name (case-insensitive) to its client.
    ///
    /// Unknown names fail with `UnsupportedProvider`; known providers without
    /// credentials fail with `Configuration`.
    pub async fn resolve(&self, name: &str) -> VideoResult<Arc<dyn ProviderClient>> {
        let kind: ProviderKind = name.parse()?;
        self.get(kind).await
    }

    pub async fn get(&self, kind: ProviderKind) -> VideoResult<Arc<dyn ProviderClient>> {
        let clients = self.clients.read().await;
        clients.get(&kind).cloned().ok_or_else(|| {
            VideoError::Configuration(format!("{} credentials are not configured", kind))
        })
    }

    /// Every provider this build can talk to
    pub fn supported() -> &'static [ProviderKind] {
        &ProviderKind::ALL
    }

    /// Providers with a registered client, in a stable order
    pub async fn configured(&self) -> Vec<ProviderKind> {
        let clients = self.clients.read().await;
        ProviderKind::ALL
            .iter()
            .copied()
            .filter(|kind| clients.contains_key(kind))
            .collect()
    }
}
