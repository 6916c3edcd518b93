//! # Server State
//!
//! Holds the shared application state for the relay broker: the Session
//! Registry (C5/C6), the Credential Store Adapter (C1), and the loaded
//! [`Config`]. Cloned cheaply (everything is behind an `Arc`) into every
//! request handler and websocket task.

use std::sync::Arc;

use crate::config::Config;
use crate::registry::SessionRegistry;
use crate::store::CredentialStore;

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<SessionRegistry>,
    pub store: Arc<dyn CredentialStore>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(store: Arc<dyn CredentialStore>, config: Config) -> Self {
        Self {
            registry: SessionRegistry::spawn(),
            store,
            config: Arc::new(config),
        }
    }
}
