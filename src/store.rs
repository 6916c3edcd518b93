//! Credential Store Adapter (C1).
//!
//! The real backing store is an external collaborator (a document database
//! exposing `pcs` and `users` collections, per the design spec) and is
//! intentionally not pulled into this crate. [`CredentialStore`] is the trait
//! boundary; [`InMemoryStore`] is the reference implementation, built on the
//! same concurrent-map primitive ([`DashMap`]) the rest of this crate already
//! uses for the session registry. A document-store-backed implementation can
//! satisfy the same trait without touching call sites.

use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::error::BrokerError;
use crate::permissions::Permissions;

/// Calls into the store are given this long to complete; exceeding it is
/// reported as [`BrokerError::StoreTimeout`].
pub const STORE_DEADLINE: Duration = Duration::from_secs(3);

/// Persisted Agent record: `{username, password, key}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRecord {
    pub username: String,
    pub password: String,
    pub key: String,
}

/// Persisted Operator record: `{username, password, pc_key, permissions}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperatorRecord {
    pub username: String,
    pub password: String,
    pub pc_key: String,
    #[serde(default)]
    pub permissions: Permissions,
}

#[async_trait]
pub trait CredentialStore: Send + Sync + 'static {
    async fn authenticate_agent(&self, username: &str, password: &str, key: &str) -> bool;

    async fn agent_exists(&self, key: &str) -> bool;

    async fn create_agent(&self, record: AgentRecord) -> Result<(), BrokerError>;

    async fn lookup_operator(
        &self,
        username: &str,
        password: &str,
        key: &str,
    ) -> Option<OperatorRecord>;

    async fn create_operator(
        &self,
        username: String,
        password: String,
        pc_key: String,
    ) -> Result<(), BrokerError>;

    async fn set_operator_permissions(
        &self,
        username: &str,
        permissions: Permissions,
    ) -> Result<(), BrokerError>;
}

/// In-process reference implementation. Agent records are keyed by `key`;
/// Operator records are keyed by `(username, pc_key)`, mirroring the
/// uniqueness constraint `create_operator` enforces.
#[derive(Default)]
pub struct InMemoryStore {
    agents: DashMap<String, AgentRecord>,
    operators: DashMap<(String, String), OperatorRecord>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CredentialStore for InMemoryStore {
    async fn authenticate_agent(&self, username: &str, password: &str, key: &str) -> bool {
        self.agents
            .get(key)
            .map(|rec| rec.username == username && rec.password == password)
            .unwrap_or(false)
    }

    async fn agent_exists(&self, key: &str) -> bool {
        self.agents.contains_key(key)
    }

    async fn create_agent(&self, record: AgentRecord) -> Result<(), BrokerError> {
        match self.agents.entry(record.key.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(BrokerError::PcConflict),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(record);
                Ok(())
            }
        }
    }

    async fn lookup_operator(
        &self,
        username: &str,
        password: &str,
        key: &str,
    ) -> Option<OperatorRecord> {
        self.operators
            .get(&(username.to_string(), key.to_string()))
            .filter(|rec| rec.password == password)
            .map(|rec| rec.value().clone())
    }

    async fn create_operator(
        &self,
        username: String,
        password: String,
        pc_key: String,
    ) -> Result<(), BrokerError> {
        if !self.agent_exists(&pc_key).await {
            return Err(BrokerError::UnknownPcKey(pc_key));
        }

        match self.operators.entry((username.clone(), pc_key.clone())) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(BrokerError::OperatorConflict),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(OperatorRecord {
                    username,
                    password,
                    pc_key,
                    permissions: Permissions::default(),
                });
                Ok(())
            }
        }
    }

    async fn set_operator_permissions(
        &self,
        username: &str,
        permissions: Permissions,
    ) -> Result<(), BrokerError> {
        let mut updated = false;
        for mut entry in self.operators.iter_mut() {
            if entry.key().0 == username {
                entry.value_mut().permissions = permissions.clone();
                updated = true;
            }
        }

        if updated {
            Ok(())
        } else {
            Err(BrokerError::Validation(format!(
                "no operator registered under username {username}"
            )))
        }
    }
}
