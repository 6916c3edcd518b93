//! Process-wide configuration, read once at startup from the environment
//! (optionally seeded by a `.env` file in development, via `dotenvy`).

use sha2::{Digest, Sha256};

use crate::error::BrokerError;

const DEFAULT_STORE_ADDR: &str = "localhost:27017";
const DEFAULT_LISTEN_PORT: u16 = 7070;

pub struct Config {
    pub store_addr: String,
    pub listen_port: u16,
    pub admin_username: String,
    /// SHA-256 hex digest of the configured admin password. The plaintext
    /// value is never retained past startup.
    pub admin_password_hash: String,
}

impl Config {
    /// Loads configuration from the environment. `.env` is loaded first
    /// (if present) so local development doesn't require exporting vars
    /// into the shell. Missing mandatory variables are a startup-fatal
    /// error — the process refuses to bind rather than run with an
    /// unusable admin account.
    pub fn from_env() -> Result<Self, BrokerError> {
        let _ = dotenvy::dotenv();

        let store_addr =
            std::env::var("STORE_ADDR").unwrap_or_else(|_| DEFAULT_STORE_ADDR.to_string());

        let listen_port = match std::env::var("LISTEN_PORT") {
            Ok(raw) => raw
                .parse()
                .map_err(|_| BrokerError::Validation(format!("invalid LISTEN_PORT: {raw}")))?,
            Err(_) => DEFAULT_LISTEN_PORT,
        };

        let admin_username = std::env::var("ADMIN_USERNAME").map_err(|_| {
            BrokerError::Validation("ADMIN_USERNAME must be set".to_string())
        })?;

        let admin_password = std::env::var("ADMIN_PASSWORD").map_err(|_| {
            BrokerError::Validation("ADMIN_PASSWORD must be set".to_string())
        })?;

        Ok(Self {
            store_addr,
            listen_port,
            admin_username,
            admin_password_hash: hash_hex(&admin_password),
        })
    }

    /// Compares provided admin credentials against the configured pair.
    /// Both username and password must match (see the design spec's open
    /// question on this — an "either" predicate was considered and
    /// rejected as almost certainly a source bug).
    pub fn check_admin(&self, username: &str, password: &str) -> bool {
        username == self.admin_username && hash_hex(password) == self.admin_password_hash
    }
}

pub fn hash_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}
