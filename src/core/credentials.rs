use std::collections::HashMap;

pub const PRIVATE_KEY: &str = "PRIVATE_KEY";
pub const ETH_RPC_URL: &str = "ETH_RPC_URL";
pub const DEPLOYER_ADDRESS: &str = "DEPLOYER_ADDRESS";

/// Address value used when the node never printed one.
pub const UNKNOWN_ADDRESS: &str = "unknown";

/// Credentials of the node's first pre-funded account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub private_key: String,
    pub address: String,
    pub rpc_url: String,
}

/// Name/value overlay handed to every script the shell launches.
///
/// Holds the three canonical entries published by the supervisor plus anything
/// added with `env add`. Writes are last-write-wins and never validated.
#[derive(Debug, Clone, Default)]
pub struct CredentialStore {
    vars: HashMap<String, String>,
}

impl CredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the canonical entries from the process environment.
    ///
    /// One-shot subcommands have no supervisor of their own; they pick up
    /// whatever a parent shell exported.
    pub fn from_process_env() -> Self {
        let mut store = Self::new();
        for name in [PRIVATE_KEY, ETH_RPC_URL, DEPLOYER_ADDRESS] {
            if let Ok(value) = std::env::var(name) {
                store.set(name, value);
            }
        }
        store
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(name.into(), value.into());
    }

    pub fn publish(&mut self, credentials: &Credentials) {
        self.set(PRIVATE_KEY, credentials.private_key.as_str());
        self.set(ETH_RPC_URL, credentials.rpc_url.as_str());
        self.set(DEPLOYER_ADDRESS, credentials.address.as_str());
    }

    /// The canonical entries, if a private key has been published.
    pub fn canonical(&self) -> Option<Credentials> {
        let private_key = self.get(PRIVATE_KEY)?.to_string();
        Some(Credentials {
            private_key,
            address: self.get(DEPLOYER_ADDRESS).unwrap_or(UNKNOWN_ADDRESS).to_string(),
            rpc_url: self.get(ETH_RPC_URL).unwrap_or_default().to_string(),
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}
