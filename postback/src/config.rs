use serde::Deserialize;

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum ValidationError {
    #[error("Port cannot be 0")]
    InvalidPort,

    #[error("Database URL cannot be empty")]
    EmptyDatabaseUrl,

    #[error("max_connections must be at least 1")]
    NoConnections,
}

fn default_max_connections() -> u32 {
    10
}

fn default_acquire_timeout_secs() -> u64 {
    5
}

fn default_bulk_load() -> bool {
    true
}

#[derive(Clone, Deserialize, Debug, PartialEq)]
#[serde(rename_all = "lowercase")]
#[serde(tag = "type")]
pub enum StoreType {
    Postgres {
        url: String,
        #[serde(default = "default_max_connections")]
        max_connections: u32,
        #[serde(default = "default_acquire_timeout_secs")]
        acquire_timeout_secs: u64,
        /// Create the `mapping` and `postback` tables on startup if missing.
        #[serde(default)]
        create_schema: bool,
    },
    Memory {
        #[serde(default = "default_bulk_load")]
        bulk_load: bool,
    },
}

#[derive(Clone, Deserialize, Debug, PartialEq)]
pub struct Store {
    #[serde(flatten)]
    pub r#type: StoreType,
}

#[derive(Clone, Deserialize, Debug, PartialEq)]
pub struct Listener {
    pub host: String,
    pub port: u16,
}

impl Listener {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.port == 0 {
            return Err(ValidationError::InvalidPort);
        }
        Ok(())
    }
}

impl Default for Listener {
    fn default() -> Self {
        Listener {
            host: "127.0.0.1".into(),
            port: 3000,
        }
    }
}

fn default_admin_listener() -> Listener {
    Listener {
        host: "127.0.0.1".into(),
        port: 3001,
    }
}

#[derive(Clone, Deserialize, Debug, PartialEq)]
pub struct Config {
    /// Serves the postback and mapping endpoints
    #[serde(default)]
    pub listener: Listener,
    /// Serves health and readiness probes
    #[serde(default = "default_admin_listener")]
    pub admin_listener: Listener,
    pub store: Store,
}

impl Config {
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.listener.validate()?;
        self.admin_listener.validate()?;

        if let StoreType::Postgres {
            url,
            max_connections,
            ..
        } = &self.store.r#type
        {
            if url.is_empty() {
                return Err(ValidationError::EmptyDatabaseUrl);
            }
            if *max_connections == 0 {
                return Err(ValidationError::NoConnections);
            }
        }

        Ok(())
    }
}
