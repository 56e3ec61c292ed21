//! Database connection management.

use surrealdb::Surreal;
use surrealdb::engine::any::{Any, connect as connect_any};
use surrealdb::opt::auth::Root;
use thiserror::Error;

/// Database connection handle. Cheap to clone; clones share the connection.
pub type Database = Surreal<Any>;

/// Database configuration.
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Connection mode: "mem://", "rocksdb://path" or a remote endpoint
    pub endpoint: String,
    /// Namespace to use
    pub namespace: String,
    /// Database name to use
    pub database: String,
    /// Optional root credentials for authentication
    pub credentials: Option<(String, String)>,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            endpoint: "mem://".to_string(),
            namespace: "jobs".to_string(),
            database: "main".to_string(),
            credentials: None,
        }
    }
}

impl DbConfig {
    /// Create a config for in-memory testing.
    pub fn memory() -> Self {
        Self::default()
    }

    /// Create a config for RocksDB persistence (requires rocksdb feature).
    pub fn rocksdb(path: impl Into<String>) -> Self {
        Self {
            endpoint: format!("rocksdb://{}", path.into()),
            ..Default::default()
        }
    }

    /// Build a config from environment variables.
    ///
    /// - `DB_ENDPOINT` (default: `mem://`)
    /// - `DB_NAMESPACE` (default: `jobs`)
    /// - `DB_DATABASE` (default: `main`)
    /// - `DB_USER` and `DB_PASS` (optional, both required to sign in)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let var = |name: &str| {
            std::env::var(name)
                .ok()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let credentials = match (var("DB_USER"), var("DB_PASS")) {
            (Some(user), Some(pass)) => Some((user, pass)),
            _ => None,
        };

        Self {
            endpoint: var("DB_ENDPOINT").unwrap_or(defaults.endpoint),
            namespace: var("DB_NAMESPACE").unwrap_or(defaults.namespace),
            database: var("DB_DATABASE").unwrap_or(defaults.database),
            credentials,
        }
    }

    /// Set the namespace.
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Set the database name.
    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = database.into();
        self
    }

    /// Set root credentials for authentication.
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.credentials = Some((username.into(), password.into()));
        self
    }
}

/// Database errors.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("Connection error: {0}")]
    Connection(#[from] surrealdb::Error),
    #[error("Query error: {0}")]
    Query(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Open a connection and select the configured namespace and database.
pub async fn connect(config: &DbConfig) -> Result<Database, DbError> {
    tracing::info!("Connecting to database: {}", config.endpoint);

    let db = connect_any(config.endpoint.as_str()).await?;

    // Authenticate if credentials provided
    if let Some((username, password)) = &config.credentials {
        db.signin(Root { username, password }).await?;
    }

    db.use_ns(config.namespace.as_str())
        .use_db(config.database.as_str())
        .await?;

    tracing::info!(
        "Connected to database: {}/{}",
        config.namespace,
        config.database
    );

    Ok(db)
}
