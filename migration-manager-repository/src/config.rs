//! Configuration for the SQLite backend.

/// Connection settings for [`crate::sqlite::SqliteRepository`].
#[derive(Debug, Clone)]
pub struct SqliteConfig {
    /// A `sqlite://` URL; the file is created if missing.
    pub url: String,
    /// Pool size. SQLite serialises writers, so more than one connection only
    /// helps concurrent readers.
    pub max_connections: u32,
}

impl SqliteConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_connections: 1,
        }
    }

    pub fn with_max_connections(mut self, max_connections: u32) -> Self {
        self.max_connections = max_connections.max(1);
        self
    }
}
