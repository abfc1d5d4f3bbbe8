//! Connection-related data models.

use serde::{Deserialize, Serialize};

/// Supported database backends.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseType {
    #[value(name = "postgres", alias = "postgresql")]
    PostgreSQL,
    /// Includes MariaDB
    #[default]
    #[value(name = "mysql", alias = "mariadb")]
    MySQL,
    #[value(name = "sqlite")]
    SQLite,
}

impl DatabaseType {
    /// Parse database type from a connection URL scheme.
    pub fn from_connection_string(connection_string: &str) -> Option<Self> {
        let lower = connection_string.to_lowercase();
        if lower.starts_with("postgres://") || lower.starts_with("postgresql://") {
            Some(Self::PostgreSQL)
        } else if lower.starts_with("mysql://") || lower.starts_with("mariadb://") {
            Some(Self::MySQL)
        } else if lower.starts_with("sqlite://") || lower.starts_with("sqlite:") {
            Some(Self::SQLite)
        } else {
            None
        }
    }

    /// Get the display name for this database type.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::PostgreSQL => "PostgreSQL",
            Self::MySQL => "MySQL",
            Self::SQLite => "SQLite",
        }
    }

    /// Get the default port for this database type.
    pub fn default_port(&self) -> Option<u16> {
        match self {
            Self::PostgreSQL => Some(5432),
            Self::MySQL => Some(3306),
            Self::SQLite => None,
        }
    }
}

impl std::fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// Information about a created pool, returned by `Pool::create`.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionInfo {
    pub database_type: DatabaseType,
    pub server_version: Option<String>,
    pub database: String,
    pub min_size: u32,
    pub max_size: u32,
    pub autocommit: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_connection_string() {
        assert_eq!(
            DatabaseType::from_connection_string("mysql://u:p@localhost/db"),
            Some(DatabaseType::MySQL)
        );
        assert_eq!(
            DatabaseType::from_connection_string("MariaDB://localhost/db"),
            Some(DatabaseType::MySQL)
        );
        assert_eq!(
            DatabaseType::from_connection_string("postgresql://localhost/db"),
            Some(DatabaseType::PostgreSQL)
        );
        assert_eq!(
            DatabaseType::from_connection_string("sqlite::memory:"),
            Some(DatabaseType::SQLite)
        );
        assert_eq!(DatabaseType::from_connection_string("redis://x"), None);
    }

    #[test]
    fn test_default_ports() {
        assert_eq!(DatabaseType::MySQL.default_port(), Some(3306));
        assert_eq!(DatabaseType::PostgreSQL.default_port(), Some(5432));
        assert_eq!(DatabaseType::SQLite.default_port(), None);
        assert_eq!(DatabaseType::default(), DatabaseType::MySQL);
    }
}
