use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use super::StoreError;

/// Where a SQLite database lives.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SqliteLocation {
    /// Private in-memory database, discarded on close.
    Memory,
    /// Database file on disk.
    File(PathBuf),
}

/// Parsed connection string.
///
/// Accepts SQLAlchemy-style URIs: `sqlite:///relative.db`,
/// `sqlite:////abs/path.db`, `sqlite://` (memory), and `sqlite::memory:`.
/// A string with no scheme at all is taken as a SQLite file path. Other
/// schemes parse into [`ConnectionUri::Server`] so the caller can report
/// them as unsupported by name.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ConnectionUri {
    /// Embedded SQLite database.
    Sqlite(SqliteLocation),
    /// Client/server engine such as `postgresql://` or `mysql://`.
    Server {
        /// Scheme without any `+driver` suffix, lowercased.
        scheme: String,
        /// Original string.
        raw: String,
    },
}

impl ConnectionUri {
    /// Parses a connection string.
    pub fn parse(raw: &str) -> Result<Self, StoreError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(StoreError::InvalidUri(raw.to_string()));
        }
        if trimmed.eq_ignore_ascii_case("sqlite::memory:") {
            return Ok(ConnectionUri::Sqlite(SqliteLocation::Memory));
        }
        let Some((scheme, rest)) = trimmed.split_once("://") else {
            return Ok(ConnectionUri::Sqlite(SqliteLocation::File(PathBuf::from(
                trimmed,
            ))));
        };

        let scheme = scheme
            .split('+')
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase();
        if scheme.is_empty() || !scheme.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(StoreError::InvalidUri(raw.to_string()));
        }
        if scheme != "sqlite" {
            return Ok(ConnectionUri::Server {
                scheme,
                raw: trimmed.to_string(),
            });
        }

        // `sqlite:///x` has an empty host followed by the path `x`.
        let path = rest.strip_prefix('/').unwrap_or(rest);
        if path.is_empty() || path == ":memory:" {
            return Ok(ConnectionUri::Sqlite(SqliteLocation::Memory));
        }
        Ok(ConnectionUri::Sqlite(SqliteLocation::File(PathBuf::from(
            path,
        ))))
    }

    /// Engine name for logs and messages.
    pub fn engine_name(&self) -> &str {
        match self {
            ConnectionUri::Sqlite(_) => "sqlite",
            ConnectionUri::Server { scheme, .. } => scheme,
        }
    }
}

impl FromStr for ConnectionUri {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ConnectionUri::parse(s)
    }
}

impl fmt::Display for ConnectionUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionUri::Sqlite(SqliteLocation::Memory) => f.write_str("sqlite://"),
            ConnectionUri::Sqlite(SqliteLocation::File(path)) => {
                write!(f, "sqlite:///{}", path.display())
            }
            ConnectionUri::Server { scheme, .. } => write!(f, "{scheme}://…"),
        }
    }
}
