use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifies one physical database connection target.
///
/// Equality, ordering and hashing use all five fields. The password is
/// never part of the `Display` or `Debug` output.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Location {
    pub ip: String,
    pub port: u16,
    pub db_id: String,
    pub user: String,
    #[serde(default)]
    pub password: String,
}

impl Location {
    #[must_use]
    pub fn new(
        ip: impl Into<String>,
        port: u16,
        db_id: impl Into<String>,
        user: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            ip: ip.into(),
            port,
            db_id: db_id.into(),
            user: user.into(),
            password: password.into(),
        }
    }

    /// A local database file (or `:memory:`) addressed only by its path.
    #[must_use]
    pub fn sqlite(path: impl Into<String>) -> Self {
        Self::new("localhost", 0, path, "", "")
    }

    /// Render the Location, optionally including the password.
    #[must_use]
    pub fn describe(&self, with_password: bool) -> String {
        if with_password {
            format!("{self} PASSWORD = [{}]", self.password)
        } else {
            self.to_string()
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "DB_ID = [{}] PORT = [{}] IP = [{}] USER = [{}]",
            self.db_id, self.port, self.ip, self.user
        )
    }
}

impl fmt::Debug for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Location")
            .field("ip", &self.ip)
            .field("port", &self.port)
            .field("db_id", &self.db_id)
            .field("user", &self.user)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_takes_part_in_identity_but_not_display() {
        let a = Location::new("127.0.0.1", 3306, "orders", "app", "one");
        let b = Location::new("127.0.0.1", 3306, "orders", "app", "two");
        assert_ne!(a, b);
        assert_eq!(
            a.to_string(),
            "DB_ID = [orders] PORT = [3306] IP = [127.0.0.1] USER = [app]"
        );
        assert!(!format!("{a:?}").contains("one"));
        assert!(a.describe(true).ends_with("PASSWORD = [one]"));
    }

    #[test]
    fn deserializes_without_password() -> Result<(), serde_json::Error> {
        let loc: Location = serde_json::from_str(
            r#"{"ip":"db1","port":50000,"db_id":"SAMPLE","user":"db2inst1"}"#,
        )?;
        assert_eq!(loc.port, 50000);
        assert!(loc.password.is_empty());
        Ok(())
    }
}
