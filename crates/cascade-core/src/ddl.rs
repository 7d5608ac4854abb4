//! `ALTER CATALOG <name> RENAME <new-name>`.
//!
//! The statement is validated here and never enters the plan algebra. Checks run in a
//! fixed order so the first failing check decides the error the user sees.

use std::fmt;
use thiserror::Error;

/// Name of the built-in catalog. It cannot be renamed, and no catalog may take its name.
pub const INTERNAL_CATALOG: &str = "internal";

/// Longest accepted catalog name.
const MAX_NAME_LEN: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Privilege {
    Select,
    Alter,
    Create,
    Drop,
}

/// Answers privilege questions for the statement being analyzed.
pub trait PrivilegeChecker: Send + Sync {
    fn has_catalog_privilege(&self, user: &str, catalog: &str, privilege: Privilege) -> bool;
}

impl<F> PrivilegeChecker for F
where
    F: Fn(&str, &str, Privilege) -> bool + Send + Sync,
{
    fn has_catalog_privilege(&self, user: &str, catalog: &str, privilege: Privilege) -> bool {
        self(user, catalog, privilege)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DdlError {
    #[error("Incorrect {kind} name '{name}'")]
    InvalidName { kind: &'static str, name: String },

    #[error("Internal catalog can't be alter.")]
    InternalCatalogImmutable,

    #[error("Access denied for user '{user}' to catalog '{catalog}'")]
    AccessDenied { user: String, catalog: String },

    #[error("New catalog name is not set")]
    EmptyNewName,

    #[error("Cannot alter a catalog into a build-in name.")]
    ReservedName,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlterCatalogName {
    pub catalog_name: String,
    pub new_catalog_name: String,
}

impl AlterCatalogName {
    pub fn new(catalog_name: impl Into<String>, new_catalog_name: impl Into<String>) -> Self {
        Self {
            catalog_name: catalog_name.into(),
            new_catalog_name: new_catalog_name.into(),
        }
    }

    /// Validate the statement on behalf of `user`.
    pub fn analyze(&self, user: &str, privileges: &dyn PrivilegeChecker) -> Result<(), DdlError> {
        check_name("catalog", &self.catalog_name)?;

        if self.catalog_name == INTERNAL_CATALOG {
            return Err(DdlError::InternalCatalogImmutable);
        }

        if !privileges.has_catalog_privilege(user, &self.catalog_name, Privilege::Alter) {
            return Err(DdlError::AccessDenied {
                user: user.to_string(),
                catalog: self.catalog_name.clone(),
            });
        }

        if self.new_catalog_name.is_empty() {
            return Err(DdlError::EmptyNewName);
        }
        if self.new_catalog_name == INTERNAL_CATALOG {
            return Err(DdlError::ReservedName);
        }
        check_name("catalog", &self.new_catalog_name)
    }

    pub fn to_sql(&self) -> String {
        format!(
            "ALTER CATALOG {} RENAME {}",
            self.catalog_name, self.new_catalog_name
        )
    }
}

impl fmt::Display for AlterCatalogName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_sql())
    }
}

/// `^[A-Za-z][A-Za-z0-9_]{0,63}$`
fn check_name(kind: &'static str, name: &str) -> Result<(), DdlError> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) => {
            first.is_ascii_alphabetic()
                && name.len() <= MAX_NAME_LEN
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        None => false,
    };
    if valid {
        Ok(())
    } else {
        Err(DdlError::InvalidName {
            kind,
            name: name.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn allow_all(_: &str, _: &str, _: Privilege) -> bool {
        true
    }

    #[test]
    fn test_name_format() {
        assert!(check_name("catalog", "hive_1").is_ok());
        assert!(check_name("catalog", "H").is_ok());
        assert!(check_name("catalog", &"a".repeat(64)).is_ok());
        assert!(check_name("catalog", &"a".repeat(65)).is_err());
        assert!(check_name("catalog", "1hive").is_err());
        assert!(check_name("catalog", "_hive").is_err());
        assert!(check_name("catalog", "hive-prod").is_err());
        assert!(check_name("catalog", "").is_err());
    }

    #[test]
    fn test_checks_run_in_order() {
        let deny = |_: &str, _: &str, _: Privilege| false;

        // A malformed source name is reported before anything else.
        assert!(matches!(
            AlterCatalogName::new("bad-name", "internal").analyze("root", &deny),
            Err(DdlError::InvalidName { .. })
        ));
        // The internal catalog is rejected before privileges are consulted.
        assert_eq!(
            AlterCatalogName::new("internal", "foo").analyze("root", &deny),
            Err(DdlError::InternalCatalogImmutable)
        );
        assert_eq!(
            AlterCatalogName::new("c1", "").analyze("bob", &deny),
            Err(DdlError::AccessDenied {
                user: "bob".into(),
                catalog: "c1".into()
            })
        );
        assert_eq!(
            AlterCatalogName::new("c1", "").analyze("root", &allow_all),
            Err(DdlError::EmptyNewName)
        );
        assert_eq!(
            AlterCatalogName::new("c1", "internal").analyze("root", &allow_all),
            Err(DdlError::ReservedName)
        );
        assert!(matches!(
            AlterCatalogName::new("c1", "9lives").analyze("root", &allow_all),
            Err(DdlError::InvalidName { .. })
        ));
        assert_eq!(
            AlterCatalogName::new("c1", "c2").analyze("root", &allow_all),
            Ok(())
        );
    }

    #[test]
    fn test_privilege_is_checked_on_source_catalog() {
        let only_hive = |_: &str, catalog: &str, p: Privilege| catalog == "hive" && p == Privilege::Alter;
        assert!(AlterCatalogName::new("hive", "warehouse")
            .analyze("etl", &only_hive)
            .is_ok());
        assert!(AlterCatalogName::new("iceberg", "hive")
            .analyze("etl", &only_hive)
            .is_err());
    }

    #[test]
    fn test_to_sql() {
        let stmt = AlterCatalogName::new("hive", "warehouse");
        assert_eq!(stmt.to_sql(), "ALTER CATALOG hive RENAME warehouse");
        assert_eq!(stmt.to_string(), stmt.to_sql());
        assert_eq!(
            DdlError::InternalCatalogImmutable.to_string(),
            "Internal catalog can't be alter."
        );
    }
}
