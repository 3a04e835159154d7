//! Validated identifiers for catalog objects.
//!
//! Namespace and table names follow the table-bucket naming rules, which are
//! the strictest of the catalogs floe talks to:
//! - Between 1 and 255 characters
//! - Lowercase ASCII letters, digits and underscores
//! - Must start and end with a letter or digit
//!
//! # Example
//!
//! ```rust
//! use floe_core::ident::{NamespaceIdent, TableIdent};
//!
//! let table = TableIdent::new(NamespaceIdent::new(["sales"]).unwrap(), "orders").unwrap();
//! assert_eq!(table.to_string(), "sales.orders");
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};

const MAX_NAME_LEN: usize = 255;
const MAX_ACCOUNT_LEN: usize = 64;

/// A namespace identifier, represented as a list of levels.
///
/// `["accounting", "tax"]` is rendered as `accounting.tax`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NamespaceIdent(Vec<String>);

impl NamespaceIdent {
    /// Creates a namespace from its levels after validating each one.
    ///
    /// # Errors
    ///
    /// Returns an error if there are no levels or any level is invalid.
    pub fn new<I, S>(levels: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let levels: Vec<String> = levels.into_iter().map(Into::into).collect();
        if levels.is_empty() {
            return Err(Error::invalid_id("namespace must have at least one level"));
        }
        for level in &levels {
            validate_name("namespace", level)?;
        }
        Ok(Self(levels))
    }

    /// Parses a dotted namespace such as `accounting.tax`.
    ///
    /// # Errors
    ///
    /// Returns an error if any level is invalid.
    pub fn parse(dotted: &str) -> Result<Self> {
        Self::new(dotted.split('.'))
    }

    /// Returns the namespace levels.
    #[must_use]
    pub fn levels(&self) -> &[String] {
        &self.0
    }
}

impl fmt::Display for NamespaceIdent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("."))
    }
}

/// Table identifier with namespace and name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TableIdent {
    namespace: NamespaceIdent,
    name: String,
}

impl TableIdent {
    /// Creates a new table identifier.
    ///
    /// # Errors
    ///
    /// Returns an error if the table name is invalid.
    pub fn new(namespace: NamespaceIdent, name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        validate_name("table", &name)?;
        Ok(Self { namespace, name })
    }

    /// Parses `namespace.table` (the last dotted segment is the table name).
    ///
    /// # Errors
    ///
    /// Returns an error if the input has no namespace part or any segment is
    /// invalid.
    pub fn parse(dotted: &str) -> Result<Self> {
        let (namespace, name) = dotted.rsplit_once('.').ok_or_else(|| {
            Error::invalid_id(format!(
                "table identifier '{dotted}' must have the form namespace.table"
            ))
        })?;
        Self::new(NamespaceIdent::parse(namespace)?, name)
    }

    /// Returns the namespace containing the table.
    #[must_use]
    pub fn namespace(&self) -> &NamespaceIdent {
        &self.namespace
    }

    /// Returns the table name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for TableIdent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.namespace, self.name)
    }
}

/// The account (tenant) that owns the warehouse.
///
/// Account IDs must be non-empty, at most 64 characters, and contain only
/// ASCII letters, digits and hyphens.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(String);

impl AccountId {
    /// Creates a new account ID after validating the format.
    ///
    /// # Errors
    ///
    /// Returns an error if the account ID is invalid.
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(Error::invalid_id("account ID cannot be empty"));
        }
        if id.len() > MAX_ACCOUNT_LEN {
            return Err(Error::invalid_id(format!(
                "account ID '{id}' is too long (maximum {MAX_ACCOUNT_LEN} characters)"
            )));
        }
        if !id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            return Err(Error::invalid_id(format!(
                "account ID '{id}' contains invalid characters"
            )));
        }
        Ok(Self(id))
    }

    /// Returns the account ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for AccountId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

fn validate_name(kind: &str, name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::invalid_id(format!("{kind} name cannot be empty")));
    }

    if name.len() > MAX_NAME_LEN {
        return Err(Error::invalid_id(format!(
            "{kind} name '{name}' is too long (maximum {MAX_NAME_LEN} characters)"
        )));
    }

    if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
    {
        return Err(Error::invalid_id(format!(
            "{kind} name '{name}' contains invalid characters (only lowercase letters, digits, and underscores allowed)"
        )));
    }

    if name.starts_with('_') || name.ends_with('_') {
        return Err(Error::invalid_id(format!(
            "{kind} name '{name}' must start and end with a letter or digit"
        )));
    }

    Ok(())
}
