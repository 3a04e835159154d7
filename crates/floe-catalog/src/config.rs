//! Catalog client configuration.
//!
//! Configuration is plain data. [`CatalogConfig::from_env`] reads the
//! `FLOE_*` variables, and [`CatalogConfig::validate`] rejects defects before
//! any network call is made.
//!
//! | Variable | Default |
//! |----------|---------|
//! | `FLOE_REGION` (or `AWS_REGION`) | required |
//! | `FLOE_TABLE_BUCKET` | required |
//! | `FLOE_CATALOG` | `s3tablescatalog` |
//! | `FLOE_ENDPOINT` | `https://glue.{region}.amazonaws.com/iceberg` |
//! | `FLOE_SIGV4` | `true` |
//! | `FLOE_SIGNING_NAME` | `glue` |
//! | `FLOE_SIGNING_REGION` | the catalog region |
//! | `FLOE_REQUEST_TIMEOUT_SECS` | `30` |
//! | `FLOE_COMMIT_MAX_ATTEMPTS` | `5` |
//! | `FLOE_CREATE_NAMESPACE` | `true` |

use std::time::Duration;

use floe_core::AccountId;

use crate::error::{CatalogError, Result};

/// Default catalog name inside the account.
pub const DEFAULT_CATALOG_NAME: &str = "s3tablescatalog";

/// Default service name used for request signing.
pub const DEFAULT_SIGNING_NAME: &str = "glue";

/// Default per-round-trip timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Default commit attempt limit.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

const BACKOFF_BASE: Duration = Duration::from_millis(100);
const BACKOFF_MAX: Duration = Duration::from_secs(5);

/// Settings for a catalog session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogConfig {
    /// Catalog name within the account.
    pub catalog_name: String,
    /// Table bucket holding the tables.
    pub table_bucket: String,
    /// Region of the catalog endpoint.
    pub region: String,
    /// Endpoint override; derived from the region when absent.
    pub endpoint: Option<String>,
    /// Request signing settings.
    pub signing: SigningConfig,
    /// Upper bound on each catalog round trip.
    pub request_timeout: Duration,
    /// Commit retry policy.
    pub retry: RetryPolicy,
    /// Whether `ensure_table` creates the namespace first.
    pub create_namespace: bool,
}

impl CatalogConfig {
    /// Creates a configuration with defaults for everything but region and
    /// bucket.
    #[must_use]
    pub fn new(region: impl Into<String>, table_bucket: impl Into<String>) -> Self {
        Self {
            catalog_name: DEFAULT_CATALOG_NAME.to_string(),
            table_bucket: table_bucket.into(),
            region: region.into(),
            endpoint: None,
            signing: SigningConfig::default(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            retry: RetryPolicy::default(),
            create_namespace: true,
        }
    }

    /// Sets the catalog name.
    #[must_use]
    pub fn with_catalog_name(mut self, name: impl Into<String>) -> Self {
        self.catalog_name = name.into();
        self
    }

    /// Sets an explicit endpoint.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Sets the per-round-trip timeout.
    #[must_use]
    pub const fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets the commit retry policy.
    #[must_use]
    pub const fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the signing configuration.
    #[must_use]
    pub fn with_signing(mut self, signing: SigningConfig) -> Self {
        self.signing = signing;
        self
    }

    /// Returns the catalog endpoint, derived from the region if not set.
    #[must_use]
    pub fn endpoint(&self) -> String {
        self.endpoint
            .clone()
            .unwrap_or_else(|| format!("https://glue.{}.amazonaws.com/iceberg", self.region))
    }

    /// Returns the region used for signing catalog requests.
    #[must_use]
    pub fn signing_region(&self) -> &str {
        self.signing.signing_region.as_deref().unwrap_or(&self.region)
    }

    /// Builds the warehouse identifier for an account:
    /// `{account}:{catalog}/{bucket}`.
    #[must_use]
    pub fn warehouse(&self, account: &AccountId) -> String {
        format!("{account}:{}/{}", self.catalog_name, self.table_bucket)
    }

    /// Checks the configuration for defects.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::InvalidConfig`] describing the first defect.
    pub fn validate(&self) -> Result<()> {
        require_segment("region", &self.region)?;
        require_segment("catalog name", &self.catalog_name)?;
        require_segment("table bucket", &self.table_bucket)?;

        if let Some(endpoint) = &self.endpoint {
            if !(endpoint.starts_with("https://") || endpoint.starts_with("http://")) {
                return Err(CatalogError::config(format!(
                    "endpoint '{endpoint}' must be an http(s) URL"
                )));
            }
        }
        if self.signing.enabled && self.signing.signing_name.trim().is_empty() {
            return Err(CatalogError::config(
                "signing name cannot be empty when signing is enabled",
            ));
        }
        if self.request_timeout.is_zero() {
            return Err(CatalogError::config("request timeout must be positive"));
        }
        if self.retry.max_attempts == 0 {
            return Err(CatalogError::config("commit max attempts must be at least 1"));
        }
        Ok(())
    }

    /// Loads configuration from `FLOE_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::InvalidConfig`] if a required variable is
    /// missing, a value fails to parse, or the result fails validation.
    pub fn from_env() -> Result<Self> {
        let region = env_string("FLOE_REGION")
            .or_else(|| env_string("AWS_REGION"))
            .ok_or_else(|| CatalogError::config("FLOE_REGION (or AWS_REGION) must be set"))?;
        let bucket = env_string("FLOE_TABLE_BUCKET")
            .ok_or_else(|| CatalogError::config("FLOE_TABLE_BUCKET must be set"))?;

        let mut config = Self::new(region, bucket);
        if let Some(catalog) = env_string("FLOE_CATALOG") {
            config.catalog_name = catalog;
        }
        config.endpoint = env_string("FLOE_ENDPOINT");
        if let Some(enabled) = env_bool("FLOE_SIGV4")? {
            config.signing.enabled = enabled;
        }
        if let Some(name) = env_string("FLOE_SIGNING_NAME") {
            config.signing.signing_name = name;
        }
        config.signing.signing_region = env_string("FLOE_SIGNING_REGION");
        if let Some(secs) = env_u64("FLOE_REQUEST_TIMEOUT_SECS")? {
            config.request_timeout = Duration::from_secs(secs);
        }
        if let Some(attempts) = env_u32("FLOE_COMMIT_MAX_ATTEMPTS")? {
            config.retry.max_attempts = attempts;
        }
        if let Some(create) = env_bool("FLOE_CREATE_NAMESPACE")? {
            config.create_namespace = create;
        }

        config.validate()?;
        Ok(config)
    }
}

fn require_segment(what: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(CatalogError::config(format!("{what} cannot be empty")));
    }
    if value.contains('/') || value.contains(':') {
        return Err(CatalogError::config(format!(
            "{what} '{value}' cannot contain '/' or ':'"
        )));
    }
    Ok(())
}

/// Request signing settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigningConfig {
    /// Whether requests are signed with `SigV4`.
    pub enabled: bool,
    /// Service name in the signing scope.
    pub signing_name: String,
    /// Region in the signing scope; defaults to the catalog region.
    pub signing_region: Option<String>,
}

impl Default for SigningConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            signing_name: DEFAULT_SIGNING_NAME.to_string(),
            signing_region: None,
        }
    }
}

impl SigningConfig {
    /// Signing turned off, for local catalogs.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }
}

/// Bounded retry with exponential backoff for commit conflicts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total commit attempts, including the first.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Cap on any single delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: BACKOFF_BASE,
            max_delay: BACKOFF_MAX,
        }
    }
}

impl RetryPolicy {
    /// A policy that retries without sleeping.
    #[must_use]
    pub const fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Returns the delay after the given failed attempt (1-based).
    ///
    /// Doubles from `base_delay` up to `max_delay`, plus up to 50ms of
    /// jitter when the policy sleeps at all.
    #[must_use]
    pub fn delay_after(&self, attempt: u32) -> Duration {
        if self.max_delay.is_zero() {
            return Duration::ZERO;
        }
        let factor = 1_u32 << attempt.saturating_sub(1).min(16);
        let backoff = self.base_delay.saturating_mul(factor).min(self.max_delay);
        backoff + Duration::from_millis(rand_jitter())
    }
}

/// Generates random jitter for backoff (0-50ms).
fn rand_jitter() -> u64 {
    use std::time::SystemTime;
    let seed = u64::from(
        SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap_or_default()
            .subsec_nanos(),
    );
    seed % 50
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().and_then(|v| {
        let trimmed = v.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn env_u64(name: &str) -> Result<Option<u64>> {
    let Some(v) = env_string(name) else {
        return Ok(None);
    };
    v.parse::<u64>()
        .map(Some)
        .map_err(|e| CatalogError::config(format!("{name} must be a u64: {e}")))
}

fn env_u32(name: &str) -> Result<Option<u32>> {
    let Some(v) = env_string(name) else {
        return Ok(None);
    };
    v.parse::<u32>()
        .map(Some)
        .map_err(|e| CatalogError::config(format!("{name} must be a u32: {e}")))
}

fn parse_bool(name: &str, value: &str) -> Result<bool> {
    let value = value.trim().to_ascii_lowercase();
    match value.as_str() {
        "true" | "1" | "yes" | "y" => Ok(true),
        "false" | "0" | "no" | "n" => Ok(false),
        _ => Err(CatalogError::config(format!(
            "{name} must be a boolean (true/false/1/0)"
        ))),
    }
}

fn env_bool(name: &str) -> Result<Option<bool>> {
    let Some(v) = env_string(name) else {
        return Ok(None);
    };
    parse_bool(name, &v).map(Some)
}
