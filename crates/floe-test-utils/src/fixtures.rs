//! Test fixtures for the customers table.

use std::time::Duration;

use floe_catalog::config::{CatalogConfig, RetryPolicy, SigningConfig};
use floe_catalog::identity::StaticIdentity;
use floe_catalog::record::{Record, RecordBatch};
use floe_catalog::schema::SchemaSpec;
use floe_catalog::session::CatalogSession;
use floe_catalog::transport::CatalogConnector;
use floe_core::{AccountId, TableIdent};

/// Account used by every fixture session.
pub const TEST_ACCOUNT: &str = "123456789012";

/// Table bucket used by every fixture session.
pub const TEST_BUCKET: &str = "floe-test-bucket";

/// The customers schema: three required columns, the last holding encoded
/// JSON.
pub fn customers_schema() -> SchemaSpec {
    "customer_id:int32,name:string,contact_info:string"
        .parse()
        .expect("valid schema")
}

/// `myblognamespace.customers_nested`.
pub fn customers_table() -> TableIdent {
    TableIdent::parse("myblognamespace.customers_nested").expect("valid table")
}

/// Builds a customer record with its contact info encoded as JSON text.
pub fn customer(id: i32, name: &str, email: &str, phone: &str) -> Record {
    let contact = serde_json::json!({ "email": email, "phone": phone });
    Record::new()
        .with("customer_id", id)
        .with("name", name)
        .with("contact_info", contact.to_string())
}

/// Alice, customer 1.
pub fn alice() -> Record {
    customer(1, "Alice", "alice@example.com", "555-0100")
}

/// Bob, customer 2.
pub fn bob() -> Record {
    customer(2, "Bob", "bob@example.com", "555-0101")
}

/// The two-record batch of the end-to-end scenario.
pub fn customers_batch() -> RecordBatch {
    RecordBatch::new(vec![alice(), bob()])
}

/// The fixture account id.
pub fn test_account() -> AccountId {
    AccountId::new(TEST_ACCOUNT).expect("valid account")
}

/// Configuration for in-process catalogs: no signing, retries without
/// sleeping, a short timeout.
pub fn test_config() -> CatalogConfig {
    CatalogConfig::new("us-east-2", TEST_BUCKET)
        .with_signing(SigningConfig::disabled())
        .with_retry(RetryPolicy::immediate(5))
        .with_request_timeout(Duration::from_secs(5))
}

/// The warehouse [`test_config`] derives for the fixture account.
pub fn test_warehouse() -> String {
    test_config().warehouse(&test_account())
}

/// Opens a session against `connector` with [`test_config`].
pub async fn open_session(connector: &dyn CatalogConnector) -> CatalogSession {
    open_session_with(connector, test_config()).await
}

/// Opens a session against `connector` with a custom configuration.
pub async fn open_session_with(
    connector: &dyn CatalogConnector,
    config: CatalogConfig,
) -> CatalogSession {
    let identity = StaticIdentity::new(test_account());
    CatalogSession::open(&identity, connector, config)
        .await
        .expect("session opens")
}
