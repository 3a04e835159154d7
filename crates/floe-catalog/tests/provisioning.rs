//! Integration tests for idempotent table provisioning.

use std::time::Duration;

use async_trait::async_trait;
use floe_catalog::error::{CatalogError, ErrorKind};
use floe_catalog::identity::{IdentityProvider, StaticIdentity};
use floe_catalog::provisioner::{ProvisionOutcome, TableProvisioner};
use floe_catalog::schema::{ColumnMismatch, LogicalType, SchemaSpec, SchemaWarning};
use floe_catalog::session::CatalogSession;
use floe_catalog::transport::TransportError;
use floe_core::AccountId;
use floe_test_utils::{
    CatalogOp, FailPoint, InjectedFailure, TracingTransport, customers_schema, customers_table,
    open_session, open_session_with, test_account, test_config,
};

fn schema(spec: &str) -> SchemaSpec {
    spec.parse().unwrap()
}

#[tokio::test]
async fn test_ensure_table_is_idempotent() {
    let transport = TracingTransport::new();
    let provisioner = TableProvisioner::new(open_session(&transport).await);
    let table = customers_table();

    let first = provisioner
        .ensure_table(&table, &customers_schema())
        .await
        .unwrap();
    assert_eq!(first.outcome(), ProvisionOutcome::Created);
    assert!(first.warnings().is_empty());

    let second = provisioner
        .ensure_table(&table, &customers_schema())
        .await
        .unwrap();
    assert_eq!(second.outcome(), ProvisionOutcome::Adopted);
    assert_eq!(first.identity(), second.identity());
    assert_eq!(transport.catalog().table_count(), 1);
    assert!(transport.catalog().has_namespace(table.namespace()));
}

#[tokio::test]
async fn test_ensure_table_call_sequence() {
    let transport = TracingTransport::new();
    let provisioner = TableProvisioner::new(open_session(&transport).await);
    transport.clear_operations();

    let table = customers_table();
    provisioner
        .ensure_table(&table, &customers_schema())
        .await
        .unwrap();

    assert_eq!(
        transport.operations(),
        vec![
            CatalogOp::CreateNamespace {
                namespace: table.namespace().clone()
            },
            CatalogOp::CreateTable {
                table: table.clone()
            },
            CatalogOp::LoadTable { table },
        ]
    );
}

/// Many provisioners racing on the same table converge on one table.
#[tokio::test]
async fn test_concurrent_ensure_converges() {
    let transport = TracingTransport::new();
    let session = open_session(&transport).await;

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let provisioner = TableProvisioner::new(session.clone());
            tokio::spawn(async move {
                provisioner
                    .ensure_table(&customers_table(), &customers_schema())
                    .await
            })
        })
        .collect();

    let mut identities = Vec::new();
    let mut created = 0;
    for handle in handles {
        let table = handle.await.unwrap().expect("every caller gets a handle");
        if table.was_created() {
            created += 1;
        }
        identities.push(table.identity());
    }

    assert_eq!(created, 1, "exactly one caller creates the table");
    assert!(identities.windows(2).all(|w| w[0] == w[1]));
    assert_eq!(transport.catalog().table_count(), 1);
}

#[tokio::test]
async fn test_type_mismatch_is_rejected() {
    let transport = TracingTransport::new();
    let table = customers_table();
    transport.catalog().insert_table(
        &table,
        schema("customer_id:string,name:string,contact_info:string"),
    );
    let provisioner = TableProvisioner::new(open_session(&transport).await);

    let err = provisioner
        .ensure_table(&table, &customers_schema())
        .await
        .unwrap_err();

    let CatalogError::SchemaMismatch { mismatches, .. } = &err else {
        panic!("expected schema mismatch, got {err:?}");
    };
    assert_eq!(
        mismatches,
        &vec![ColumnMismatch::TypeChanged {
            name: "customer_id".into(),
            expected: LogicalType::Int32,
            found: LogicalType::String,
        }]
    );
    assert_eq!(err.kind(), ErrorKind::SchemaMismatch);

    // The existing table is left as it was.
    let remote = provisioner.load(&table).await.unwrap();
    assert_eq!(
        remote.schema.field("customer_id").unwrap().logical_type,
        LogicalType::String
    );
}

#[tokio::test]
async fn test_missing_column_is_rejected() {
    let transport = TracingTransport::new();
    let table = customers_table();
    transport
        .catalog()
        .insert_table(&table, schema("customer_id:int32,name:string"));
    let provisioner = TableProvisioner::new(open_session(&transport).await);

    let err = provisioner
        .ensure_table(&table, &customers_schema())
        .await
        .unwrap_err();
    assert!(matches!(
        &err,
        CatalogError::SchemaMismatch { mismatches, .. }
            if matches!(&mismatches[..], [ColumnMismatch::Missing { name, .. }] if name == "contact_info")
    ));
}

#[tokio::test]
async fn test_nullability_drift_only_warns() {
    let transport = TracingTransport::new();
    let table = customers_table();
    transport.catalog().insert_table(
        &table,
        schema("customer_id:int32?,name:string?,contact_info:string?"),
    );
    let provisioner = TableProvisioner::new(open_session(&transport).await);

    let handle = provisioner
        .ensure_table(&table, &customers_schema())
        .await
        .unwrap();

    assert_eq!(handle.outcome(), ProvisionOutcome::Adopted);
    assert_eq!(handle.warnings().len(), 3);
    assert!(handle.warnings().iter().all(|w| matches!(
        w,
        SchemaWarning::NullabilityDrift {
            expected_nullable: false,
            remote_nullable: true,
            ..
        }
    )));
}

#[tokio::test]
async fn test_column_order_is_not_significant() {
    let transport = TracingTransport::new();
    let table = customers_table();
    transport.catalog().insert_table(
        &table,
        schema("contact_info:string,name:string,customer_id:int32"),
    );
    let provisioner = TableProvisioner::new(open_session(&transport).await);

    let handle = provisioner
        .ensure_table(&table, &customers_schema())
        .await
        .unwrap();
    assert!(handle.warnings().is_empty());
}

#[tokio::test]
async fn test_extra_optional_column_warns() {
    let transport = TracingTransport::new();
    let table = customers_table();
    transport.catalog().insert_table(
        &table,
        schema("customer_id:int32,name:string,contact_info:string,segment:string?"),
    );
    let provisioner = TableProvisioner::new(open_session(&transport).await);

    let handle = provisioner
        .ensure_table(&table, &customers_schema())
        .await
        .unwrap();
    assert!(matches!(
        handle.warnings(),
        [SchemaWarning::ExtraOptionalColumn { name, .. }] if name == "segment"
    ));
}

#[tokio::test]
async fn test_vanished_table_is_load_error() {
    let transport = TracingTransport::new();
    transport.inject_failure(FailPoint::LoadTable, InjectedFailure::NotFound);
    let provisioner = TableProvisioner::new(open_session(&transport).await);

    let err = provisioner
        .ensure_table(&customers_table(), &customers_schema())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Load);
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_transport_failure_surfaces() {
    let transport = TracingTransport::new();
    transport.inject_failure(FailPoint::CreateTable, InjectedFailure::Unavailable);
    let provisioner = TableProvisioner::new(open_session(&transport).await);

    let err = provisioner
        .ensure_table(&customers_table(), &customers_schema())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CatalogError::Transport {
            operation: "create_table",
            retryable: true,
            timed_out: false,
            ..
        }
    ));
    assert_eq!(transport.catalog().table_count(), 0);

    // Retrying the whole call once the catalog recovers succeeds.
    transport.clear_failures();
    let handle = provisioner
        .ensure_table(&customers_table(), &customers_schema())
        .await
        .unwrap();
    assert!(handle.was_created());
}

#[tokio::test]
async fn test_namespace_creation_can_be_disabled() {
    let transport = TracingTransport::new();
    let mut config = test_config();
    config.create_namespace = false;
    let provisioner = TableProvisioner::new(open_session_with(&transport, config).await);

    let err = provisioner
        .ensure_table(&customers_table(), &customers_schema())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Transport);
    assert!(
        !transport
            .operations()
            .iter()
            .any(|op| matches!(op, CatalogOp::CreateNamespace { .. }))
    );
}

#[tokio::test]
async fn test_handshake_rejection_is_auth_error() {
    let transport = TracingTransport::new();
    transport.inject_failure(FailPoint::Connect, InjectedFailure::Unauthorized);
    let identity = StaticIdentity::new(test_account());

    let err = CatalogSession::open(&identity, &transport, test_config())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Auth);
    assert_eq!(transport.catalog_calls(), 0);
}

#[tokio::test]
async fn test_invalid_config_fails_before_any_call() {
    let transport = TracingTransport::new();
    let identity = StaticIdentity::new(test_account());
    let mut config = test_config();
    config.table_bucket = String::new();

    let err = CatalogSession::open(&identity, &transport, config)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidConfig);
    assert!(transport.operations().is_empty());
}

#[tokio::test]
async fn test_session_derives_warehouse() {
    let transport = TracingTransport::new();
    let session = open_session(&transport).await;
    assert_eq!(session.warehouse(), "123456789012:s3tablescatalog/floe-test-bucket");
    assert_eq!(
        transport.operations(),
        vec![CatalogOp::Connect {
            warehouse: session.warehouse().to_string()
        }]
    );
}

/// An identity provider that answers after a fixed delay.
struct SlowIdentity(Duration);

#[async_trait]
impl IdentityProvider for SlowIdentity {
    async fn account_identity(&self) -> Result<AccountId, TransportError> {
        tokio::time::sleep(self.0).await;
        Ok(test_account())
    }
}

#[tokio::test(start_paused = true)]
async fn test_slow_identity_times_out_as_auth_error() {
    let transport = TracingTransport::new();
    let config = test_config().with_request_timeout(Duration::from_secs(2));
    let started = tokio::time::Instant::now();

    let err = CatalogSession::open(&SlowIdentity(Duration::from_secs(60)), &transport, config)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Auth);
    assert!(err.to_string().contains("identity resolution timed out after 2000ms"));
    assert!(started.elapsed() < Duration::from_secs(60));
    // The handshake is never attempted.
    assert!(transport.operations().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_slow_handshake_times_out_as_auth_error() {
    let transport = TracingTransport::new();
    transport.set_latency(Some(Duration::from_secs(60)));
    let identity = StaticIdentity::new(test_account());
    let config = test_config().with_request_timeout(Duration::from_secs(2));
    let started = tokio::time::Instant::now();

    let err = CatalogSession::open(&identity, &transport, config)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        CatalogError::Auth { ref message, .. } if message.contains("catalog handshake timed out")
    ));
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(2));
    assert!(elapsed < Duration::from_secs(60));
}
