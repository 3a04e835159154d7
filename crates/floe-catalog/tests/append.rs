//! Integration tests for version-checked appends with bounded conflict retry.

use std::sync::Arc;
use std::time::Duration;

use floe_catalog::append::AppendExecutor;
use floe_catalog::config::RetryPolicy;
use floe_catalog::encoder::ParquetEncoder;
use floe_catalog::error::{CatalogError, ErrorKind};
use floe_catalog::provisioner::{TableHandle, TableProvisioner};
use floe_catalog::record::{Record, RecordBatch, Value};
use floe_catalog::schema::{FieldSpec, LogicalType, SchemaSpec, SchemaWarning};
use floe_catalog::session::CatalogSession;
use floe_catalog::transport::TableVersion;
use floe_test_utils::{
    FailPoint, InjectedFailure, TracingTransport, alice, bob, customer, customers_batch,
    customers_schema, customers_table, open_session,
};

async fn provision(transport: &TracingTransport) -> (CatalogSession, TableHandle) {
    let session = open_session(transport).await;
    let handle = TableProvisioner::new(session.clone())
        .ensure_table(&customers_table(), &customers_schema())
        .await
        .unwrap();
    (session, handle)
}

fn executor(session: CatalogSession) -> AppendExecutor {
    AppendExecutor::new(session, Arc::new(ParquetEncoder::default()))
}

#[tokio::test]
async fn test_append_commits_batch() {
    let transport = TracingTransport::new();
    let (session, mut handle) = provision(&transport).await;

    let result = executor(session)
        .append(&mut handle, &customers_batch())
        .await
        .unwrap();

    assert_eq!(result.rows_committed, 2);
    assert_eq!(result.total_records, 2);
    assert_eq!(result.attempts, 1);
    assert_eq!(result.previous_version, TableVersion::EMPTY);
    assert!(!result.version.is_empty());
    assert_eq!(handle.version(), result.version);
    assert_eq!(handle.total_records(), 2);

    let snapshots = transport.catalog().snapshots(&customers_table());
    assert_eq!(snapshots.len(), 1);
    assert_eq!(snapshots[0].added_records, 2);

    let data = snapshots[0].data.as_ref().expect("data file recorded");
    let decoded = ParquetEncoder::decode(data, &customers_schema()).unwrap();
    assert_eq!(decoded.len(), 2);
    assert_eq!(
        decoded.records()[0].get("name"),
        Some(&Value::String("Alice".into()))
    );
    assert_eq!(
        decoded.records()[1].get("customer_id"),
        Some(&Value::Int32(2))
    );
}

#[tokio::test]
async fn test_conflicts_then_converge() {
    let transport = TracingTransport::new();
    let (session, mut handle) = provision(&transport).await;
    transport.inject_conflicts(2);

    let result = executor(session)
        .append(&mut handle, &customers_batch())
        .await
        .unwrap();

    assert_eq!(result.attempts, 3);
    assert_eq!(transport.commit_attempts(), 3);
    // Two concurrent single-record commits landed first.
    assert_eq!(result.total_records, 4);
    assert_eq!(transport.catalog().snapshots(&customers_table()).len(), 3);
}

#[tokio::test]
async fn test_persistent_conflict_exhausts_attempts() {
    let transport = TracingTransport::new();
    let (session, mut handle) = provision(&transport).await;
    transport.inject_conflicts(u32::MAX);

    let err = executor(session)
        .with_retry_policy(RetryPolicy::immediate(4))
        .append(&mut handle, &customers_batch())
        .await
        .unwrap_err();

    assert!(matches!(err, CatalogError::CommitConflict { attempts: 4, .. }));
    assert_eq!(err.kind(), ErrorKind::CommitConflict);
    assert_eq!(transport.commit_attempts(), 4);
    // Only the concurrent writer's records made it in.
    let snapshots = transport.catalog().snapshots(&customers_table());
    assert_eq!(snapshots.len(), 4);
    assert!(snapshots.iter().all(|s| s.added_records == 1));
}

#[tokio::test]
async fn test_invalid_batch_makes_no_catalog_calls() {
    let transport = TracingTransport::new();
    let (session, mut handle) = provision(&transport).await;
    transport.clear_operations();
    let executor = executor(session);

    let wrong_type = RecordBatch::new(vec![
        alice(),
        Record::new()
            .with("customer_id", "two")
            .with("name", "Bob")
            .with("contact_info", "{}"),
    ]);
    let err = executor
        .append(&mut handle, &wrong_type)
        .await
        .unwrap_err();
    assert!(matches!(err, CatalogError::Validation { record: Some(1), .. }));

    let missing_required = RecordBatch::new(vec![Record::new().with("customer_id", 3)]);
    let err = executor
        .append(&mut handle, &missing_required)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let extra_column = RecordBatch::new(vec![bob().with("loyalty_tier", "gold")]);
    assert!(executor.append(&mut handle, &extra_column).await.is_err());

    let empty = RecordBatch::new(Vec::new());
    let err = executor.append(&mut handle, &empty).await.unwrap_err();
    assert!(matches!(err, CatalogError::Validation { record: None, .. }));

    assert!(transport.operations().is_empty());
    assert!(handle.version().is_empty());
}

#[tokio::test]
async fn test_widening_is_not_applied() {
    let transport = TracingTransport::new();
    let (session, mut handle) = provision(&transport).await;

    let batch = RecordBatch::new(vec![
        Record::new()
            .with("customer_id", 1_i64)
            .with("name", "Alice")
            .with("contact_info", "{}"),
    ]);
    let err = executor(session)
        .append(&mut handle, &batch)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[tokio::test(start_paused = true)]
async fn test_commit_times_out() {
    let transport = TracingTransport::new();
    let (session, mut handle) = provision(&transport).await;
    transport.set_latency(Some(Duration::from_secs(60)));

    let err = executor(session)
        .append(&mut handle, &customers_batch())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        CatalogError::Transport {
            operation: "commit_append",
            timed_out: true,
            ..
        }
    ));
    assert!(err.is_retryable());
    assert!(transport.catalog().snapshots(&customers_table()).is_empty());
}

#[tokio::test]
async fn test_commit_state_unknown_is_not_retried() {
    let transport = TracingTransport::new();
    let (session, mut handle) = provision(&transport).await;
    transport.inject_failure(FailPoint::Commit, InjectedFailure::CommitStateUnknown);

    let err = executor(session)
        .append(&mut handle, &customers_batch())
        .await
        .unwrap_err();

    assert!(matches!(err, CatalogError::Transport { retryable: false, .. }));
    assert_eq!(transport.commit_attempts(), 1);
}

#[tokio::test]
async fn test_replaced_table_is_load_error() {
    let transport = TracingTransport::new();
    let (session, mut handle) = provision(&transport).await;

    // Dropped and recreated out of band: same name, new UUID.
    transport
        .catalog()
        .insert_table(&customers_table(), customers_schema());

    let err = executor(session)
        .append(&mut handle, &customers_batch())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Load);
    assert!(transport.catalog().snapshots(&customers_table()).is_empty());
}

#[tokio::test]
async fn test_dropped_table_is_load_error_on_retry() {
    let transport = TracingTransport::new();
    let (session, mut handle) = provision(&transport).await;
    transport.inject_conflicts(1);
    transport.inject_failure(FailPoint::LoadTable, InjectedFailure::NotFound);

    let err = executor(session)
        .append(&mut handle, &customers_batch())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Load);
}

#[tokio::test]
async fn test_stale_handle_recovers() {
    let transport = TracingTransport::new();
    let (session, mut first) = provision(&transport).await;
    let (_, mut second) = provision(&transport).await;
    let executor = executor(session);

    executor
        .append(&mut first, &RecordBatch::new(vec![alice()]))
        .await
        .unwrap();

    let result = executor
        .append(&mut second, &RecordBatch::new(vec![bob()]))
        .await
        .unwrap();
    assert_eq!(result.attempts, 2);
    assert_eq!(result.total_records, 2);
    assert_eq!(second.version(), result.version);
}

/// Concurrent writers on one table all commit; the total is exact.
#[tokio::test]
async fn test_concurrent_appends_all_commit() {
    let transport = TracingTransport::new();
    let session = open_session(&transport).await;

    let tasks: Vec<_> = (0..4)
        .map(|writer| {
            let session = session.clone();
            tokio::spawn(async move {
                let mut handle = TableProvisioner::new(session.clone())
                    .ensure_table(&customers_table(), &customers_schema())
                    .await
                    .unwrap();
                let batch = RecordBatch::new(vec![
                    customer(writer * 2, "A", "a@example.com", "1"),
                    customer(writer * 2 + 1, "B", "b@example.com", "2"),
                ]);
                executor(session)
                    .with_retry_policy(RetryPolicy::immediate(10))
                    .append(&mut handle, &batch)
                    .await
            })
        })
        .collect();

    for task in tasks {
        task.await.unwrap().expect("append commits");
    }

    let snapshots = transport.catalog().snapshots(&customers_table());
    assert_eq!(snapshots.len(), 4);
    assert_eq!(snapshots.last().unwrap().total_records, 8);
}

/// A remote optional column of a type floe cannot write does not block appends.
#[tokio::test]
async fn test_unset_optional_column_of_unwritable_type() {
    let transport = TracingTransport::new();
    let table = customers_table();
    let remote = SchemaSpec::new(vec![
        FieldSpec::required("customer_id", LogicalType::Int32),
        FieldSpec::required("name", LogicalType::String),
        FieldSpec::optional("ingested_at", LogicalType::Unsupported("timestamptz".into())),
    ])
    .unwrap();
    transport.catalog().insert_table(&table, remote);
    let local: SchemaSpec = "customer_id:int32,name:string".parse().unwrap();

    let session = open_session(&transport).await;
    let mut handle = TableProvisioner::new(session.clone())
        .ensure_table(&table, &local)
        .await
        .unwrap();
    assert!(matches!(
        handle.warnings(),
        [SchemaWarning::ExtraOptionalColumn { name, .. }] if name == "ingested_at"
    ));

    let batch = RecordBatch::new(vec![Record::new().with("customer_id", 7).with("name", "Dana")]);
    let result = executor(session).append(&mut handle, &batch).await.unwrap();
    assert_eq!(result.rows_committed, 1);

    let snapshots = transport.catalog().snapshots(&table);
    let data = snapshots[0].data.as_ref().expect("data file recorded");
    let decoded = ParquetEncoder::decode(data, handle.schema()).unwrap();
    assert_eq!(decoded.records()[0].get("ingested_at"), None);
    assert_eq!(
        decoded.records()[0].get("name"),
        Some(&Value::String("Dana".into()))
    );
}
