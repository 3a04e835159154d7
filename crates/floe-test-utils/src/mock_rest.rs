//! Mock Iceberg REST catalog.
//!
//! An axum server that speaks the subset of the REST protocol floe uses, on
//! top of a [`MemoryCatalog`] and a [`MemoryBackend`] for staged files.
//! Every request is recorded; `SigV4` presence can be enforced.
//!
//! Commits are checked the way a real catalog would find them on read: the
//! manifest list, every manifest it names and every added data file must be
//! in storage, and the parent snapshot's manifests must be carried forward.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use axum::extract::{Path, Query, Request, State};
use axum::http::{StatusCode, header};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use floe_catalog::manifest::{self, ManifestFile};
use floe_catalog::memory::{MemoryCatalog, PendingSnapshot};
use floe_catalog::rest::types::{
    self, CommitTableRequest, CommitTableResponse, ConfigResponse, CreateNamespaceRequest,
    CreateTableRequest, ErrorResponse, LoadTableResult, MAIN_BRANCH,
};
use floe_catalog::transport::{
    CatalogTransport, CommitOutcome, CreateOutcome, RemoteTable, TransportError,
};
use floe_core::{MemoryBackend, NamespaceIdent, StorageBackend, TableIdent};
use serde_json::{Value, json};

/// A request seen by the mock server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    /// HTTP method.
    pub method: String,
    /// Raw (percent-encoded) path.
    pub path: String,
    /// `Authorization` header, if sent.
    pub authorization: Option<String>,
}

/// Builder for a mock REST catalog server.
#[derive(Debug, Clone, Default)]
pub struct MockRestCatalog {
    catalog: MemoryCatalog,
    storage: MemoryBackend,
    prefix: Option<String>,
    warehouse: Option<String>,
    require_sigv4: bool,
}

impl MockRestCatalog {
    /// Creates a mock over a fresh catalog and storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Advertises a route prefix from `/v1/config`.
    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Accepts only this warehouse in the config handshake.
    #[must_use]
    pub fn with_warehouse(mut self, warehouse: impl Into<String>) -> Self {
        self.warehouse = Some(warehouse.into());
        self
    }

    /// Rejects requests without a `SigV4` `Authorization` header.
    #[must_use]
    pub fn require_sigv4(mut self) -> Self {
        self.require_sigv4 = true;
        self
    }

    /// Binds an ephemeral local port and starts serving.
    pub async fn start(self) -> MockRestServer {
        let state = Arc::new(MockState {
            catalog: self.catalog,
            storage: self.storage,
            prefix: self.prefix,
            warehouse: self.warehouse,
            require_sigv4: self.require_sigv4,
            requests: Mutex::new(Vec::new()),
            commit_failures: Mutex::new(VecDeque::new()),
        });

        let base = match &state.prefix {
            Some(prefix) => format!("/v1/{}", prefix.trim_matches('/')),
            None => "/v1".to_string(),
        };
        let app = Router::new()
            .route("/v1/config", get(get_config))
            .route(&format!("{base}/namespaces"), post(create_namespace))
            .route(&format!("{base}/namespaces/:namespace/tables"), post(create_table))
            .route(
                &format!("{base}/namespaces/:namespace/tables/:table"),
                get(load_table).post(commit_table),
            )
            .layer(middleware::from_fn_with_state(
                Arc::clone(&state),
                record_and_authorize,
            ))
            .with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        MockRestServer {
            endpoint: format!("http://{addr}"),
            state,
        }
    }
}

/// A running mock REST catalog.
#[derive(Debug, Clone)]
pub struct MockRestServer {
    endpoint: String,
    state: Arc<MockState>,
}

impl MockRestServer {
    /// Base URL to use as the catalog endpoint.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// The catalog behind the server.
    pub fn catalog(&self) -> &MemoryCatalog {
        &self.state.catalog
    }

    /// Storage holding staged data files and manifests.
    pub fn storage(&self) -> &MemoryBackend {
        &self.state.storage
    }

    /// Returns all requests received so far.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.requests.lock().expect("lock").clone()
    }

    /// Makes the next commit fail with `status` before reaching the catalog.
    pub fn inject_commit_failure(&self, status: StatusCode) {
        self.state
            .commit_failures
            .lock()
            .expect("lock")
            .push_back(status);
    }
}

#[derive(Debug)]
struct MockState {
    catalog: MemoryCatalog,
    storage: MemoryBackend,
    prefix: Option<String>,
    warehouse: Option<String>,
    require_sigv4: bool,
    requests: Mutex<Vec<RecordedRequest>>,
    commit_failures: Mutex<VecDeque<StatusCode>>,
}

type Shared = State<Arc<MockState>>;

fn error(status: StatusCode, error_type: &str, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse::new(status.as_u16(), error_type, message)),
    )
        .into_response()
}

fn transport_error(err: &TransportError, missing: &str) -> Response {
    match err {
        TransportError::NotFound { message } => error(StatusCode::NOT_FOUND, missing, message),
        TransportError::Rejected { status, message } => error(
            StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_REQUEST),
            "BadRequestException",
            message,
        ),
        other => error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "ServiceFailureException",
            other.to_string(),
        ),
    }
}

fn parse_namespace(encoded: &str) -> Result<NamespaceIdent, Response> {
    NamespaceIdent::new(encoded.split('\u{1f}'))
        .map_err(|e| error(StatusCode::BAD_REQUEST, "BadRequestException", e.to_string()))
}

fn parse_table(namespace: &str, name: &str) -> Result<TableIdent, Response> {
    TableIdent::new(parse_namespace(namespace)?, name)
        .map_err(|e| error(StatusCode::BAD_REQUEST, "BadRequestException", e.to_string()))
}

async fn record_and_authorize(State(state): Shared, request: Request, next: Next) -> Response {
    let authorization = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(ToString::to_string);
    state.requests.lock().expect("lock").push(RecordedRequest {
        method: request.method().to_string(),
        path: request.uri().path().to_string(),
        authorization: authorization.clone(),
    });

    let signed = authorization
        .as_deref()
        .is_some_and(|a| a.starts_with("AWS4-HMAC-SHA256 Credential="));
    if state.require_sigv4 && !signed {
        return error(
            StatusCode::FORBIDDEN,
            "NotAuthorizedException",
            "request is not SigV4-signed",
        );
    }
    next.run(request).await
}

async fn get_config(State(state): Shared, Query(params): Query<HashMap<String, String>>) -> Response {
    let warehouse = params.get("warehouse").map(String::as_str).unwrap_or_default();
    if let Some(allowed) = &state.warehouse {
        if allowed != warehouse {
            return error(
                StatusCode::FORBIDDEN,
                "NotAuthorizedException",
                format!("warehouse {warehouse} is not accessible"),
            );
        }
    }
    let mut config = ConfigResponse::default();
    if let Some(prefix) = &state.prefix {
        config.overrides.insert("prefix".to_string(), prefix.clone());
    }
    Json(config).into_response()
}

async fn create_namespace(
    State(state): Shared,
    Json(request): Json<CreateNamespaceRequest>,
) -> Response {
    match state.catalog.create_namespace(&request.namespace).await {
        Ok(CreateOutcome::Created) => Json(request).into_response(),
        Ok(CreateOutcome::AlreadyExists) => error(
            StatusCode::CONFLICT,
            "AlreadyExistsException",
            format!("namespace {} already exists", request.namespace),
        ),
        Err(e) => transport_error(&e, "NoSuchNamespaceException"),
    }
}

async fn create_table(
    State(state): Shared,
    Path(namespace): Path<String>,
    Json(request): Json<CreateTableRequest>,
) -> Response {
    let table = match parse_table(&namespace, &request.name) {
        Ok(table) => table,
        Err(response) => return response,
    };
    let schema = match types::from_iceberg_schema(&request.schema) {
        Ok(schema) => schema,
        Err(e) => return error(StatusCode::BAD_REQUEST, "BadRequestException", e.to_string()),
    };
    match state.catalog.create_table(&table, &schema).await {
        Ok(CreateOutcome::Created) => match state.catalog.load_table(&table).await {
            Ok(remote) => load_response(&state.catalog, &remote),
            Err(e) => transport_error(&e, "NoSuchTableException"),
        },
        Ok(CreateOutcome::AlreadyExists) => error(
            StatusCode::CONFLICT,
            "AlreadyExistsException",
            format!("table {table} already exists"),
        ),
        Err(e) => transport_error(&e, "NoSuchNamespaceException"),
    }
}

async fn load_table(
    State(state): Shared,
    Path((namespace, name)): Path<(String, String)>,
) -> Response {
    let table = match parse_table(&namespace, &name) {
        Ok(table) => table,
        Err(response) => return response,
    };
    match state.catalog.load_table(&table).await {
        Ok(remote) => load_response(&state.catalog, &remote),
        Err(e) => transport_error(&e, "NoSuchTableException"),
    }
}

async fn commit_table(
    State(state): Shared,
    Path((namespace, name)): Path<(String, String)>,
    Json(request): Json<CommitTableRequest>,
) -> Response {
    let injected = state.commit_failures.lock().expect("lock").pop_front();
    if let Some(status) = injected {
        return error(status, "ServiceFailureException", "injected commit failure");
    }

    let table = match parse_table(&namespace, &name) {
        Ok(table) => table,
        Err(response) => return response,
    };
    let remote = match state.catalog.load_table(&table).await {
        Ok(remote) => remote,
        Err(e) => return transport_error(&e, "NoSuchTableException"),
    };

    if let Some(uuid) = request.expected_uuid() {
        if uuid != remote.table_uuid {
            return error(
                StatusCode::CONFLICT,
                "CommitFailedException",
                format!("table UUID does not match: expected {uuid}"),
            );
        }
    }
    let expected = request.expected_version().unwrap_or(remote.version);
    if expected != remote.version {
        return branch_changed(&format!("expected {expected}, table is at {}", remote.version));
    }

    let Some(snapshot) = request.added_snapshot() else {
        return error(
            StatusCode::BAD_REQUEST,
            "BadRequestException",
            "commit adds no snapshot",
        );
    };
    if request.main_target() != Some(snapshot.snapshot_id()) {
        return error(
            StatusCode::BAD_REQUEST,
            "BadRequestException",
            format!("commit does not move {MAIN_BRANCH} to the added snapshot"),
        );
    }
    let pending = match read_back(
        &state.storage,
        &remote,
        snapshot.snapshot_id(),
        snapshot.manifest_list(),
    )
    .await
    {
        Ok(pending) => pending,
        Err(message) => return error(StatusCode::BAD_REQUEST, "BadRequestException", message),
    };

    match state.catalog.commit_snapshot(&table, expected, pending) {
        Ok(CommitOutcome::Accepted { .. }) => match state.catalog.load_table(&table).await {
            Ok(remote) => match load_result(&state.catalog, &remote) {
                Ok(result) => Json(CommitTableResponse {
                    metadata_location: result.metadata_location.unwrap_or_default(),
                    metadata: result.metadata,
                })
                .into_response(),
                Err(response) => response,
            },
            Err(e) => transport_error(&e, "NoSuchTableException"),
        },
        Ok(CommitOutcome::VersionConflict { message }) => branch_changed(&message),
        Err(e) => transport_error(&e, "NoSuchTableException"),
    }
}

fn branch_changed(message: &str) -> Response {
    error(
        StatusCode::CONFLICT,
        "CommitFailedException",
        format!("Requirement failed: branch {MAIN_BRANCH} has changed: {message}"),
    )
}

/// Reads a snapshot's files back the way a query engine would, and turns
/// them into the append to record.
async fn read_back(
    storage: &MemoryBackend,
    remote: &RemoteTable,
    snapshot_id: i64,
    list_path: &str,
) -> Result<PendingSnapshot, String> {
    let manifests = read_list(storage, list_path, "manifest list").await?;
    if let Some(parent_path) = &remote.manifest_list {
        let parent = read_list(storage, parent_path, "parent manifest list").await?;
        if let Some(dropped) = parent
            .iter()
            .find(|p| !manifests.iter().any(|m| m.path == p.path))
        {
            return Err(format!(
                "manifest {} of the parent snapshot is missing from {list_path}",
                dropped.path
            ));
        }
    }

    let mut pending = PendingSnapshot {
        snapshot_id: Some(snapshot_id),
        manifest_list: Some(list_path.to_string()),
        ..PendingSnapshot::default()
    };
    for listed in &manifests {
        let bytes = storage
            .get(&listed.path)
            .await
            .map_err(|_| format!("manifest {} does not exist", listed.path))?;
        if listed.added_snapshot_id != snapshot_id {
            continue;
        }
        let files = manifest::read_manifest(&bytes)
            .map_err(|e| format!("manifest {} is unreadable: {e}", listed.path))?;
        for file in files {
            let data = storage
                .get(&file.path)
                .await
                .map_err(|_| format!("data file {} does not exist", file.path))?;
            pending.added_records += file.record_count;
            if pending.data.is_none() {
                pending.data_location = file.path;
                pending.data = Some(data);
            }
        }
    }
    if pending.data.is_none() {
        return Err(format!("snapshot {snapshot_id} adds no data files"));
    }
    Ok(pending)
}

async fn read_list(
    storage: &MemoryBackend,
    path: &str,
    what: &str,
) -> Result<Vec<ManifestFile>, String> {
    let bytes = storage
        .get(path)
        .await
        .map_err(|_| format!("{what} {path} does not exist"))?;
    manifest::read_manifest_list(&bytes).map_err(|e| format!("{what} {path} is unreadable: {e}"))
}

/// Fixed clock for metadata timestamps: one second per sequence number.
const EPOCH_MS: i64 = 1_700_000_000_000;

fn timestamp_ms(sequence_number: i64) -> i64 {
    EPOCH_MS + sequence_number * 1000
}

fn load_response(catalog: &MemoryCatalog, remote: &RemoteTable) -> Response {
    match load_result(catalog, remote) {
        Ok(result) => Json(result).into_response(),
        Err(response) => response,
    }
}

/// Renders a table as format-version 2 metadata.
fn load_result(catalog: &MemoryCatalog, remote: &RemoteTable) -> Result<LoadTableResult, Response> {
    let failure = |message: String| {
        error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "ServiceFailureException",
            message,
        )
    };
    let schema = types::to_iceberg_schema(&remote.schema, remote.schema_id)
        .map_err(|e| failure(e.to_string()))?;
    let location = remote.location.trim_end_matches('/');
    let snapshots = catalog.snapshots(&remote.ident);
    let entries: Vec<Value> = snapshots
        .iter()
        .map(|s| {
            let manifest_list = s.manifest_list.clone().unwrap_or_else(|| {
                format!("{location}/metadata/snap-{}.avro", s.snapshot_id)
            });
            json!({
                "snapshot-id": s.snapshot_id,
                "parent-snapshot-id": s.parent_snapshot_id,
                "sequence-number": s.sequence_number,
                "timestamp-ms": timestamp_ms(s.sequence_number),
                "manifest-list": manifest_list,
                "summary": {
                    "operation": "append",
                    "added-records": s.added_records.to_string(),
                    "total-records": s.total_records.to_string(),
                },
                "schema-id": remote.schema_id,
            })
        })
        .collect();
    let log: Vec<Value> = snapshots
        .iter()
        .map(|s| json!({"snapshot-id": s.snapshot_id, "timestamp-ms": timestamp_ms(s.sequence_number)}))
        .collect();

    let mut metadata = json!({
        "format-version": 2,
        "table-uuid": remote.table_uuid,
        "location": location,
        "last-sequence-number": remote.last_sequence_number,
        "last-updated-ms": timestamp_ms(remote.last_sequence_number),
        "last-column-id": schema.highest_field_id(),
        "current-schema-id": remote.schema_id,
        "schemas": [schema],
        "partition-specs": [{"spec-id": 0, "fields": []}],
        "default-spec-id": 0,
        "last-partition-id": 999,
        "sort-orders": [{"order-id": 0, "fields": []}],
        "default-sort-order-id": 0,
        "properties": {},
        "snapshots": entries,
        "snapshot-log": log,
        "metadata-log": [],
        "refs": {},
    });
    if let Some(id) = remote.version.snapshot_id() {
        metadata["current-snapshot-id"] = json!(id);
        metadata["refs"][MAIN_BRANCH] = json!({"snapshot-id": id, "type": "branch"});
    }

    serde_json::from_value(json!({
        "metadata-location": format!(
            "{location}/metadata/{:05}.metadata.json",
            remote.last_sequence_number
        ),
        "metadata": metadata,
    }))
    .map_err(|e| failure(format!("invalid table metadata: {e}")))
}
