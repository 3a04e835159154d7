//! Iceberg REST catalog transport.
//!
//! [`RestConnector`] performs the `GET /v1/config` handshake for a warehouse
//! and returns a transport bound to the catalog's route prefix. Requests are
//! signed with `SigV4` when signing is enabled.
//!
//! An append is a fast append. It stages the encoded data file, a manifest
//! listing it, and a manifest list holding the parent snapshot's manifests
//! plus the new one. It then posts a commit that adds a snapshot and moves
//! `main` to it, guarded by `assert-table-uuid` and `assert-ref-snapshot-id`
//! requirements.

pub mod types;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use aws_credential_types::provider::SharedCredentialsProvider;
use bytes::Bytes;
use floe_core::{NamespaceIdent, StorageBackend, TableIdent, WritePrecondition, WriteResult};
use iceberg::spec::{Snapshot, SnapshotReference, SnapshotRetention};
use iceberg::{TableRequirement, TableUpdate};
use reqwest::{Method, StatusCode, Url};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use uuid::Uuid;

use crate::aws::RequestSigner;
use crate::config::CatalogConfig;
use crate::encoder::EncodedBatch;
use crate::error::{CatalogError, Result};
use crate::manifest::{self, DataFile, ListHeader, ManifestFile};
use crate::schema::SchemaSpec;
use crate::transport::{
    CatalogConnector, CatalogTransport, CommitOutcome, CreateOutcome, RemoteTable, TableVersion,
    TransportError,
};

use types::{
    CommitTableRequest, CommitTableResponse, ConfigResponse, CreateNamespaceRequest,
    CreateTableRequest, ErrorResponse, LoadTableResult, MAIN_BRANCH,
};

/// Separator for multi-level namespaces in URL paths.
const NAMESPACE_SEPARATOR: &str = "\u{1f}";

const USER_AGENT: &str = concat!("floe-catalog/", env!("CARGO_PKG_VERSION"));

/// Connects to an Iceberg REST catalog.
#[derive(Clone)]
pub struct RestConnector {
    client: RestClient,
    storage: Arc<dyn StorageBackend>,
}

impl fmt::Debug for RestConnector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RestConnector")
            .field("endpoint", &self.client.base.as_str())
            .field("signed", &self.client.signer.is_some())
            .finish_non_exhaustive()
    }
}

impl RestConnector {
    /// Creates a connector for the configured endpoint.
    ///
    /// `storage` receives staged data files and manifests before each
    /// commit. `credentials` sign catalog requests; they are resolved again
    /// for every request.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::InvalidConfig`] if the endpoint is not a valid
    /// base URL, or if signing is enabled and no credentials are given.
    pub fn new(
        config: &CatalogConfig,
        credentials: Option<SharedCredentialsProvider>,
        storage: Arc<dyn StorageBackend>,
    ) -> Result<Self> {
        let endpoint = config.endpoint();
        let base = Url::parse(&endpoint)
            .map_err(|e| CatalogError::config(format!("invalid endpoint '{endpoint}': {e}")))?;
        if base.cannot_be_a_base() {
            return Err(CatalogError::config(format!(
                "endpoint '{endpoint}' cannot be used as a base URL"
            )));
        }

        let signer = match (config.signing.enabled, credentials) {
            (true, Some(credentials)) => Some(Arc::new(RequestSigner::new(
                credentials,
                config.signing_region(),
                config.signing.signing_name.clone(),
            ))),
            (true, None) => {
                return Err(CatalogError::config(
                    "request signing is enabled but no credentials were provided",
                ));
            }
            (false, _) => None,
        };

        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| CatalogError::config(format!("cannot build HTTP client: {e}")))?;

        Ok(Self {
            client: RestClient {
                http,
                base,
                prefix: Vec::new(),
                signer,
            },
            storage,
        })
    }
}

#[async_trait]
impl CatalogConnector for RestConnector {
    #[tracing::instrument(skip(self), fields(endpoint = %self.client.base))]
    async fn connect(&self, warehouse: &str) -> std::result::Result<Arc<dyn CatalogTransport>, TransportError> {
        let mut url = self.client.url(&["v1", "config"])?;
        url.query_pairs_mut().append_pair("warehouse", warehouse);

        let (status, body) = self.client.send::<()>(Method::GET, url, None).await?;
        if !status.is_success() {
            return Err(classify(status, &body));
        }
        let config: ConfigResponse = decode(&body, "catalog config")?;
        let prefix: Vec<String> = config
            .prefix()
            .map(|p| {
                p.split('/')
                    .filter(|s| !s.is_empty())
                    .map(ToString::to_string)
                    .collect()
            })
            .unwrap_or_default();
        tracing::debug!(prefix = %prefix.join("/"), "catalog config loaded");

        Ok(Arc::new(RestCatalogTransport {
            client: RestClient {
                prefix,
                ..self.client.clone()
            },
            storage: Arc::clone(&self.storage),
        }))
    }
}

#[derive(Clone)]
struct RestClient {
    http: reqwest::Client,
    base: Url,
    prefix: Vec<String>,
    signer: Option<Arc<RequestSigner>>,
}

impl RestClient {
    fn url(&self, segments: &[&str]) -> std::result::Result<Url, TransportError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| TransportError::Rejected {
                status: 0,
                message: format!("endpoint {} cannot be a base URL", self.base),
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Builds `v1/{prefix}/...` routes.
    fn route(&self, tail: &[&str]) -> std::result::Result<Url, TransportError> {
        let mut segments = vec!["v1"];
        segments.extend(self.prefix.iter().map(String::as_str));
        segments.extend_from_slice(tail);
        self.url(&segments)
    }

    async fn send<B: Serialize>(
        &self,
        method: Method,
        url: Url,
        body: Option<&B>,
    ) -> std::result::Result<(StatusCode, Bytes), TransportError> {
        let payload = match body {
            Some(body) => serde_json::to_vec(body).map_err(|e| TransportError::Rejected {
                status: 0,
                message: format!("cannot encode request body: {e}"),
            })?,
            None => Vec::new(),
        };
        let headers: &[(&str, &str)] = if payload.is_empty() {
            &[("accept", "application/json")]
        } else {
            &[
                ("accept", "application/json"),
                ("content-type", "application/json"),
            ]
        };
        let signature = match &self.signer {
            Some(signer) => {
                signer
                    .sign(method.as_str(), url.as_str(), headers, &payload)
                    .await?
            }
            None => Vec::new(),
        };

        tracing::trace!(method = %method, url = %url, "catalog request");
        let mut request = self.http.request(method.clone(), url);
        for (name, value) in headers {
            request = request.header(*name, *value);
        }
        for (name, value) in signature {
            request = request.header(name, value);
        }
        if !payload.is_empty() {
            request = request.body(payload);
        }

        let response = request.send().await.map_err(|e| {
            let message = if e.is_timeout() {
                format!("{method} timed out")
            } else {
                format!("{method} request failed")
            };
            TransportError::unavailable_with_source(message, e)
        })?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| TransportError::unavailable_with_source("response body unreadable", e))?;
        Ok((status, body))
    }
}

/// Transport bound to one warehouse of a REST catalog.
pub struct RestCatalogTransport {
    client: RestClient,
    storage: Arc<dyn StorageBackend>,
}

impl fmt::Debug for RestCatalogTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RestCatalogTransport")
            .field("endpoint", &self.client.base.as_str())
            .field("prefix", &self.client.prefix)
            .finish_non_exhaustive()
    }
}

impl RestCatalogTransport {
    fn namespace_segment(namespace: &NamespaceIdent) -> String {
        namespace.levels().join(NAMESPACE_SEPARATOR)
    }

    fn table_url(&self, table: &TableIdent) -> std::result::Result<Url, TransportError> {
        let namespace = Self::namespace_segment(table.namespace());
        self.client
            .route(&["namespaces", &namespace, "tables", table.name()])
    }

    /// Writes a file under the table location unless it is already there.
    ///
    /// Data files and manifests are named by batch id, so an existing file
    /// was staged by an earlier attempt for the same batch.
    async fn stage(&self, path: &str, data: Bytes, what: &str) -> std::result::Result<(), TransportError> {
        let size = data.len();
        let result = self
            .storage
            .put(path, data, WritePrecondition::DoesNotExist)
            .await
            .map_err(|e| TransportError::unavailable_with_source(format!("staging {path} failed"), e))?;
        match result {
            WriteResult::Success { .. } => tracing::debug!(path, bytes = size, "staged {what}"),
            WriteResult::PreconditionFailed { .. } => tracing::debug!(path, "{what} already staged"),
        }
        Ok(())
    }

    /// Reads the manifest list of the snapshot the append builds on.
    async fn parent_manifest_list(
        &self,
        table: &RemoteTable,
        expected: TableVersion,
    ) -> std::result::Result<Option<Bytes>, TransportError> {
        if expected.is_empty() {
            return Ok(None);
        }
        let path = table
            .manifest_list
            .as_deref()
            .ok_or_else(|| TransportError::InvalidResponse {
                message: format!("{} at {expected} has no manifest list", table.ident),
            })?;
        let bytes = self
            .storage
            .get(path)
            .await
            .map_err(|e| TransportError::unavailable_with_source(format!("reading {path} failed"), e))?;
        Ok(Some(bytes))
    }
}

#[async_trait]
impl CatalogTransport for RestCatalogTransport {
    async fn create_namespace(
        &self,
        namespace: &NamespaceIdent,
    ) -> std::result::Result<CreateOutcome, TransportError> {
        let url = self.client.route(&["namespaces"])?;
        let request = CreateNamespaceRequest {
            namespace: namespace.clone(),
            properties: HashMap::new(),
        };
        let (status, body) = self.client.send(Method::POST, url, Some(&request)).await?;
        match status {
            s if s.is_success() => Ok(CreateOutcome::Created),
            StatusCode::CONFLICT => Ok(CreateOutcome::AlreadyExists),
            s => Err(classify(s, &body)),
        }
    }

    async fn create_table(
        &self,
        table: &TableIdent,
        schema: &SchemaSpec,
    ) -> std::result::Result<CreateOutcome, TransportError> {
        let namespace = Self::namespace_segment(table.namespace());
        let url = self.client.route(&["namespaces", &namespace, "tables"])?;
        let request = CreateTableRequest {
            name: table.name().to_string(),
            schema: types::to_iceberg_schema(schema, 0)?,
            stage_create: false,
            properties: HashMap::new(),
        };
        let (status, body) = self.client.send(Method::POST, url, Some(&request)).await?;
        match status {
            s if s.is_success() => Ok(CreateOutcome::Created),
            StatusCode::CONFLICT => Ok(CreateOutcome::AlreadyExists),
            s => Err(classify(s, &body)),
        }
    }

    async fn load_table(&self, table: &TableIdent) -> std::result::Result<RemoteTable, TransportError> {
        let url = self.table_url(table)?;
        let (status, body) = self.client.send::<()>(Method::GET, url, None).await?;
        if !status.is_success() {
            return Err(classify(status, &body));
        }
        let result: LoadTableResult = decode(&body, "load table response")?;
        result.into_remote(table.clone())
    }

    async fn commit_append(
        &self,
        table: &RemoteTable,
        expected: TableVersion,
        batch: &EncodedBatch,
    ) -> std::result::Result<CommitOutcome, TransportError> {
        let location = table.location.trim_end_matches('/');
        let batch_id = batch.batch_id();
        let snapshot_id = new_snapshot_id();
        let sequence_number = table.last_sequence_number + 1;
        let record_count = batch.record_count();
        let total_records = table.total_records + record_count;

        let data_file = DataFile {
            path: format!("{location}/data/{}", batch.file_name()),
            format: batch.format(),
            record_count,
            file_size_in_bytes: batch.data().len() as u64,
        };
        self.stage(&data_file.path, batch.data().clone(), "data file")
            .await?;

        let schema = types::to_iceberg_schema(&table.schema, table.schema_id)?;
        let schema_json = serde_json::to_string(&schema).map_err(|e| unwritable("schema", &e))?;
        let manifest = manifest::write_manifest(&schema_json, table.schema_id, &[data_file])
            .map_err(|e| unwritable("manifest", &e))?;
        let added = ManifestFile {
            path: format!("{location}/metadata/{batch_id}-m0.avro"),
            length: manifest.len() as u64,
            added_snapshot_id: snapshot_id,
            sequence_number,
            added_files_count: 1,
            added_rows_count: record_count,
        };
        self.stage(&added.path, manifest, "manifest").await?;

        let parent = self.parent_manifest_list(table, expected).await?;
        let header = ListHeader {
            snapshot_id,
            parent_snapshot_id: expected.snapshot_id(),
            sequence_number,
        };
        let list = manifest::write_manifest_list(header, parent.as_deref(), &added)
            .map_err(|e| unwritable("manifest list", &e))?;
        let list_path = format!("{location}/metadata/snap-{snapshot_id}-1-{batch_id}.avro");
        self.stage(&list_path, list, "manifest list").await?;

        let snapshot: Snapshot = serde_json::from_value(json!({
            "snapshot-id": snapshot_id,
            "parent-snapshot-id": expected.snapshot_id(),
            "sequence-number": sequence_number,
            "timestamp-ms": chrono::Utc::now().timestamp_millis(),
            "manifest-list": list_path,
            "summary": {
                "operation": "append",
                "added-data-files": "1",
                "added-records": record_count.to_string(),
                "added-files-size": batch.data().len().to_string(),
                "total-records": total_records.to_string(),
            },
            "schema-id": table.schema_id,
        }))
        .map_err(|e| unwritable("snapshot", &e))?;
        let request = CommitTableRequest {
            identifier: table.ident.clone(),
            requirements: vec![
                TableRequirement::UuidMatch {
                    uuid: table.table_uuid,
                },
                TableRequirement::RefSnapshotIdMatch {
                    r#ref: MAIN_BRANCH.to_string(),
                    snapshot_id: expected.snapshot_id(),
                },
            ],
            updates: vec![
                TableUpdate::AddSnapshot { snapshot },
                TableUpdate::SetSnapshotRef {
                    ref_name: MAIN_BRANCH.to_string(),
                    reference: SnapshotReference::new(
                        snapshot_id,
                        SnapshotRetention::branch(None, None, None),
                    ),
                },
            ],
        };

        let url = self.table_url(&table.ident)?;
        let (status, body) = self.client.send(Method::POST, url, Some(&request)).await?;
        match status {
            s if s.is_success() => {
                let response: CommitTableResponse = decode(&body, "commit response")?;
                let metadata = response.metadata;
                let Some(committed) = metadata.current_snapshot() else {
                    return Err(TransportError::InvalidResponse {
                        message: format!("commit of snapshot {snapshot_id} left no current snapshot"),
                    });
                };
                Ok(CommitOutcome::Accepted {
                    version: TableVersion::snapshot(committed.snapshot_id()),
                    total_records: types::total_records(committed).unwrap_or(total_records),
                    sequence_number: committed.sequence_number(),
                    manifest_list: Some(committed.manifest_list().to_string()),
                })
            }
            StatusCode::CONFLICT => Ok(CommitOutcome::VersionConflict {
                message: error_message(&body),
            }),
            StatusCode::INTERNAL_SERVER_ERROR
            | StatusCode::BAD_GATEWAY
            | StatusCode::GATEWAY_TIMEOUT => Err(TransportError::CommitStateUnknown {
                message: format!("{status}: {}", error_message(&body)),
            }),
            s => Err(classify(s, &body)),
        }
    }
}

/// A random positive snapshot id.
fn new_snapshot_id() -> i64 {
    let (high, low) = Uuid::new_v4().as_u64_pair();
    i64::from_ne_bytes((high ^ low).to_ne_bytes()) & i64::MAX
}

fn unwritable(what: &str, err: &dyn std::error::Error) -> TransportError {
    TransportError::Rejected {
        status: 0,
        message: format!("cannot write {what}: {err}"),
    }
}

fn decode<T: DeserializeOwned>(body: &[u8], what: &str) -> std::result::Result<T, TransportError> {
    serde_json::from_slice(body).map_err(|e| TransportError::InvalidResponse {
        message: format!("malformed {what}: {e}"),
    })
}

fn error_message(body: &[u8]) -> String {
    serde_json::from_slice::<ErrorResponse>(body).map_or_else(
        |_| {
            let text = String::from_utf8_lossy(body);
            text.chars().take(512).collect()
        },
        |e| format!("{}: {}", e.error.error_type, e.error.message),
    )
}

fn classify(status: StatusCode, body: &[u8]) -> TransportError {
    let message = error_message(body);
    match status {
        StatusCode::NOT_FOUND => TransportError::NotFound { message },
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => TransportError::Unauthorized { message },
        StatusCode::TOO_MANY_REQUESTS => TransportError::unavailable(format!("{status}: {message}")),
        s if s.is_server_error() => TransportError::unavailable(format!("{status}: {message}")),
        s => TransportError::Rejected {
            status: s.as_u16(),
            message,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Router;
    use axum::routing::{get, post};
    use floe_core::MemoryBackend;

    use crate::config::SigningConfig;
    use crate::encoder::DataFileFormat;

    async fn spawn(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        format!("http://{addr}")
    }

    fn config(endpoint: &str) -> CatalogConfig {
        CatalogConfig::new("us-east-2", "bucket")
            .with_endpoint(endpoint)
            .with_signing(SigningConfig::disabled())
    }

    async fn connect(app: Router) -> (Arc<dyn CatalogTransport>, MemoryBackend) {
        let endpoint = spawn(app).await;
        let storage = MemoryBackend::new();
        let connector =
            RestConnector::new(&config(&endpoint), None, Arc::new(storage.clone())).unwrap();
        (connector.connect("123:cat/bucket").await.unwrap(), storage)
    }

    fn empty_table() -> RemoteTable {
        RemoteTable {
            ident: TableIdent::parse("db.t").unwrap(),
            table_uuid: Uuid::new_v4(),
            location: "s3://bucket/t".into(),
            metadata_location: None,
            schema: "id:int64?".parse().unwrap(),
            schema_id: 0,
            version: TableVersion::EMPTY,
            manifest_list: None,
            last_sequence_number: 0,
            total_records: 0,
        }
    }

    fn batch() -> EncodedBatch {
        EncodedBatch::new(DataFileFormat::Parquet, Bytes::from_static(b"PAR1"), 2)
    }

    fn status_app(status: StatusCode) -> Router {
        Router::new()
            .route("/v1/config", get(|| async { axum::Json(json!({})) }))
            .route(
                "/v1/namespaces/:ns/tables/:table",
                post(move || async move {
                    (
                        status,
                        axum::Json(json!({
                            "error": {"message": "boom", "type": "CommitFailedException", "code": status.as_u16()}
                        })),
                    )
                }),
            )
    }

    fn staged_list(storage: &MemoryBackend) -> String {
        storage
            .paths()
            .unwrap()
            .into_iter()
            .find(|p| p.contains("/metadata/snap-"))
            .expect("manifest list staged")
    }

    #[test]
    fn signing_requires_credentials() {
        let config = CatalogConfig::new("us-east-2", "bucket");
        let err = RestConnector::new(&config, None, Arc::new(MemoryBackend::new())).unwrap_err();
        assert!(matches!(err, CatalogError::InvalidConfig { .. }));
    }

    #[test]
    fn routes_encode_namespace_levels() {
        let client = RestClient {
            http: reqwest::Client::new(),
            base: Url::parse("https://glue.us-east-2.amazonaws.com/iceberg").unwrap(),
            prefix: vec!["catalogs".into(), "123:cat".into()],
            signer: None,
        };
        let ns = RestCatalogTransport::namespace_segment(&NamespaceIdent::parse("a.b").unwrap());
        let url = client.route(&["namespaces", &ns, "tables"]).unwrap();
        assert_eq!(
            url.path(),
            "/iceberg/v1/catalogs/123:cat/namespaces/a%1Fb/tables"
        );
    }

    #[test]
    fn statuses_are_classified() {
        assert!(matches!(
            classify(StatusCode::NOT_FOUND, b"{}"),
            TransportError::NotFound { .. }
        ));
        assert!(matches!(
            classify(StatusCode::FORBIDDEN, b""),
            TransportError::Unauthorized { .. }
        ));
        assert!(classify(StatusCode::SERVICE_UNAVAILABLE, b"").is_retryable());
        assert!(classify(StatusCode::TOO_MANY_REQUESTS, b"").is_retryable());
        assert!(matches!(
            classify(StatusCode::BAD_REQUEST, b"not json"),
            TransportError::Rejected { status: 400, ref message } if message == "not json"
        ));
    }

    #[test]
    fn snapshot_ids_are_positive() {
        for _ in 0..64 {
            assert!(new_snapshot_id() >= 0);
        }
    }

    #[tokio::test]
    async fn commit_conflict_is_an_outcome() {
        let (transport, storage) = connect(status_app(StatusCode::CONFLICT)).await;
        let outcome = transport
            .commit_append(&empty_table(), TableVersion::EMPTY, &batch())
            .await
            .unwrap();
        assert!(matches!(
            outcome,
            CommitOutcome::VersionConflict { ref message } if message.contains("boom")
        ));
        // Data file, manifest and manifest list are staged before the commit.
        let mut paths = storage.paths().unwrap();
        paths.sort();
        assert_eq!(paths.len(), 3);
        assert!(paths[0].starts_with("s3://bucket/t/data/"));
        assert!(paths[1].ends_with("-m0.avro"));
        assert!(paths[2].contains("/metadata/snap-"));

        let list = storage.get(&staged_list(&storage)).await.unwrap();
        let manifests = manifest::read_manifest_list(&list).unwrap();
        assert_eq!(manifests.len(), 1);
        assert_eq!(manifests[0].added_rows_count, 2);
        let entries = manifest::read_manifest(&storage.get(&manifests[0].path).await.unwrap()).unwrap();
        assert_eq!(entries[0].path, paths[0]);
        assert_eq!(entries[0].record_count, 2);
    }

    #[tokio::test]
    async fn append_carries_parent_manifests_forward() {
        let (transport, storage) = connect(status_app(StatusCode::CONFLICT)).await;
        let parent_manifest = ManifestFile {
            path: "s3://bucket/t/metadata/parent-m0.avro".into(),
            length: 100,
            added_snapshot_id: 1,
            sequence_number: 1,
            added_files_count: 1,
            added_rows_count: 5,
        };
        let parent_list = manifest::write_manifest_list(
            ListHeader {
                snapshot_id: 1,
                parent_snapshot_id: None,
                sequence_number: 1,
            },
            None,
            &parent_manifest,
        )
        .unwrap();
        let parent_path = "s3://bucket/t/metadata/snap-1-1-parent.avro";
        storage
            .put(parent_path, parent_list, WritePrecondition::None)
            .await
            .unwrap();

        let table = RemoteTable {
            version: TableVersion::snapshot(1),
            manifest_list: Some(parent_path.into()),
            last_sequence_number: 1,
            total_records: 5,
            ..empty_table()
        };
        transport
            .commit_append(&table, TableVersion::snapshot(1), &batch())
            .await
            .unwrap();

        let list_path = storage
            .paths()
            .unwrap()
            .into_iter()
            .find(|p| p.contains("/metadata/snap-") && p != parent_path)
            .unwrap();
        let list = storage.get(&list_path).await.unwrap();
        let manifests = manifest::read_manifest_list(&list).unwrap();
        assert_eq!(manifests.len(), 2);
        assert_eq!(manifests[0], parent_manifest);
        assert_eq!(manifests[1].sequence_number, 2);
        let header = manifest::read_header(&list).unwrap();
        assert_eq!(header["parent-snapshot-id"], "1");
    }

    #[tokio::test]
    async fn snapshot_without_manifest_list_is_invalid() {
        let (transport, _) = connect(status_app(StatusCode::CONFLICT)).await;
        let table = RemoteTable {
            version: TableVersion::snapshot(1),
            ..empty_table()
        };
        let err = transport
            .commit_append(&table, TableVersion::snapshot(1), &batch())
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::InvalidResponse { .. }));
    }

    #[tokio::test]
    async fn commit_gateway_errors_leave_state_unknown() {
        for status in [StatusCode::INTERNAL_SERVER_ERROR, StatusCode::BAD_GATEWAY] {
            let (transport, _) = connect(status_app(status)).await;
            let err = transport
                .commit_append(&empty_table(), TableVersion::EMPTY, &batch())
                .await
                .unwrap_err();
            assert!(matches!(err, TransportError::CommitStateUnknown { .. }));
        }

        let (transport, _) = connect(status_app(StatusCode::SERVICE_UNAVAILABLE)).await;
        let err = transport
            .commit_append(&empty_table(), TableVersion::EMPTY, &batch())
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn handshake_uses_prefix_from_config() {
        let app = Router::new()
            .route(
                "/v1/config",
                get(|| async { axum::Json(json!({"overrides": {"prefix": "catalogs/main"}})) }),
            )
            .route(
                "/v1/catalogs/main/namespaces",
                post(|| async { StatusCode::CONFLICT }),
            );
        let (transport, _) = connect(app).await;
        let outcome = transport
            .create_namespace(&NamespaceIdent::parse("db").unwrap())
            .await
            .unwrap();
        assert_eq!(outcome, CreateOutcome::AlreadyExists);
    }
}
