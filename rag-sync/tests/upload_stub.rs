// Exercises RagClient and a full `sync` run against an in-process stub of the
// RAG document endpoints.

use axum::{
    extract::{Multipart, Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use rag_sync::cli::{run, Cli, Commands};
use rag_sync::upload::RagClient;
use rag_sync_core::contract::{DocumentMetadata, LedgerStore, NewDocument, SyncStatus, Uploader};
use rag_sync_core::error::UploadError;
use rag_sync_core::ledger::JsonFileLedger;
use serde_json::json;
use serial_test::serial;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone, Default)]
struct ReceivedUpload {
    profile: String,
    authorization: Option<String>,
    filename_header: Option<String>,
    file_name: Option<String>,
    bytes: Vec<u8>,
    metadata: Option<String>,
}

#[derive(Clone, Default)]
struct StubState {
    uploads: Arc<Mutex<Vec<ReceivedUpload>>>,
    deletes: Arc<Mutex<Vec<(String, String)>>>,
}

async fn upload_document(
    State(state): State<StubState>,
    Path(profile): Path<String>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Response {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned)
    };
    let mut received = ReceivedUpload {
        profile: profile.clone(),
        authorization: header("authorization"),
        filename_header: header("filename"),
        ..Default::default()
    };
    while let Some(field) = multipart.next_field().await.unwrap() {
        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            Some("file") => {
                received.file_name = field.file_name().map(str::to_owned);
                received.bytes = field.bytes().await.unwrap().to_vec();
            }
            Some("metadata") => received.metadata = Some(field.text().await.unwrap()),
            _ => {}
        }
    }
    if profile == "reject" {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"errors": [{"id": 1001, "description": "unsupported document"}]})),
        )
            .into_response();
    }

    let mut uploads = state.uploads.lock().unwrap();
    uploads.push(received.clone());
    Json(json!({
        "id": format!("doc-{}", uploads.len()),
        "name": received.file_name,
        "indexStatus": "Unknown",
    }))
    .into_response()
}

async fn get_profile(Path(profile): Path<String>, headers: HeaderMap) -> Response {
    let authorised = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        == Some("Bearer secret-token");
    if !authorised {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    if profile == "missing" {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({"errors": [{"id": 2041, "description": "profile not found"}]})),
        )
            .into_response();
    }
    Json(json!({"name": profile, "status": 1})).into_response()
}

async fn delete_document(
    State(state): State<StubState>,
    Path((profile, id)): Path<(String, String)>,
) -> StatusCode {
    if id == "missing" {
        return StatusCode::NOT_FOUND;
    }
    state.deletes.lock().unwrap().push((profile, id));
    StatusCode::OK
}

async fn start_stub() -> (SocketAddr, StubState) {
    let state = StubState::default();
    let app = Router::new()
        .route("/v1/search/profile/{profile}", get(get_profile))
        .route("/v1/search/profile/{profile}/document", post(upload_document))
        .route(
            "/v1/search/profile/{profile}/document/{id}",
            delete(delete_document),
        )
        .with_state(state.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, state)
}

fn client(addr: SocketAddr, profile: &str) -> RagClient {
    RagClient::new(
        format!("http://{addr}/"),
        profile,
        "secret-token",
        Duration::from_secs(5),
    )
    .unwrap()
}

#[tokio::test]
async fn test_upload_sends_file_metadata_and_auth() {
    let (addr, state) = start_stub().await;
    let rag = client(addr, "handbook");
    let mut metadata = DocumentMetadata::new();
    metadata.insert("source".into(), json!("folder:/docs"));

    let uploaded = rag
        .upload(NewDocument {
            file_name: "guide.pdf",
            content_type: "application/pdf",
            content: b"%PDF-1.4",
            metadata: &metadata,
        })
        .await
        .expect("upload accepted");

    assert_eq!(uploaded.document_id, "doc-1");
    assert_eq!(uploaded.index_status.as_deref(), Some("Unknown"));

    let uploads = state.uploads.lock().unwrap();
    assert_eq!(uploads.len(), 1);
    let got = &uploads[0];
    assert_eq!(got.profile, "handbook");
    assert_eq!(got.authorization.as_deref(), Some("Bearer secret-token"));
    assert_eq!(got.filename_header.as_deref(), Some("guide.pdf"));
    assert_eq!(got.file_name.as_deref(), Some("guide.pdf"));
    assert_eq!(got.bytes, b"%PDF-1.4");
    let sent: serde_json::Value = serde_json::from_str(got.metadata.as_deref().unwrap()).unwrap();
    assert_eq!(sent["source"], "folder:/docs");
}

#[tokio::test]
async fn test_rejected_upload_carries_status_and_reason() {
    let (addr, _state) = start_stub().await;
    let rag = client(addr, "reject");
    let metadata = DocumentMetadata::new();

    let err = rag
        .upload(NewDocument {
            file_name: "bad.bin",
            content_type: "application/octet-stream",
            content: b"x",
            metadata: &metadata,
        })
        .await
        .unwrap_err();

    match err {
        UploadError::Rejected { status, body } => {
            assert_eq!(status, 400);
            assert!(body.contains("unsupported document"), "body: {body}");
        }
        other => panic!("expected rejection, got {other:?}"),
    }
}

#[tokio::test]
async fn test_delete_targets_document_route() {
    let (addr, state) = start_stub().await;
    let rag = client(addr, "handbook");

    rag.delete("doc-42").await.expect("delete accepted");
    let err = rag.delete("missing").await.unwrap_err();

    assert!(matches!(err, UploadError::Rejected { status: 404, .. }));
    assert_eq!(
        *state.deletes.lock().unwrap(),
        vec![("handbook".to_string(), "doc-42".to_string())]
    );
}

#[tokio::test]
async fn test_profile_check_accepts_known_profile() {
    let (addr, _state) = start_stub().await;
    client(addr, "handbook")
        .check_profile()
        .await
        .expect("profile exists");
}

#[tokio::test]
async fn test_profile_check_rejects_unknown_profile_and_bad_token() {
    let (addr, _state) = start_stub().await;

    let err = client(addr, "missing").check_profile().await.unwrap_err();
    match err {
        UploadError::Rejected { status, body } => {
            assert_eq!(status, 404);
            assert!(body.contains("profile not found"), "body: {body}");
        }
        other => panic!("expected rejection, got {other:?}"),
    }

    let wrong_token = RagClient::new(
        format!("http://{addr}"),
        "handbook",
        "stale-token",
        Duration::from_secs(5),
    )
    .unwrap();
    let err = wrong_token.check_profile().await.unwrap_err();
    assert!(matches!(err, UploadError::Rejected { status: 401, .. }), "got {err:?}");
}

#[tokio::test]
async fn test_unreachable_server_is_a_transport_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = client(addr, "handbook").delete("doc-1").await.unwrap_err();
    assert!(matches!(err, UploadError::Transport(_)), "got {err:?}");
}

/// Writes two documents and a config targeting `profile` on the stub.
fn sync_workspace(addr: SocketAddr, profile: &str) -> (tempfile::TempDir, PathBuf, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let docs = dir.path().join("docs");
    std::fs::create_dir_all(&docs).unwrap();
    std::fs::write(docs.join("a.md"), "alpha").unwrap();
    std::fs::write(docs.join("b.md"), "beta").unwrap();
    let ledger_path = dir.path().join("ledger.json");
    let config_path = dir.path().join("config.yaml");
    std::fs::write(
        &config_path,
        format!(
            "source:\n  type: folder\n  root: {}\nledger:\n  path: {}\nrag:\n  base_url: http://{addr}\n  profile: {profile}\n",
            docs.display(),
            ledger_path.display()
        ),
    )
    .unwrap();
    std::env::set_var("RAG_API_TOKEN", "secret-token");
    std::env::remove_var("RAG_BASE_URL");
    std::env::remove_var("RAG_PROFILE");
    (dir, config_path, ledger_path)
}

#[tokio::test]
#[serial]
async fn test_sync_command_uploads_once_and_records_ledger() {
    let (addr, state) = start_stub().await;
    let (_dir, config_path, ledger_path) = sync_workspace(addr, "handbook");

    let sync = || Cli {
        command: Commands::Sync {
            config: config_path.clone(),
            json: false,
        },
    };
    run(sync()).await.expect("first sync succeeds");
    run(sync()).await.expect("second sync succeeds");
    std::env::remove_var("RAG_API_TOKEN");

    assert_eq!(state.uploads.lock().unwrap().len(), 2, "unchanged files are not re-uploaded");

    let ledger = JsonFileLedger::open(&ledger_path).unwrap();
    let records = ledger.list().await.unwrap();
    assert_eq!(records.len(), 2);
    assert!(records
        .iter()
        .all(|r| r.status == SyncStatus::Success && r.remote_document_id.is_some()));
}

#[tokio::test]
#[serial]
async fn test_sync_command_with_unknown_profile_touches_nothing() {
    let (addr, state) = start_stub().await;
    let (_dir, config_path, ledger_path) = sync_workspace(addr, "missing");

    let err = run(Cli {
        command: Commands::Sync {
            config: config_path,
            json: false,
        },
    })
    .await
    .unwrap_err();
    std::env::remove_var("RAG_API_TOKEN");

    assert!(err.to_string().contains("profile check failed"), "got {err:#}");
    assert!(state.uploads.lock().unwrap().is_empty());
    assert!(
        !ledger_path.exists(),
        "no ledger record is written when the profile is rejected"
    );
}
