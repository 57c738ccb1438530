//! HTTP façade.
//!
//! A thin axum layer over storage, the RAG service and the runtime catalog.
//! The server keeps answering when the model runtime is down: `/health`
//! reports `installed_models: null` instead of failing.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Status, configured models, live catalog |
//! | `GET`  | `{prefix}/health` | Same as `/health` |
//! | `POST` | `{prefix}/upload` | Multipart `file`, PDF only |
//! | `POST` | `{prefix}/upload-rubric` | Multipart `file`, PDF/TXT/MD |
//! | `POST` | `{prefix}/ingest` | Rebuild the RAG index |
//! | `POST` | `{prefix}/query` | `{question, top_k}` → `{answer}` |
//!
//! `{prefix}` is `api_prefix` from the settings (default `/api`).
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "Missing filename" } }
//! ```
//!
//! Error codes: `bad_request` (400), `internal` (500).
//!
//! # Startup
//!
//! Before binding, [`run_server`] creates the schema, makes sure the runtime
//! is up and pulls any missing required model. Failures there only degrade
//! the service unless `strict_startup` is set.

use anyhow::bail;
use axum::{
    extract::{multipart::Field, DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures_util::TryStreamExt;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::io::StreamReader;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::Settings;
use crate::launcher::OllamaLauncher;
use crate::lifecycle::Coordinator;
use crate::progress::ProgressMode;
use crate::rag::{FileCountRag, RagService, DEFAULT_TOP_K};
use crate::runtime::{format_model_list, ModelName, ModelRuntime, OllamaRuntime};
use crate::storage::{self, StorageLayout};
use crate::{db, migrate};

/// Request body cap for the upload routes.
pub const MAX_UPLOAD_BYTES: usize = 100 * 1024 * 1024;

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub runtime: Arc<dyn ModelRuntime>,
    pub rag: Arc<dyn RagService>,
    pub storage: StorageLayout,
    /// Upload records go here when present.
    pub db: Option<SqlitePool>,
}

/// Build the router for `state`.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api = Router::new()
        .route("/health", get(handle_health))
        .route("/upload", post(handle_upload))
        .route("/upload-rubric", post(handle_upload_rubric))
        .route("/ingest", post(handle_ingest))
        .route("/query", post(handle_query));

    let prefix = state.settings.api_prefix.trim_end_matches('/').to_string();
    let router = if prefix.is_empty() {
        // Prefix "/": the API routes already include /health.
        api
    } else {
        Router::new()
            .route("/health", get(handle_health))
            .nest(&prefix, api)
    };

    router
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bring the runtime up, pull required models, then serve until `shutdown`
/// is cancelled.
pub async fn run_server(settings: &Settings, shutdown: CancellationToken) -> anyhow::Result<()> {
    let settings = Arc::new(settings.clone());

    let pool = db::connect(&settings).await?;
    migrate::apply_schema(&pool).await?;

    let runtime: Arc<dyn ModelRuntime> = Arc::new(OllamaRuntime::from_settings(
        settings.endpoint()?,
        &settings,
    ));
    let mut coordinator = Coordinator::new(
        runtime.clone(),
        Box::new(OllamaLauncher::new(settings.ollama_executable.clone())),
    )
    .with_progress(ProgressMode::Off)
    .with_cancellation(shutdown.clone());
    prepare_runtime(&settings, &mut coordinator).await?;

    let storage = StorageLayout::from_settings(&settings);
    storage.ensure_uploads_dir().await?;
    storage.ensure_rubrics_dir().await?;
    let rag: Arc<dyn RagService> = Arc::new(FileCountRag::new(storage.sources_dir()));

    let bind_addr = settings.bind.clone();
    info!(environment = %settings.environment, bind = %bind_addr, "starting server");
    let app = build_router(AppState {
        settings,
        runtime,
        rag,
        storage,
        db: Some(pool.clone()),
    });

    println!("Server listening on http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    pool.close().await;
    Ok(())
}

/// Startup hook: ensure the runtime and the configured models, in quiet mode.
///
/// Returns an error only when `strict_startup` is set and something is
/// missing; otherwise problems are logged and the server runs degraded.
pub async fn prepare_runtime(settings: &Settings, coordinator: &mut Coordinator) -> anyhow::Result<()> {
    if !coordinator.ensure_server(settings.wait_timeout()).await {
        if settings.strict_startup {
            bail!(
                "Could not start or reach Ollama at {}",
                settings.ollama_base_url
            );
        }
        warn!(endpoint = %settings.ollama_base_url, "runtime unreachable; serving in degraded mode");
        return Ok(());
    }

    let required = settings.required_models();
    let ensured = coordinator.ensure_models(&required, true).await;
    let missing = required.missing(&ensured);
    if missing.is_empty() {
        info!(models = ?ensured, "required models ready");
    } else if settings.strict_startup {
        bail!("Failed to ensure models: {}", format_model_list(&missing));
    } else {
        warn!(missing = ?missing, "required models missing; serving in degraded mode");
    }
    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: message.into(),
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    ollama_base_url: String,
    default_model: String,
    embedding_model: String,
    /// `null` when the catalog could not be read.
    installed_models: Option<Vec<ModelName>>,
}

async fn handle_health(State(state): State<AppState>) -> Json<HealthResponse> {
    let installed_models = match state.runtime.list_models().await {
        Ok(models) => Some(models),
        Err(e) => {
            warn!(error = %e, "health: catalog unavailable");
            None
        }
    };
    Json(HealthResponse {
        status: "ok",
        ollama_base_url: state.settings.ollama_base_url.clone(),
        default_model: state.settings.default_model.clone(),
        embedding_model: state.settings.embedding_model.clone(),
        installed_models,
    })
}

// ============ POST /upload, /upload-rubric ============

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UploadKind {
    Assignment,
    Rubric,
}

impl UploadKind {
    fn accepts(self, extension: Option<&str>) -> bool {
        match self {
            UploadKind::Assignment => extension == Some("pdf"),
            UploadKind::Rubric => matches!(extension, Some("pdf" | "txt" | "md")),
        }
    }

    fn rejection(self) -> &'static str {
        match self {
            UploadKind::Assignment => "Only PDF files are accepted at this endpoint",
            UploadKind::Rubric => "Rubric must be a PDF, TXT, or MD file",
        }
    }

    fn label(self) -> &'static str {
        match self {
            UploadKind::Assignment => "assignment",
            UploadKind::Rubric => "rubric",
        }
    }

    fn dir(self, layout: &StorageLayout) -> PathBuf {
        match self {
            UploadKind::Assignment => layout.uploads_dir(),
            UploadKind::Rubric => layout.rubrics_dir(),
        }
    }
}

#[derive(Debug, Serialize)]
struct UploadResponse {
    status: &'static str,
    filename: String,
    stored_as: String,
    bytes: u64,
    sha256: String,
}

async fn handle_upload(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    store_upload(&state, multipart, UploadKind::Assignment).await
}

async fn handle_upload_rubric(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    store_upload(&state, multipart, UploadKind::Rubric).await
}

async fn store_upload(
    state: &AppState,
    mut multipart: Multipart,
    kind: UploadKind,
) -> Result<Json<UploadResponse>, AppError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(e.body_text()))?
    {
        if field.name() == Some("file") {
            return store_field(state, field, kind).await;
        }
    }
    Err(bad_request("Missing file field"))
}

/// A multipart body that broke off or was malformed mid-read. Kept apart
/// from disk errors so the client gets a 400 instead of a 500.
#[derive(Debug)]
struct UploadBodyError(String);

impl std::fmt::Display for UploadBodyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for UploadBodyError {}

async fn store_field(
    state: &AppState,
    field: Field<'_>,
    kind: UploadKind,
) -> Result<Json<UploadResponse>, AppError> {
    let original = match field.file_name() {
        Some(name) if !name.trim().is_empty() => name.to_string(),
        _ => return Err(bad_request("Missing filename")),
    };
    if !kind.accepts(storage::extension_of(&original).as_deref()) {
        return Err(bad_request(kind.rejection()));
    }

    let safe_name = storage::sanitize_filename(&original);
    let dir = kind.dir(&state.storage);
    tokio::fs::create_dir_all(&dir)
        .await
        .map_err(|e| internal(format!("Failed to create {}: {}", dir.display(), e)))?;
    let dest = dir.join(&safe_name);

    let body = field.map_err(|e| io::Error::other(UploadBodyError(e.body_text())));
    let reader = StreamReader::new(Box::pin(body));
    let bytes = storage::save_upload(reader, &dest).await.map_err(|e| {
        match e.get_ref().and_then(|inner| inner.downcast_ref::<UploadBodyError>()) {
            Some(body_err) => bad_request(body_err.0.clone()),
            None => internal(format!("Failed to store upload: {}", e)),
        }
    })?;
    let sha256 = storage::compute_sha256(&dest)
        .await
        .map_err(|e| internal(format!("Failed to hash upload: {}", e)))?;

    let stored_as = state
        .storage
        .relative_to_root(&dest)
        .to_string_lossy()
        .replace('\\', "/");
    info!(kind = kind.label(), file = %stored_as, bytes, "stored upload");

    if let Some(pool) = &state.db {
        let meta = serde_json::json!({
            "kind": kind.label(),
            "original_filename": original,
            "bytes": bytes,
            "sha256": sha256,
        });
        if let Err(e) = db::insert_document(pool, &stored_as, &meta).await {
            warn!(error = %e, file = %stored_as, "could not record upload");
        }
    }

    Ok(Json(UploadResponse {
        status: "ok",
        filename: original,
        stored_as,
        bytes,
        sha256,
    }))
}

// ============ POST /ingest ============

async fn handle_ingest(State(state): State<AppState>) -> Result<Json<serde_json::Value>, AppError> {
    let sources = state
        .rag
        .build()
        .await
        .map_err(|e| internal(format!("ingest failed: {:#}", e)))?;
    info!(sources, "ingest complete");
    Ok(Json(serde_json::json!({ "status": "ok" })))
}

// ============ POST /query ============

#[derive(Debug, Deserialize)]
struct QueryRequest {
    question: String,
    #[serde(default = "default_top_k")]
    top_k: usize,
}

fn default_top_k() -> usize {
    DEFAULT_TOP_K
}

#[derive(Debug, Serialize)]
struct QueryResponse {
    answer: String,
}

async fn handle_query(
    State(state): State<AppState>,
    Json(req): Json<QueryRequest>,
) -> Json<QueryResponse> {
    let answer = state.rag.query(&req.question, req.top_k).await;
    Json(QueryResponse { answer })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::CatalogError;
    use crate::launcher::{LaunchError, Launcher, ServerProcessHandle};
    use crate::progress::PullProgressReporter;
    use crate::pull::PullError;
    use crate::runtime::RuntimeEndpoint;
    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tempfile::TempDir;
    use tower::ServiceExt;

    struct StaticRuntime {
        endpoint: RuntimeEndpoint,
        up: bool,
        models: Option<Vec<&'static str>>,
        pull_ok: bool,
    }

    impl StaticRuntime {
        fn new(up: bool, models: Option<Vec<&'static str>>) -> Self {
            Self {
                endpoint: RuntimeEndpoint::parse("http://127.0.0.1:11434").unwrap(),
                up,
                models,
                pull_ok: false,
            }
        }
    }

    #[async_trait]
    impl ModelRuntime for StaticRuntime {
        fn endpoint(&self) -> &RuntimeEndpoint {
            &self.endpoint
        }

        async fn is_up(&self) -> bool {
            self.up
        }

        async fn list_models(&self) -> Result<Vec<ModelName>, CatalogError> {
            match &self.models {
                Some(models) => Ok(models.iter().map(|m| ModelName::from(*m)).collect()),
                None => Err(CatalogError::Status(503)),
            }
        }

        async fn pull(
            &self,
            _model: &ModelName,
            _progress: &dyn PullProgressReporter,
            _cancel: &CancellationToken,
        ) -> Result<(), PullError> {
            if self.pull_ok {
                Ok(())
            } else {
                Err(PullError::Incomplete)
            }
        }
    }

    struct NoLaunch;

    impl Launcher for NoLaunch {
        fn start_background(&self) -> Result<ServerProcessHandle, LaunchError> {
            Err(LaunchError::ExecutableNotFound {
                executable: PathBuf::from("ollama"),
            })
        }
    }

    struct Harness {
        _tmp: TempDir,
        root: PathBuf,
        pool: SqlitePool,
        router: Router,
    }

    async fn harness(runtime: StaticRuntime, api_prefix: &str) -> Harness {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().to_path_buf();
        let pool = db::connect_path(&root.join("storage").join("app.db"))
            .await
            .unwrap();
        migrate::apply_schema(&pool).await.unwrap();

        let settings = Settings {
            api_prefix: api_prefix.to_string(),
            storage_root: root.clone(),
            ..Settings::default()
        };
        let storage = StorageLayout::from_settings(&settings);
        let router = build_router(AppState {
            rag: Arc::new(FileCountRag::new(storage.sources_dir())),
            settings: Arc::new(settings),
            runtime: Arc::new(runtime),
            storage,
            db: Some(pool.clone()),
        });
        Harness {
            _tmp: tmp,
            root,
            pool,
            router,
        }
    }

    async fn send(router: &Router, req: Request<Body>) -> (StatusCode, serde_json::Value) {
        let resp = router.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, json)
    }

    fn get_req(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    const BOUNDARY: &str = "XTESTBOUNDARYX";

    fn multipart_req(uri: &str, filename: Option<&str>, data: &[u8]) -> Request<Body> {
        let disposition = match filename {
            Some(f) => format!("form-data; name=\"file\"; filename=\"{}\"", f),
            None => "form-data; name=\"file\"".to_string(),
        };
        let mut body = Vec::new();
        body.extend_from_slice(
            format!(
                "--{b}\r\nContent-Disposition: {d}\r\nContent-Type: application/octet-stream\r\n\r\n",
                b = BOUNDARY,
                d = disposition
            )
            .as_bytes(),
        );
        body.extend_from_slice(data);
        body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());

        Request::builder()
            .method("POST")
            .uri(uri)
            .header(
                "content-type",
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(body))
            .unwrap()
    }

    fn json_req(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn health_reports_settings_and_catalog() {
        let h = harness(StaticRuntime::new(true, Some(vec!["qwen2.5:7b-instruct"])), "/api").await;
        for uri in ["/health", "/api/health"] {
            let (status, body) = send(&h.router, get_req(uri)).await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body["status"], "ok");
            assert_eq!(body["ollama_base_url"], "http://127.0.0.1:11434");
            assert_eq!(body["default_model"], "qwen2.5:7b-instruct");
            assert_eq!(body["embedding_model"], "nomic-embed-text");
            assert_eq!(body["installed_models"], serde_json::json!(["qwen2.5:7b-instruct"]));
        }
    }

    #[tokio::test]
    async fn health_degrades_when_catalog_is_down() {
        let h = harness(StaticRuntime::new(false, None), "/api").await;
        let (status, body) = send(&h.router, get_req("/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["installed_models"].is_null());
    }

    #[tokio::test]
    async fn upload_pdf_is_stored_hashed_and_recorded() {
        let h = harness(StaticRuntime::new(true, Some(vec![])), "/api").await;
        let data = b"%PDF-1.4 fake";
        let (status, body) = send(&h.router, multipart_req("/api/upload", Some("My Essay.PDF"), data)).await;
        assert_eq!(status, StatusCode::OK, "{}", body);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["filename"], "My Essay.PDF");
        assert_eq!(body["stored_as"], "storage/uploads/My Essay.PDF");
        assert_eq!(body["bytes"], data.len());

        let stored = h.root.join("storage/uploads/My Essay.PDF");
        assert_eq!(std::fs::read(&stored).unwrap(), data);
        let expected = storage::compute_sha256(&stored).await.unwrap();
        assert_eq!(body["sha256"], expected);

        let paths: Vec<String> = sqlx::query_scalar("SELECT path FROM documents")
            .fetch_all(&h.pool)
            .await
            .unwrap();
        assert_eq!(paths, vec!["storage/uploads/My Essay.PDF".to_string()]);
    }

    #[tokio::test]
    async fn truncated_reupload_keeps_stored_file() {
        let h = harness(StaticRuntime::new(true, Some(vec![])), "/api").await;
        let (status, _) = send(
            &h.router,
            multipart_req("/api/upload", Some("a.pdf"), b"GOOD ORIGINAL CONTENT"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        // No closing boundary: the body ends mid-field.
        let cut = format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"a.pdf\"\r\n\r\npartial",
            b = BOUNDARY
        );
        let req = Request::builder()
            .method("POST")
            .uri("/api/upload")
            .header(
                "content-type",
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(cut))
            .unwrap();
        let (status, body) = send(&h.router, req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{}", body);
        assert_eq!(body["error"]["code"], "bad_request");

        let dir = h.root.join("storage/uploads");
        assert_eq!(std::fs::read(dir.join("a.pdf")).unwrap(), b"GOOD ORIGINAL CONTENT");
        let leftovers: Vec<_> = std::fs::read_dir(&dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|n| n.ends_with(".part"))
            .collect();
        assert!(leftovers.is_empty(), "{:?}", leftovers);
    }

    #[tokio::test]
    async fn upload_rejects_non_pdf_and_missing_filename() {
        let h = harness(StaticRuntime::new(true, Some(vec![])), "/api").await;

        let (status, body) = send(&h.router, multipart_req("/api/upload", Some("notes.txt"), b"x")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "bad_request");
        assert_eq!(body["error"]["message"], "Only PDF files are accepted at this endpoint");

        let (status, body) = send(&h.router, multipart_req("/api/upload", None, b"x")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["message"], "Missing filename");
    }

    #[tokio::test]
    async fn rubric_accepts_text_formats_and_sanitises() {
        let h = harness(StaticRuntime::new(true, Some(vec![])), "/api").await;

        let (status, body) = send(
            &h.router,
            multipart_req("/api/upload-rubric", Some("../rubric?.md"), b"# Rubric"),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{}", body);
        assert_eq!(body["filename"], "../rubric?.md");
        assert_eq!(body["stored_as"], "storage/rubrics/..rubric.md");
        assert!(h.root.join("storage/rubrics/..rubric.md").is_file());

        let (status, body) = send(
            &h.router,
            multipart_req("/api/upload-rubric", Some("rubric.docx"), b"x"),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["message"], "Rubric must be a PDF, TXT, or MD file");
    }

    #[tokio::test]
    async fn ingest_and_query() {
        let h = harness(StaticRuntime::new(true, Some(vec![])), "/api").await;

        let (status, body) = send(
            &h.router,
            Request::builder()
                .method("POST")
                .uri("/api/ingest")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, serde_json::json!({"status": "ok"}));
        assert!(h.root.join("data/sources").is_dir());

        let (status, body) = send(
            &h.router,
            json_req("/api/query", serde_json::json!({"question": "What is due?"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let answer = body["answer"].as_str().unwrap();
        assert!(answer.contains("'What is due?'"));
    }

    #[tokio::test]
    async fn custom_prefix() {
        let h = harness(StaticRuntime::new(true, Some(vec![])), "/v1/").await;
        let (status, _) = send(&h.router, get_req("/v1/health")).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = send(&h.router, get_req("/api/health")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn startup_degrades_unless_strict() {
        let settings = Settings {
            wait_timeout_secs: 0,
            ..Settings::default()
        };
        let mut coordinator = Coordinator::new(
            Arc::new(StaticRuntime::new(false, None)),
            Box::new(NoLaunch),
        );
        assert!(prepare_runtime(&settings, &mut coordinator).await.is_ok());

        let strict = Settings {
            strict_startup: true,
            ..settings
        };
        let mut coordinator = Coordinator::new(
            Arc::new(StaticRuntime::new(false, None)),
            Box::new(NoLaunch),
        );
        assert!(prepare_runtime(&strict, &mut coordinator).await.is_err());
    }

    #[tokio::test]
    async fn strict_startup_fails_on_missing_models() {
        let settings = Settings {
            strict_startup: true,
            ..Settings::default()
        };
        let mut coordinator = Coordinator::new(
            Arc::new(StaticRuntime::new(true, Some(vec!["qwen2.5:7b-instruct"]))),
            Box::new(NoLaunch),
        );
        let err = prepare_runtime(&settings, &mut coordinator).await.unwrap_err();
        assert!(err.to_string().contains("nomic-embed-text"));

        let mut coordinator = Coordinator::new(
            Arc::new(StaticRuntime::new(
                true,
                Some(vec!["qwen2.5:7b-instruct", "nomic-embed-text"]),
            )),
            Box::new(NoLaunch),
        );
        assert!(prepare_runtime(&settings, &mut coordinator).await.is_ok());
    }
}
