// ./api/src/main.rs
use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json as JsonResponse, Response},
    routing::{delete, get, post},
};
use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tracing::{error, info, level_filters::LevelFilter, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use application::{
    AddCategoryRequest, ApplicationError, BlogService, MigrationReport, MigrationService,
    MigrationStatus, PostCreatedResponse, SnapshotSource, StatusReporter, StoreError,
};
use async_trait::async_trait;
use domain::{Fields, PostId};
use infrastructure::snapshot::DEFAULT_SNAPSHOT_PATH;
use infrastructure::{FileSnapshotSource, HttpSnapshotSource, InMemoryDocumentStore};

/// Holds the last status reported by the migration driver.
#[derive(Default)]
struct StatusBoard {
    current: RwLock<Option<MigrationReport>>,
}

#[async_trait]
impl StatusReporter for StatusBoard {
    async fn report(&self, status: MigrationStatus, message: &str) {
        info!(?status, "Migration status: {}", message);
        *self.current.write().await = Some(MigrationReport {
            status,
            message: message.to_string(),
        });
    }
}

#[derive(Clone)]
struct AppState {
    blog_service: Arc<BlogService>,
    migration_service: Arc<MigrationService>,
    status_board: Arc<StatusBoard>,
}

const DEFAULT_PORT: u16 = 3000;

#[tokio::main]
async fn main() {
    // --- Logger Initialization ---
    let filter: EnvFilter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();
    info!("Logger initialized successfully.");

    let port = port_from_env();
    let snapshot_source = snapshot_source_from_env();

    // --- Dependency Injection ---
    let store = Arc::new(InMemoryDocumentStore::new());
    info!("In-memory document store initialized.");

    let blog_service = Arc::new(BlogService::new(store));
    let migration_service = Arc::new(MigrationService::new(
        snapshot_source,
        blog_service.clone(),
    ));
    info!("Application services initialized.");

    let app_state = AppState {
        blog_service,
        migration_service,
        status_board: Arc::new(StatusBoard::default()),
    };

    // --- API Router Definition ---
    let router = app(app_state);
    info!("API routes configured.");

    // --- Server Startup ---
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = match TcpListener::bind(addr).await {
        Ok(listener) => {
            info!("Server listening on {}", addr);
            listener
        }
        Err(e) => {
            error!("Failed to bind to address {}: {}", addr, e);
            std::process::exit(1);
        }
    };
    if let Err(e) = axum::serve(listener, router.into_make_service()).await {
        error!("Server error: {}", e);
        std::process::exit(1);
    }
}

// --- Configuration ---

fn port_from_env() -> u16 {
    match env::var("PORT") {
        Ok(port_str) => match u16::from_str(&port_str) {
            Ok(port_num) => {
                info!("Using port {} from environment variable PORT.", port_num);
                port_num
            }
            Err(_) => {
                warn!(
                    "Invalid PORT value '{}' in environment variable. Using default port {}.",
                    port_str, DEFAULT_PORT
                );
                DEFAULT_PORT
            }
        },
        Err(_) => {
            info!(
                "PORT environment variable not set. Using default port {}.",
                DEFAULT_PORT
            );
            DEFAULT_PORT
        }
    }
}

/// `SNAPSHOT_URL` wins over `SNAPSHOT_PATH`; with neither set the snapshot is
/// read from the default path.
fn snapshot_source_from_env() -> Arc<dyn SnapshotSource> {
    if let Ok(url) = env::var("SNAPSHOT_URL") {
        if !url.trim().is_empty() {
            info!(url = %url, "Snapshot will be fetched over HTTP.");
            return Arc::new(HttpSnapshotSource::new(url));
        }
        warn!("SNAPSHOT_URL is empty. Falling back to a local snapshot file.");
    }
    let path = env::var("SNAPSHOT_PATH").unwrap_or_else(|_| DEFAULT_SNAPSHOT_PATH.to_string());
    info!(path = %path, "Snapshot will be read from a local file.");
    Arc::new(FileSnapshotSource::new(path))
}

// --- API Router ---

fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/posts", get(list_posts_handler).post(create_post_handler))
        .route(
            "/posts/:id",
            get(get_post_handler)
                .patch(update_post_handler)
                .delete(delete_post_handler),
        )
        .route("/posts/:id/adjacent", get(adjacent_posts_handler))
        .route(
            "/categories",
            get(list_categories_handler).post(add_category_handler),
        )
        .route("/categories/:name", delete(delete_category_handler))
        .route("/migration", post(run_migration_handler))
        .route("/migration/status", get(migration_status_handler))
        .with_state(state)
}

// --- API Handlers ---

async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

// --- Post Handlers ---

async fn list_posts_handler(State(state): State<AppState>) -> Response {
    match state.blog_service.get_all_posts().await {
        Ok(posts) => (StatusCode::OK, JsonResponse(posts)).into_response(),
        Err(e) => map_application_error_to_response(e),
    }
}

async fn create_post_handler(
    State(state): State<AppState>,
    Json(fields): Json<Fields>,
) -> Response {
    match state.blog_service.add_post(fields).await {
        Ok(id) => (StatusCode::CREATED, JsonResponse(PostCreatedResponse { id })).into_response(),
        Err(e) => map_application_error_to_response(e),
    }
}

async fn get_post_handler(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let id = PostId::new(id);
    match state.blog_service.get_post(&id).await {
        Ok(Some(post)) => (StatusCode::OK, JsonResponse(post)).into_response(),
        Ok(None) => (StatusCode::NOT_FOUND, format!("Post '{}' not found", id)).into_response(),
        Err(e) => map_application_error_to_response(e),
    }
}

async fn update_post_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(fields): Json<Fields>,
) -> Response {
    match state
        .blog_service
        .update_post(&PostId::new(id), fields)
        .await
    {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => map_application_error_to_response(e),
    }
}

async fn delete_post_handler(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.blog_service.delete_post(&PostId::new(id)).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => map_application_error_to_response(e),
    }
}

async fn adjacent_posts_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Response {
    match state
        .blog_service
        .get_adjacent_posts(&PostId::new(id))
        .await
    {
        Ok(adjacent) => (StatusCode::OK, JsonResponse(adjacent)).into_response(),
        Err(e) => map_application_error_to_response(e),
    }
}

// --- Category Handlers ---

async fn list_categories_handler(State(state): State<AppState>) -> Response {
    match state.blog_service.get_all_categories().await {
        Ok(categories) => (StatusCode::OK, JsonResponse(categories)).into_response(),
        Err(e) => map_application_error_to_response(e),
    }
}

async fn add_category_handler(
    State(state): State<AppState>,
    Json(request): Json<AddCategoryRequest>,
) -> Response {
    let name = request.name.trim();
    if name.is_empty() {
        return map_application_error_to_response(ApplicationError::InvalidInput(
            "Category name cannot be empty".to_string(),
        ));
    }
    match state.blog_service.add_category(name).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => map_application_error_to_response(e),
    }
}

async fn delete_category_handler(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Response {
    // Names are stored trimmed.
    match state.blog_service.delete_category(name.trim()).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => map_application_error_to_response(e),
    }
}

// --- Migration Handlers ---

/// Runs the snapshot migration. The runner never fails; the outcome is in the body.
async fn run_migration_handler(State(state): State<AppState>) -> Response {
    info!("Received request to run snapshot migration");
    let report = state
        .migration_service
        .run_with_status(state.status_board.as_ref())
        .await;
    (StatusCode::OK, JsonResponse(report)).into_response()
}

async fn migration_status_handler(State(state): State<AppState>) -> Response {
    let current = state.status_board.current.read().await.clone();
    (StatusCode::OK, JsonResponse(current)).into_response()
}

/// Maps ApplicationError to an HTTP status code and response body.
fn map_application_error_to_response(err: ApplicationError) -> Response {
    let (status, body) = match err {
        ApplicationError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, msg),
        ApplicationError::DomainError(domain_err) => {
            warn!("Domain validation failed: {}", domain_err);
            (StatusCode::BAD_REQUEST, domain_err.to_string())
        }
        ApplicationError::Store(StoreError::Unavailable(msg)) => {
            error!("Document store unavailable: {}", msg);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                "The document store is unavailable".to_string(),
            )
        }
        ApplicationError::Store(store_err) => {
            error!("Underlying store error: {}", store_err);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "An internal server error occurred".to_string(),
            )
        }
        // Only the migration runner fetches and parses snapshots, and it reports
        // those failures in its own response body.
        err @ (ApplicationError::Fetch { .. } | ApplicationError::Parse { .. }) => {
            error!("Unexpected snapshot error: {}", err);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "An internal server error occurred".to_string(),
            )
        }
    };
    (status, body).into_response()
}
