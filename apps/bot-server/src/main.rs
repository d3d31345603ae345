//! bot-server: HTTP host for the link-menu bot.
//!
//! A transport bridge (the chat platform webhook or poller) posts each user
//! message or button press to `/api/events` and relays the returned replies.
//! Administrators can also read slot configuration, toggle slots and
//! download the user export over plain HTTP, identifying themselves with the
//! `x-user-id` header.
//!
//! - Storage: In-memory or SQLite (file) when the `sqlite` feature is enabled.
//! - Logs: pretty (default) or JSON via `LOG_FORMAT`, every request traced
//!   with an `x-request-id`.
//!
//! Run:
//! ```bash
//! ADMIN_IDS=123456789 DB_PATH=./data/bot.db cargo run -p bot-server
//! ```
//!
//! Configuration: See `config.rs` for all environment variables.

mod config;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, patch, post},
    Json, Router,
};
use domain::adapters::memory_repo::{InMemoryClickRepo, InMemoryLinkRepo, InMemoryUserRepo};
use domain::export::ExportService;
use domain::router::{MenuRouter, Reply};
use domain::service::ConfigStore;
use domain::session::InMemorySessionStore;
use domain::stats::ClickLog;
use domain::workflow::EditWorkflow;
use domain::{
    AdminList, ClickRepository, Clock, CoreError, LinkConfig, LinkConfigRepository, Slot,
    SystemClock, User, UserId, UserRepository,
};
use serde::{Deserialize, Serialize};
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const USER_HEADER: &str = "x-user-id";

/// The three storage ports, backed by one store.
#[derive(Clone)]
struct Stores {
    links: Arc<dyn LinkConfigRepository>,
    clicks: Arc<dyn ClickRepository>,
    users: Arc<dyn UserRepository>,
}

impl Stores {
    fn memory() -> Self {
        Self {
            links: Arc::new(InMemoryLinkRepo::new()),
            clicks: Arc::new(InMemoryClickRepo::new()),
            users: Arc::new(InMemoryUserRepo::new()),
        }
    }

    #[cfg(feature = "sqlite")]
    fn sqlite(path: Option<&std::path::Path>) -> Result<Self, CoreError> {
        let repo = Arc::new(match path {
            Some(p) => sqlite_adapter::SqliteRepo::open_creating_dirs(p)?,
            None => sqlite_adapter::SqliteRepo::from_env()?,
        });
        Ok(Self {
            links: repo.clone(),
            clicks: repo.clone(),
            users: repo,
        })
    }
}

#[derive(Clone)]
struct AppState {
    router: Arc<MenuRouter>,
    config: ConfigStore,
    exporter: ExportService,
    admins: AdminList,
    bot_name: Arc<str>,
}

// Wire services over the given stores and seed any missing slot records.
fn build_state(cfg: &config::Config, stores: Stores) -> Result<AppState, CoreError> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let admins = cfg.admins();

    let config = ConfigStore::new(stores.links, clock.clone(), cfg.url_policy());
    let seeded = config.seed_defaults()?;
    info!(seeded, "slot defaults checked");

    let workflow = EditWorkflow::new(
        admins.clone(),
        Arc::new(InMemorySessionStore::new()),
        config.clone(),
        clock.clone(),
        cfg.workflow_options(),
    );
    let log = ClickLog::new(stores.clicks, stores.users);
    let exporter = ExportService::new(log.clone());
    let router = MenuRouter::new(config.clone(), log, workflow, admins.clone(), clock);

    Ok(AppState {
        router: Arc::new(router),
        config,
        exporter,
        admins,
        bot_name: Arc::from(cfg.bot_name.as_str()),
    })
}

// Construct the stores based on config and feature flags.
fn build_stores(cfg: &config::Config) -> Result<Stores, CoreError> {
    match cfg.storage_provider {
        #[cfg(feature = "sqlite")]
        config::StorageProvider::Sqlite => Stores::sqlite(cfg.db_path.as_deref()),
        #[cfg(not(feature = "sqlite"))]
        config::StorageProvider::Sqlite => {
            warn!("built without the `sqlite` feature; falling back to memory storage");
            Ok(Stores::memory())
        }
        config::StorageProvider::Memory => Ok(Stores::memory()),
    }
}

fn init_tracing(cfg: &config::Config) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(env_filter);
    match cfg.log_format {
        config::LogFormat::Json => {
            registry
                .with(
                    fmt::layer()
                        .json()
                        .with_target(true)
                        .with_timer(fmt::time::SystemTime)
                        .with_writer(std::io::stdout),
                )
                .init();
        }
        config::LogFormat::Pretty => {
            registry
                .with(
                    fmt::layer()
                        .pretty()
                        .with_target(true)
                        .with_writer(std::io::stdout),
                )
                .init();
        }
    }
}

fn app(state: AppState) -> Router {
    let x_request_id = axum::http::HeaderName::from_static("x-request-id");

    Router::new()
        .route("/healthz", get(healthz))
        .route("/api/events", post(post_event))
        .route("/api/links", get(list_links))
        .route("/api/links/:slot", patch(update_link))
        .route("/api/export", get(export_users))
        .layer(PropagateRequestIdLayer::new(x_request_id.clone()))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("-");
                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id = %request_id,
                )
            }),
        )
        .layer(SetRequestIdLayer::new(x_request_id, MakeRequestUuid))
        .with_state(state)
}

#[tokio::main]
async fn main() {
    // Load and validate config first (fail fast on misconfiguration)
    let cfg = match config::Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    init_tracing(&cfg);
    cfg.warn_if_degraded();

    let state = match build_stores(&cfg).and_then(|stores| build_state(&cfg, stores)) {
        Ok(s) => s,
        Err(e) => {
            error!(err = ?e, "storage initialisation failed");
            std::process::exit(1);
        }
    };

    let addr: SocketAddr = ([0, 0, 0, 0], cfg.port).into();
    info!(%addr, bot = %cfg.bot_name, "bot-server listening");
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            error!(%addr, err = %e, "bind failed");
            std::process::exit(1);
        }
    };
    if let Err(e) = axum::serve(listener, app(state)).await {
        error!(err = %e, "server error");
    }
}

// ============ Request / response bodies ============

#[derive(Deserialize)]
struct UserIn {
    id: i64,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    first_name: Option<String>,
    #[serde(default)]
    last_name: Option<String>,
}

impl From<UserIn> for User {
    fn from(u: UserIn) -> Self {
        User {
            user_id: UserId::new(u.id),
            username: u.username,
            first_name: u.first_name,
            last_name: u.last_name,
        }
    }
}

/// One user action forwarded by the transport bridge.
#[derive(Deserialize)]
struct EventReq {
    user: UserIn,
    /// Message text or button callback data.
    input: String,
}

#[derive(Serialize)]
struct EventResp {
    replies: Vec<Reply>,
}

#[derive(Deserialize)]
struct UpdateLinkReq {
    is_active: bool,
}

#[derive(Serialize)]
struct LinkOut {
    slot: Slot,
    label: String,
    url: String,
    description: String,
    is_active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    updated_by: Option<UserId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    updated_at: Option<String>,
}

impl From<LinkConfig> for LinkOut {
    fn from(cfg: LinkConfig) -> Self {
        LinkOut {
            slot: cfg.slot,
            label: cfg.label,
            url: cfg.url,
            description: cfg.description,
            is_active: cfg.is_active,
            updated_by: cfg.updated_by,
            updated_at: cfg.updated_at.map(http_common::system_time_to_rfc3339),
        }
    }
}

#[derive(Serialize)]
struct ListOut {
    links: Vec<LinkOut>,
}

// ============ Error mapping ============

fn error_code(e: &CoreError) -> &'static str {
    match e {
        CoreError::Forbidden => "forbidden",
        CoreError::UnknownSlot(_) => "unknown_slot",
        CoreError::InvalidUrl(_) => "invalid_url",
        CoreError::StoreUnavailable(_) => "store_unavailable",
        CoreError::Export(_) => "export_failed",
    }
}

fn error_response(code: &str, body: serde_json::Value) -> Response {
    let status = StatusCode::from_u16(http_common::status_for_code(code))
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(body)).into_response()
}

fn core_error_response(e: &CoreError) -> Response {
    let code = error_code(e);
    match e {
        // Internal detail stays in the logs.
        CoreError::StoreUnavailable(_) | CoreError::Export(_) => {
            error!(err = ?e, "request failed");
            error_response(code, http_common::json_err(code))
        }
        _ => error_response(
            code,
            http_common::json_error_with_message(code, &e.to_string()),
        ),
    }
}

/// Resolve the caller from `x-user-id` and require them to be an administrator.
fn require_admin(state: &AppState, headers: &HeaderMap) -> Result<UserId, Response> {
    let Some(id) = headers
        .get(USER_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<i64>().ok())
        .map(UserId::new)
    else {
        return Err(error_response(
            "unauthorized",
            http_common::json_error_with_message("unauthorized", "missing or invalid x-user-id header"),
        ));
    };
    if let Err(e) = state.admins.ensure(id) {
        warn!(user = %id, "admin endpoint refused");
        return Err(core_error_response(&e));
    }
    Ok(id)
}

// ============ Handlers ============

async fn healthz(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({"status": "ok", "bot": &*state.bot_name}))
}

async fn post_event(State(state): State<AppState>, Json(body): Json<EventReq>) -> impl IntoResponse {
    let user = User::from(body.user);
    let replies = state.router.handle_raw(user, &body.input);
    Json(EventResp { replies })
}

async fn list_links(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Err(resp) = require_admin(&state, &headers) {
        return resp;
    }
    match state.config.summary() {
        Ok(configs) => Json(ListOut {
            links: configs.into_iter().map(LinkOut::from).collect(),
        })
        .into_response(),
        Err(e) => core_error_response(&e),
    }
}

async fn update_link(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(slot): Path<String>,
    Json(body): Json<UpdateLinkReq>,
) -> Response {
    let admin = match require_admin(&state, &headers) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let slot = match Slot::parse(&slot) {
        Ok(s) => s,
        Err(e) => return core_error_response(&e),
    };
    match state.config.set_active(slot, body.is_active, admin) {
        Ok(saved) => Json(LinkOut::from(saved)).into_response(),
        Err(e) => core_error_response(&e),
    }
}

async fn export_users(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let admin = match require_admin(&state, &headers) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match state.exporter.export_users() {
        Ok(file) => {
            info!(admin = %admin, filename = %file.filename, "export served");
            (
                StatusCode::OK,
                [
                    (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
                    (
                        header::CONTENT_DISPOSITION,
                        http_common::attachment_disposition(&file.filename),
                    ),
                ],
                file.content,
            )
                .into_response()
        }
        Err(e) => core_error_response(&e),
    }
}
