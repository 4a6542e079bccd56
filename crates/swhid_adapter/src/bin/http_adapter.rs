#![forbid(unsafe_code)]

use std::{env, net::SocketAddr, sync::Arc};

use axum::{
    body::Bytes,
    extract::State,
    http::{StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use swhid_adapter::{
    identifier_from_resolve_path, parse_known_request, AdapterConfig, AdapterError,
    AdapterHealthResponse, AdapterRuntime,
};
use swhid_resolver::RequestContext;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let config = AdapterConfig::from_env();
    let addr: SocketAddr = config.http_bind.parse()?;
    let runtime = Arc::new(AdapterRuntime::from_config(&config)?);

    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/api/1/known", post(known))
        .route("/api/1/known/", post(known))
        .route("/api/1/resolve/*swhid", get(resolve))
        .with_state(runtime);

    info!(
        %addr,
        request_budget_ms = config.request_budget_ms,
        "swhid_adapter_http listening"
    );
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("swhid_adapter_http stopped");
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("SWHID_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    let json = env::var("SWHID_LOG_FORMAT")
        .map(|v| v.trim().eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "ctrl-c handler unavailable; serving until killed");
        std::future::pending::<()>().await;
    }
}

/// Cancels the request context when the handler future is dropped, so a
/// disconnected client stops outstanding archive and index calls.
struct CancelOnDrop(RequestContext);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.cancel();
    }
}

async fn run_blocking<T, F>(runtime: &Arc<AdapterRuntime>, work: F) -> Result<T, AdapterError>
where
    T: Send + 'static,
    F: FnOnce(&AdapterRuntime, &RequestContext) -> Result<T, AdapterError> + Send + 'static,
{
    let ctx = runtime.request_context();
    let guard = CancelOnDrop(ctx.clone());
    let runtime = runtime.clone();
    let joined = tokio::task::spawn_blocking(move || work(runtime.as_ref(), &ctx)).await;
    drop(guard);
    joined.map_err(|err| AdapterError::internal(format!("request worker failed: {err}")))?
}

fn error_response(err: AdapterError) -> Response {
    let status = StatusCode::from_u16(err.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(err.response)).into_response()
}

async fn healthz(
    State(runtime): State<Arc<AdapterRuntime>>,
) -> (StatusCode, Json<AdapterHealthResponse>) {
    match runtime.health_report() {
        Ok(response) => (StatusCode::OK, Json(response)),
        Err(reason) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(AdapterHealthResponse::unhealthy(reason)),
        ),
    }
}

async fn known(State(runtime): State<Arc<AdapterRuntime>>, body: Bytes) -> Response {
    let texts = match parse_known_request(&body) {
        Ok(texts) => texts,
        Err(err) => return error_response(err),
    };
    match run_blocking(&runtime, move |rt, ctx| rt.known(ctx, &texts)).await {
        Ok(report) => (StatusCode::OK, Json(report)).into_response(),
        Err(err) => error_response(err),
    }
}

/// The identifier is taken from the raw request path so qualifier values keep
/// their percent-encoding as the client sent it.
async fn resolve(State(runtime): State<Arc<AdapterRuntime>>, uri: Uri) -> Response {
    let Some(text) = identifier_from_resolve_path(uri.path()) else {
        return error_response(AdapterError::internal("unexpected resolve route"));
    };
    match run_blocking(&runtime, move |rt, ctx| rt.resolve(ctx, &text)).await {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(err) => error_response(err),
    }
}
