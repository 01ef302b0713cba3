//! HTTP front end for the page gateway

use std::future::Future;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{header, Method, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::cms::CmsGateway;
use crate::error::{CmsError, Result};

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    gateway: Arc<CmsGateway>,
}

impl AppState {
    pub fn new(gateway: CmsGateway) -> Self {
        Self {
            gateway: Arc::new(gateway),
        }
    }
}

/// JSON envelope for wrapped responses
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResult {
    pub result_code: String,
    pub result_object: String,
}

impl ApiResult {
    pub fn success(result: impl Into<String>) -> Self {
        Self {
            result_code: "success".to_string(),
            result_object: result.into(),
        }
    }

    pub fn not_found(result: impl Into<String>) -> Self {
        Self {
            result_code: "notFound".to_string(),
            result_object: result.into(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub layout: Option<String>,
    #[serde(default)]
    pub wrapped: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub layout: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PingQuery {
    pub msg: Option<String>,
}

/// Build the router
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET]);

    Router::new()
        .route("/", get(home_handler))
        .route("/page", get(default_page_handler))
        .route("/page/*file", get(page_handler))
        .route("/image", get(default_image_handler))
        .route("/image/*file", get(image_handler))
        .route("/list", get(list_handler))
        .route("/ping", get(ping_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Serve `router` on `bind` until `shutdown` resolves
pub async fn serve<F>(bind: &str, router: Router, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = tokio::net::TcpListener::bind(bind).await?;
    tracing::info!(addr = %listener.local_addr()?, "Page server listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await?;

    tracing::info!("Page server stopped");
    Ok(())
}

async fn home_handler(State(state): State<AppState>) -> Redirect {
    Redirect::temporary(&state.gateway.home_path())
}

async fn default_page_handler(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> Result<Response> {
    render_page(&state, None, query).await
}

async fn page_handler(
    State(state): State<AppState>,
    Path(file): Path<String>,
    Query(query): Query<PageQuery>,
) -> Result<Response> {
    render_page(&state, Some(&file), query).await
}

async fn render_page(state: &AppState, file: Option<&str>, query: PageQuery) -> Result<Response> {
    let page = state
        .gateway
        .get_page(file, query.layout.as_deref(), query.wrapped)
        .await?;

    let status = if page.found {
        StatusCode::OK
    } else {
        StatusCode::NOT_FOUND
    };

    if query.wrapped {
        let body = if page.found {
            ApiResult::success(page.body)
        } else {
            ApiResult::not_found(page.body)
        };
        return Ok((status, Json(body)).into_response());
    }

    Ok((status, Html(page.body)).into_response())
}

async fn default_image_handler(State(state): State<AppState>) -> Result<Response> {
    send_image(&state, None).await
}

async fn image_handler(
    State(state): State<AppState>,
    Path(file): Path<String>,
) -> Result<Response> {
    send_image(&state, Some(&file)).await
}

async fn send_image(state: &AppState, file: Option<&str>) -> Result<Response> {
    let image = state.gateway.get_image(file).await?;
    if image.content_type.is_empty() {
        return Err(CmsError::Internal(format!(
            "no content type for {}",
            image.filename
        )));
    }

    Ok((
        [(header::CONTENT_TYPE, image.content_type)],
        image.data,
    )
        .into_response())
}

async fn list_handler(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Html<String>> {
    let list = state.gateway.list_pages(query.layout.as_deref()).await?;
    Ok(Html(list))
}

async fn ping_handler(
    State(state): State<AppState>,
    Query(query): Query<PingQuery>,
) -> impl IntoResponse {
    let message = query.msg.unwrap_or_default();
    Json(ApiResult::success(state.gateway.ping(&message)))
}
