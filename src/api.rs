use std::sync::Arc;

use axum::{
    extract::{rejection::QueryRejection, Query, State},
    http::StatusCode,
    response::Response,
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use utoipa::{IntoParams, OpenApi, ToSchema};
use utoipa_swagger_ui::SwaggerUi;

use crate::config::parse_flag;
use crate::error::{json_response, ApiError, ErrorBody};
use crate::model::{CaptchaFlags, Platform, ProductRecord, ScrapeRequest};
use crate::orchestrator::Scraper;

pub const NO_VALID_SOURCE: &str =
    "Please provide a valid Amazon and/or Flipkart listing URL starting with https://";

#[derive(Clone)]
pub struct AppState {
    pub scraper: Arc<Scraper>,
    pub max_pages_cap: u32,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ScrapeQuery {
    /// Amazon search/listing URL.
    pub amazon_url: Option<String>,
    /// Flipkart search/listing URL.
    pub flipkart_url: Option<String>,
    /// Listing pages to crawl per source (default 1).
    pub max_pages: Option<String>,
    /// `1`, `true` or `yes` forces a detail-page visit for every row.
    pub pdp_prices: Option<String>,
}

impl ScrapeQuery {
    /// Validate the query into a request, clamping `max_pages` to `[1, cap]`.
    pub fn into_request(self, max_pages_cap: u32) -> Result<ScrapeRequest, ApiError> {
        let max_pages = match self.max_pages.as_deref().map(str::trim) {
            None | Some("") => 1,
            Some(raw) => raw.parse::<i64>().map_err(|_| {
                ApiError::InvalidInput(format!("max_pages must be an integer, got {raw:?}"))
            })?,
        };
        let cap = i64::from(max_pages_cap.max(1));
        let pdp_prices = self
            .pdp_prices
            .as_deref()
            .and_then(parse_flag)
            .unwrap_or(false);

        Ok(ScrapeRequest {
            amazon_url: self.amazon_url,
            flipkart_url: self.flipkart_url,
            max_pages: max_pages.clamp(1, cap) as u32,
            pdp_prices,
        })
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ScrapeResponse {
    pub ok: bool,
    pub count: usize,
    pub rows: Vec<ProductRecord>,
    pub captcha: CaptchaFlags,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
}

/// Scrape the given listing URLs and return de-duplicated product rows
#[utoipa::path(
    get,
    path = "/scrape",
    params(ScrapeQuery),
    responses(
        (status = 200, description = "Scraped rows", body = ScrapeResponse),
        (status = 400, description = "No valid listing URL or bad parameter", body = ErrorBody),
        (status = 500, description = "Browser or run failure", body = ErrorBody)
    ),
    tag = "scraper"
)]
pub async fn scrape(
    State(state): State<Arc<AppState>>,
    query: Result<Query<ScrapeQuery>, QueryRejection>,
) -> Result<Response, ApiError> {
    let Query(query) = query.map_err(|rejection| ApiError::InvalidInput(rejection.body_text()))?;
    let request = query.into_request(state.max_pages_cap)?;
    if request.sources().is_empty() {
        return Err(ApiError::InvalidInput(NO_VALID_SOURCE.to_string()));
    }

    let outcome = state.scraper.scrape(&request).await?;
    Ok(json_response(
        StatusCode::OK,
        ScrapeResponse {
            ok: true,
            count: outcome.rows.len(),
            rows: outcome.rows,
            captcha: outcome.captcha,
        },
    ))
}

/// Liveness probe
#[utoipa::path(
    get,
    path = "/healthz",
    responses((status = 200, description = "Service is up", body = HealthResponse)),
    tag = "scraper"
)]
pub async fn healthz() -> Response {
    json_response(
        StatusCode::OK,
        HealthResponse {
            status: "ok".to_string(),
        },
    )
}

#[derive(OpenApi)]
#[openapi(
    paths(scrape, healthz),
    components(schemas(
        ScrapeResponse,
        HealthResponse,
        ErrorBody,
        ProductRecord,
        Platform,
        CaptchaFlags
    )),
    tags((name = "scraper", description = "Product listing scraper"))
)]
pub struct ApiDoc;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/scrape", get(scrape))
        .route("/api/scrape", get(scrape))
        .route("/healthz", get(healthz))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(state))
}
