//! Country Sites API Server
//!
//! HTTP surface of the service: the client-side detection endpoint, the
//! bound site context for downstream rendering, and the site
//! administration routes whose writes go through the registry so the
//! resolution cache never serves a stale site.

use crate::adapters::inbound::site_middleware::{bind_country_site, forwarded_for, SiteContext};
use crate::application::{ContentScope, SiteRegistry};
use crate::config::Config;
use crate::domain::entities::{CountrySite, SiteDraft};
use crate::domain::errors::RepositoryError;
use crate::domain::ports::GeoResolver;
use crate::domain::services::ClientSignals;
use crate::domain::value_objects::CountryCode;
use axum::{
    extract::{ConnectInfo, Path, Query, State},
    http::{HeaderMap, Method, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Request-side options of the site binder and the site context.
#[derive(Debug, Clone, Default)]
pub struct SiteOptions {
    /// Activate the site's default language over the negotiated one
    pub force_country_language: bool,
    /// Country and language filtering of listed content
    pub scope: ContentScope,
    /// Configured `(code, display name)` languages
    pub languages: Vec<(String, String)>,
    pub site_icon_dir: Option<String>,
    pub site_icon_ext: String,
}

impl From<&Config> for SiteOptions {
    fn from(cfg: &Config) -> Self {
        Self {
            force_country_language: cfg.force_country_language,
            scope: cfg.content_scope(),
            languages: cfg.languages.clone(),
            site_icon_dir: cfg.site_icon_dir.clone(),
            site_icon_ext: cfg.site_icon_ext.clone(),
        }
    }
}

/// Detection endpoint response.
#[derive(Debug, Serialize)]
pub struct DetectionResponse {
    pub country: Option<String>,
    pub detected: bool,
}

/// Health response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub cached_sites: usize,
}

/// One entry of the site switcher.
#[derive(Debug, Serialize)]
pub struct SwitchUrl {
    pub country_code: String,
    pub name: String,
    pub url: String,
    pub icon: String,
    pub current: bool,
}

/// Site context bound to the current request.
#[derive(Debug, Serialize)]
pub struct SiteContextResponse {
    pub country_code: String,
    pub name: String,
    pub domain: String,
    pub language: String,
    pub language_name: Option<String>,
    pub language_forced: bool,
    pub source: crate::domain::entities::ResolutionSource,
    pub cache_hit: bool,
    pub icon: String,
    pub switch_urls: Vec<SwitchUrl>,
}

/// List of sites response.
#[derive(Debug, Serialize)]
pub struct SitesListResponse {
    pub sites: Vec<CountrySite>,
    pub total: usize,
}

/// Optional narrowing of the site listing.
#[derive(Debug, Default, Deserialize)]
pub struct SiteFilter {
    pub country: Option<String>,
    pub language: Option<String>,
}

/// API Server state.
#[derive(Clone)]
pub struct ApiState {
    pub registry: Arc<SiteRegistry>,
    /// Geolocation used by detection; never part of resolution here
    pub geo: Arc<dyn GeoResolver>,
    pub options: Arc<SiteOptions>,
}

impl ApiState {
    pub fn new(registry: Arc<SiteRegistry>, geo: Arc<dyn GeoResolver>, options: SiteOptions) -> Self {
        Self {
            registry,
            geo,
            options: Arc::new(options),
        }
    }

    fn switch_urls(&self, current: &CountrySite) -> Result<Vec<SwitchUrl>, RepositoryError> {
        let unique_domains = &self.registry.settings().unique_domains;
        Ok(self
            .registry
            .active_sites()?
            .into_iter()
            .map(|site| SwitchUrl {
                url: site.switch_url(unique_domains),
                icon: self.icon(&site),
                current: site.id == current.id,
                country_code: site.country_code.to_string(),
                name: site.name,
            })
            .collect())
    }

    fn icon(&self, site: &CountrySite) -> String {
        site.icon_path(self.options.site_icon_dir.as_deref(), &self.options.site_icon_ext)
    }
}

/// Maps storage failures of the administration routes to HTTP.
#[derive(Debug)]
pub struct ApiError(RepositoryError);

impl From<RepositoryError> for ApiError {
    fn from(e: RepositoryError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            RepositoryError::DuplicateCode(_) => StatusCode::CONFLICT,
            RepositoryError::InvalidCode => StatusCode::UNPROCESSABLE_ENTITY,
            RepositoryError::NotFound(_) => StatusCode::NOT_FOUND,
            RepositoryError::Sqlite(e) => {
                tracing::error!("site storage error: {}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, Json(serde_json::json!({ "error": self.0.to_string() }))).into_response()
    }
}

/// Build the application router.
///
/// Only the site-context routes pass through the site binder; detection and
/// administration never resolve a site.
pub fn router(state: ApiState) -> Router {
    let site_routes = Router::new()
        .route("/site", get(site_handler))
        .route_layer(middleware::from_fn_with_state(state.clone(), bind_country_site));

    Router::new()
        // Health endpoint
        .route("/health", get(health_handler))
        // Client-side detection, callable from any origin
        .route(
            "/localize/",
            get(localize_handler).layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods([Method::GET]),
            ),
        )
        // Site administration
        .route("/api/v1/sites", get(list_sites_handler).post(create_site_handler))
        .route("/api/v1/sites/active", get(active_sites_handler))
        .route(
            "/api/v1/sites/:id",
            get(get_site_handler)
                .put(update_site_handler)
                .delete(delete_site_handler),
        )
        .route("/api/v1/cache/clear", post(clear_cache_handler))
        .merge(site_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// HTTP server for the country sites service.
pub struct ApiServer {
    listen_addr: String,
    state: ApiState,
}

impl ApiServer {
    pub fn new(listen_addr: String, state: ApiState) -> Self {
        Self { listen_addr, state }
    }

    pub fn state(&self) -> ApiState {
        self.state.clone()
    }

    /// Run the API server. Connection info is attached so the client
    /// address is available when no `X-Forwarded-For` header is sent.
    pub async fn run(&self) -> anyhow::Result<()> {
        let app = router(self.state.clone());

        let listener = TcpListener::bind(&self.listen_addr).await?;
        tracing::info!("country sites API listening on {}", self.listen_addr);

        axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
            .with_graceful_shutdown(shutdown_signal())
            .await?;
        tracing::info!("country sites API stopped");
        Ok(())
    }
}

/// Resolves on Ctrl-C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("initiating graceful shutdown");
}

// Handler functions

async fn health_handler(State(state): State<ApiState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        cached_sites: state.registry.cache().len(),
    })
}

async fn localize_handler(
    State(state): State<ApiState>,
    headers: HeaderMap,
    connect: Option<ConnectInfo<SocketAddr>>,
) -> impl IntoResponse {
    let remote = connect.map(|ConnectInfo(addr)| addr.ip());
    let country = ClientSignals::client_ip(forwarded_for(&headers), remote)
        .and_then(|ip| state.geo.country(ip));
    tracing::debug!("detected country {:?} for remote={:?}", country, remote);

    Json(DetectionResponse {
        detected: country.is_some(),
        country: country.map(|c| c.to_string()),
    })
}

async fn site_handler(
    State(state): State<ApiState>,
    Extension(ctx): Extension<SiteContext>,
) -> Result<Json<SiteContextResponse>, ApiError> {
    let site = &ctx.resolution.site;
    let switch_urls = state.switch_urls(site)?;

    Ok(Json(SiteContextResponse {
        country_code: site.country_code.to_string(),
        name: site.name.clone(),
        domain: site.domain.clone(),
        language_name: site
            .default_language_display(&state.options.languages)
            .map(String::from),
        language: ctx.language.clone(),
        language_forced: ctx.language_forced,
        source: ctx.resolution.source,
        cache_hit: ctx.resolution.cache_hit,
        icon: state.icon(site),
        switch_urls,
    }))
}

async fn list_sites_handler(
    State(state): State<ApiState>,
    Query(filter): Query<SiteFilter>,
) -> Result<impl IntoResponse, ApiError> {
    let scope = state.options.scope;
    let mut sites = state.registry.all_sites()?;
    if let Some(code) = filter.country.as_deref().and_then(CountryCode::new) {
        sites = scope.filter_by_country(sites, &code);
    }
    if let Some(language) = filter.language.as_deref() {
        sites = scope.filter_by_language(sites, &language.to_lowercase());
    }
    let total = sites.len();
    Ok(Json(SitesListResponse { sites, total }))
}

async fn active_sites_handler(State(state): State<ApiState>) -> Result<impl IntoResponse, ApiError> {
    let sites = state.registry.active_sites()?;
    let total = sites.len();
    Ok(Json(SitesListResponse { sites, total }))
}

async fn get_site_handler(
    State(state): State<ApiState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    match state.registry.site(id)? {
        Some(site) => Ok(Json(site)),
        None => Err(RepositoryError::NotFound(id).into()),
    }
}

async fn create_site_handler(
    State(state): State<ApiState>,
    Json(draft): Json<SiteDraft>,
) -> Result<impl IntoResponse, ApiError> {
    let site = state.registry.create_site(&draft)?;
    Ok((StatusCode::CREATED, Json(site)))
}

async fn update_site_handler(
    State(state): State<ApiState>,
    Path(id): Path<i64>,
    Json(draft): Json<SiteDraft>,
) -> Result<impl IntoResponse, ApiError> {
    let site = state.registry.update_site(id, &draft)?;
    Ok(Json(site))
}

async fn delete_site_handler(
    State(state): State<ApiState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    if state.registry.delete_site(id)? {
        Ok(Json(serde_json::json!({
            "id": id,
            "deleted": true
        })))
    } else {
        Err(RepositoryError::NotFound(id).into())
    }
}

async fn clear_cache_handler(State(state): State<ApiState>) -> impl IntoResponse {
    state.registry.clear_cache();
    Json(serde_json::json!({ "cleared": true }))
}
