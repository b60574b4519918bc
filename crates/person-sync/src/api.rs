//! HTTP API for the sync gateway

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use person_sync_core::prelude::*;
use person_sync_core::PaginationConfig;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use tracing::info;
use url::form_urlencoded;

use crate::gateway::{HealthReport, SyncGateway};

const ENTITY_NAME: &str = "person";
const PEOPLE_PATH: &str = "/api/people";
const SEARCH_PATH: &str = "/api/_search/people";

type ApiResult<T> = std::result::Result<T, ApiError>;

// ============================================================================
// State
// ============================================================================

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<SyncGateway>,
    pub pagination: PaginationConfig,
    alerts: Arc<AlertHeaders>,
}

impl AppState {
    pub fn new(gateway: Arc<SyncGateway>, config: &SyncConfig) -> Result<Self> {
        Ok(Self {
            gateway,
            pagination: config.pagination.clone(),
            alerts: Arc::new(AlertHeaders::new(&config.server.app_name)?),
        })
    }
}

/// `x-{app}-alert` / `x-{app}-params` headers on mutating responses
struct AlertHeaders {
    app_name: String,
    alert: HeaderName,
    params: HeaderName,
}

impl AlertHeaders {
    fn new(app_name: &str) -> Result<Self> {
        let name = |suffix: &str| {
            HeaderName::try_from(format!("x-{}-{}", app_name.to_lowercase(), suffix)).map_err(
                |e| SyncError::config(format!("app_name '{}' is not header-safe: {}", app_name, e)),
            )
        };
        Ok(Self {
            app_name: app_name.to_string(),
            alert: name("alert")?,
            params: name("params")?,
        })
    }

    fn for_action(&self, action: &str, id: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        let alert = format!("{}.{}.{}", self.app_name, ENTITY_NAME, action);
        if let Ok(value) = HeaderValue::from_str(&alert) {
            headers.insert(self.alert.clone(), value);
        }
        if let Ok(value) = HeaderValue::from_str(id) {
            headers.insert(self.params.clone(), value);
        }
        headers
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Problem response returned for every failed request
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    error_key: &'static str,
    detail: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Problem<'a> {
    title: &'a str,
    status: u16,
    error_key: &'a str,
    detail: &'a str,
}

impl ApiError {
    fn bad_request(error_key: &'static str, detail: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            error_key,
            detail: detail.into(),
        }
    }
}

impl From<SyncError> for ApiError {
    fn from(e: SyncError) -> Self {
        let error_key = match e.kind() {
            ErrorKind::ValidationFailed => "validation",
            ErrorKind::IdConflict => "idexists",
            ErrorKind::NotFound => "idnotfound",
            ErrorKind::StoreFailure => "storeunavailable",
            ErrorKind::IndexQueryFailure | ErrorKind::IndexWriteFailure => "searchunavailable",
            ErrorKind::Internal => "internal",
        };
        let status = match e.kind() {
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            _ if e.is_client_error() => StatusCode::BAD_REQUEST,
            _ if e.is_unavailable() => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            error_key,
            detail: e.to_string(),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request("invalidbody", rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::bad_request("invalidquery", rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Problem {
            title: self.status.canonical_reason().unwrap_or("Error"),
            status: self.status.as_u16(),
            error_key: self.error_key,
            detail: &self.detail,
        };
        (self.status, Json(body)).into_response()
    }
}

// ============================================================================
// Pagination
// ============================================================================

/// `page`, `size` and `sort` query parameters
#[derive(Debug, Default, Deserialize)]
pub struct PageParams {
    pub page: Option<u32>,
    pub size: Option<u32>,
    pub sort: Option<String>,
}

impl PageParams {
    fn to_request(&self, config: &PaginationConfig) -> Result<PageRequest> {
        let size = self.size.unwrap_or(config.default_size).min(config.max_size);
        let request = PageRequest::new(self.page.unwrap_or(0), size)?;
        match self.sort {
            Some(ref sort) => Ok(request.with_sort(sort.parse()?)),
            None => Ok(request),
        }
    }
}

/// Search parameters; `query` is required
#[derive(Debug, Default, Deserialize)]
pub struct SearchParams {
    pub query: Option<String>,
    pub page: Option<u32>,
    pub size: Option<u32>,
    pub sort: Option<String>,
}

impl SearchParams {
    fn page_params(&self) -> PageParams {
        PageParams {
            page: self.page,
            size: self.size,
            sort: self.sort.clone(),
        }
    }
}

/// `X-Total-Count` and RFC 5988 `Link` headers for a page
fn pagination_headers<T>(path: &str, query: Option<&str>, page: &Page<T>, sort: Option<Sort>) -> HeaderMap {
    let link = |number: u64, rel: &str| {
        let mut params = form_urlencoded::Serializer::new(String::new());
        if let Some(q) = query {
            params.append_pair("query", q);
        }
        params.append_pair("page", &number.to_string());
        params.append_pair("size", &page.page_size.to_string());
        if let Some(sort) = sort {
            params.append_pair("sort", &sort.to_string());
        }
        format!("<{}?{}>; rel=\"{}\"", path, params.finish(), rel)
    };

    let current = u64::from(page.page_number);
    let last = page.total_pages().saturating_sub(1);
    let mut links = Vec::with_capacity(4);
    if page.has_next() {
        links.push(link(current + 1, "next"));
    }
    if page.has_previous() {
        links.push(link(current - 1, "prev"));
    }
    links.push(link(last, "last"));
    links.push(link(0, "first"));

    let mut headers = HeaderMap::new();
    headers.insert(
        HeaderName::from_static("x-total-count"),
        HeaderValue::from(page.total_count),
    );
    if let Ok(value) = HeaderValue::from_str(&links.join(",")) {
        headers.insert(header::LINK, value);
    }
    headers
}

// ============================================================================
// Handlers
// ============================================================================

fn check_body_id(body_id: Option<&str>, path_id: &str) -> ApiResult<()> {
    match body_id {
        None => Err(ApiError::bad_request("idnull", "Invalid id")),
        Some(id) if id != path_id => Err(ApiError::bad_request("idinvalid", "Invalid ID")),
        Some(_) => Ok(()),
    }
}

async fn create_person(
    State(state): State<AppState>,
    body: std::result::Result<Json<PersonDto>, JsonRejection>,
) -> ApiResult<Response> {
    let Json(dto) = body?;
    dto.validate()?;

    let created = state.gateway.create(dto).await?;
    let id = created.id.clone().unwrap_or_default();

    let mut headers = state.alerts.for_action("created", &id);
    if let Ok(location) = HeaderValue::from_str(&format!("{}/{}", PEOPLE_PATH, id)) {
        headers.insert(header::LOCATION, location);
    }
    Ok((StatusCode::CREATED, headers, Json(created)).into_response())
}

async fn update_person(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: std::result::Result<Json<PersonDto>, JsonRejection>,
) -> ApiResult<Response> {
    let Json(dto) = body?;
    check_body_id(dto.id.as_deref(), &id)?;
    dto.validate()?;

    let updated = state.gateway.update(dto).await?;
    Ok((state.alerts.for_action("updated", &id), Json(updated)).into_response())
}

async fn partial_update_person(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: std::result::Result<Json<PersonPatch>, JsonRejection>,
) -> ApiResult<Response> {
    let Json(patch) = body?;
    check_body_id(patch.id.as_deref(), &id)?;
    patch.validate()?;

    let updated = state.gateway.partial_update(patch).await?;
    Ok((state.alerts.for_action("updated", &id), Json(updated)).into_response())
}

async fn list_people(
    State(state): State<AppState>,
    params: std::result::Result<Query<PageParams>, QueryRejection>,
) -> ApiResult<Response> {
    let Query(params) = params?;
    let request = params.to_request(&state.pagination)?;

    let page = state.gateway.list_page(&request).await?;
    let headers = pagination_headers(PEOPLE_PATH, None, &page, request.sort());
    Ok((headers, Json(page.items)).into_response())
}

async fn get_person(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<PersonDto>> {
    Ok(Json(state.gateway.find_one(&id).await?))
}

async fn delete_person(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Response> {
    state.gateway.delete(&id).await?;
    Ok((StatusCode::NO_CONTENT, state.alerts.for_action("deleted", &id)).into_response())
}

async fn search_people(
    State(state): State<AppState>,
    params: std::result::Result<Query<SearchParams>, QueryRejection>,
) -> ApiResult<Response> {
    let Query(params) = params?;
    let query = params
        .query
        .clone()
        .ok_or_else(|| SyncError::validation("query", "query parameter is required"))?;
    let request = params.page_params().to_request(&state.pagination)?;

    let page = state.gateway.search_page(&query, &request).await?;
    let headers = pagination_headers(SEARCH_PATH, Some(&query), &page, request.sort());
    Ok((headers, Json(page.items)).into_response())
}

/// Health response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub components: HealthReport,
}

async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let report = state.gateway.health().await;
    let status = if report.is_ready() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        status,
        Json(HealthResponse {
            status: report.status(),
            version: env!("CARGO_PKG_VERSION"),
            components: report,
        }),
    )
}

async fn live() -> &'static str {
    "OK"
}

async fn ready(State(state): State<AppState>) -> (StatusCode, &'static str) {
    if state.gateway.health().await.is_ready() {
        (StatusCode::OK, "OK")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "NOT READY")
    }
}

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route(PEOPLE_PATH, get(list_people).post(create_person))
        .route(
            "/api/people/:id",
            get(get_person)
                .put(update_person)
                .patch(partial_update_person)
                .delete(delete_person),
        )
        .route(SEARCH_PATH, get(search_people))
        .route("/health", get(health))
        .route("/health/live", get(live))
        .route("/health/ready", get(ready))
        .with_state(state)
}

/// Serve the API until `shutdown` resolves
pub async fn run_server(
    listen: &str,
    state: AppState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(listen).await?;
    info!(listen, "HTTP API started");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use person_store::{MemoryRecordStore, MemorySearchIndex};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    struct Harness {
        app: Router,
        records: Arc<MemoryRecordStore>,
        index: Arc<MemorySearchIndex>,
    }

    fn harness() -> Harness {
        let records = Arc::new(MemoryRecordStore::new());
        let index = Arc::new(MemorySearchIndex::new());
        let gateway = Arc::new(SyncGateway::new(records.clone(), index.clone()));
        let state = AppState::new(gateway, &SyncConfig::default()).unwrap();
        Harness {
            app: build_router(state),
            records,
            index,
        }
    }

    async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> Response {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        app.clone().oneshot(request).await.unwrap()
    }

    async fn json_body(resp: Response) -> Value {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn valid_person() -> Value {
        json!({ "firstName": "abcd", "lastName": "wxyzwxyzwxyz", "telephone": 5 })
    }

    async fn create(app: &Router) -> String {
        let resp = send(app, "POST", "/api/people", Some(valid_person())).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        json_body(resp).await["id"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_create_returns_location_and_alert() {
        let h = harness();
        let resp = send(&h.app, "POST", "/api/people", Some(valid_person())).await;

        assert_eq!(resp.status(), StatusCode::CREATED);
        let location = resp.headers()[header::LOCATION].to_str().unwrap().to_string();
        assert_eq!(
            resp.headers()["x-personsync-alert"],
            "personSync.person.created"
        );

        let body = json_body(resp).await;
        let id = body["id"].as_str().unwrap();
        assert_eq!(location, format!("/api/people/{}", id));
        assert_eq!(body["firstName"], "abcd");
    }

    #[tokio::test]
    async fn test_create_with_id_is_rejected() {
        let h = harness();
        let mut body = valid_person();
        body["id"] = json!("existing");

        let resp = send(&h.app, "POST", "/api/people", Some(body)).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(resp).await["errorKey"], "idexists");
        assert!(h.records.snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn test_create_validates_fields() {
        let h = harness();
        let body = json!({ "firstName": "ab", "lastName": "wxyzwxyzwxyz", "telephone": 5 });

        let resp = send(&h.app, "POST", "/api/people", Some(body)).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(resp).await["errorKey"], "validation");
    }

    #[tokio::test]
    async fn test_malformed_body_is_bad_request() {
        let h = harness();
        let resp = send(&h.app, "POST", "/api/people", Some(json!({ "firstName": 3 }))).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(resp).await["errorKey"], "invalidbody");
    }

    #[tokio::test]
    async fn test_update_checks_body_id() {
        let h = harness();
        let id = create(&h.app).await;
        let uri = format!("/api/people/{}", id);

        let resp = send(&h.app, "PUT", &uri, Some(valid_person())).await;
        assert_eq!(json_body(resp).await["errorKey"], "idnull");

        let mut body = valid_person();
        body["id"] = json!("other");
        let resp = send(&h.app, "PUT", &uri, Some(body)).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(resp).await["errorKey"], "idinvalid");
    }

    #[tokio::test]
    async fn test_update_unknown_is_not_found() {
        let h = harness();
        let mut body = valid_person();
        body["id"] = json!("nonexistent");

        let resp = send(&h.app, "PUT", "/api/people/nonexistent", Some(body)).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_patch_keeps_absent_fields() {
        let h = harness();
        let id = create(&h.app).await;

        let patch = json!({ "id": id, "firstName": "efgh" });
        let resp = send(&h.app, "PATCH", &format!("/api/people/{}", id), Some(patch)).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let body = json_body(resp).await;
        assert_eq!(body["firstName"], "efgh");
        assert_eq!(body["lastName"], "wxyzwxyzwxyz");
        assert_eq!(body["telephone"], 5);
    }

    #[tokio::test]
    async fn test_list_sets_pagination_headers() {
        let h = harness();
        for _ in 0..3 {
            create(&h.app).await;
        }

        let resp = send(&h.app, "GET", "/api/people?page=0&size=2", None).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()["x-total-count"], "3");
        let link = resp.headers()[header::LINK].to_str().unwrap().to_string();
        assert!(link.contains("rel=\"next\""));
        assert!(link.contains("</api/people?page=1&size=2>; rel=\"last\""));

        assert_eq!(json_body(resp).await.as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_list_rejects_unknown_sort() {
        let h = harness();
        let resp = send(&h.app, "GET", "/api/people?sort=nickname,asc", None).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_get_and_delete() {
        let h = harness();
        let id = create(&h.app).await;
        let uri = format!("/api/people/{}", id);

        assert_eq!(send(&h.app, "GET", &uri, None).await.status(), StatusCode::OK);

        let resp = send(&h.app, "DELETE", &uri, None).await;
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);
        assert_eq!(resp.headers()["x-personsync-params"], id.as_str());

        assert_eq!(send(&h.app, "GET", &uri, None).await.status(), StatusCode::NOT_FOUND);
        assert!(h.index.get(&id).await.is_none());
    }

    #[tokio::test]
    async fn test_search_counts_against_index() {
        let h = harness();
        create(&h.app).await;
        h.index.write_failures().set(true);
        create(&h.app).await;

        let resp = send(&h.app, "GET", "/api/_search/people?query=abcd", None).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()["x-total-count"], "1");
        assert_eq!(json_body(resp).await.as_array().unwrap().len(), 1);

        let resp = send(&h.app, "GET", "/api/_search/people", None).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_store_failure_is_unavailable() {
        let h = harness();
        h.records.failures().set(true);

        let resp = send(&h.app, "GET", "/api/people", None).await;
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);

        let resp = send(&h.app, "GET", "/health/ready", None).await;
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_error_status_mapping() {
        let status = |e: SyncError| ApiError::from(e).status;
        assert_eq!(status(SyncError::validation("telephone", "too big")), StatusCode::BAD_REQUEST);
        assert_eq!(status(SyncError::id_conflict("preset")), StatusCode::BAD_REQUEST);
        assert_eq!(status(SyncError::not_found("x")), StatusCode::NOT_FOUND);
        assert_eq!(status(SyncError::store("down")), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(status(SyncError::index_query("down")), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(status(SyncError::config("bad")), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_health_reports_degraded_index() {
        let h = harness();
        h.index.read_failures().set(true);

        let resp = send(&h.app, "GET", "/health", None).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(json_body(resp).await["status"], "degraded");
    }
}
