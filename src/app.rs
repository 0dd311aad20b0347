//! HTTP surface of the dashboard backend: session handling, workbook
//! upload, the table/analytics queries and the export downloads.
//!
//! Every data route resolves the session cookie first and scopes the store
//! call with the session's user id. There is no server-side record cache;
//! handlers reload the owner's records from the store on each request.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::{DefaultBodyLimit, Multipart, Path, Query, State};
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use log::{info, warn};
use serde::Deserialize;
use tower_http::trace::TraceLayer;

use crate::auth::{AuthClient, Session};
use crate::error::DashboardError;
use crate::export;
use crate::ingest;
use crate::record::SalesRecord;
use crate::report;
use crate::store::SalesStore;
use crate::table::{self, FilterSpec, PageSpec, SortDir, SortField, SortSpec};
use crate::{analytics, geo};

const SESSION_COOKIE: &str = "sb_session";
const SECTION_COOKIE: &str = "active_section";
const DEFAULT_SECTION: &str = "analytics";
const MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn SalesStore>,
    pub auth: Arc<dyn AuthClient>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/auth/signup", post(signup))
        .route("/api/auth/signin", post(signin))
        .route("/api/auth/signout", post(signout))
        .route("/api/auth/session", get(current_session))
        .route("/api/upload", post(upload))
        .route("/api/records", get(records))
        .route("/api/records/delete", post(bulk_delete))
        .route("/api/records/:id", delete(delete_record))
        .route("/api/files", get(files))
        .route("/api/analytics", get(analytics_view))
        .route("/api/export/csv", get(export_csv))
        .route("/api/export/xlsx", get(export_xlsx))
        .route("/api/export/report.xlsx", get(report_xlsx))
        .route("/api/export/report.pdf", get(report_pdf))
        .route("/api/template", get(template))
        .route("/api/prefs/section", get(get_section).put(put_section))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Binds and serves until the process is stopped.
pub async fn run(state: AppState, bind: &str) -> Result<(), std::io::Error> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!("listening on {bind}");
    axum::serve(listener, router(state)).await
}

fn session_cookie(token: &str) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token.to_string()))
        .http_only(true)
        .path("/")
        .build()
}

/// Resolves the session cookie against the auth service.
async fn require_session(state: &AppState, jar: &CookieJar) -> Result<Session, DashboardError> {
    let token = jar
        .get(SESSION_COOKIE)
        .map(|c| c.value().to_string())
        .ok_or_else(|| DashboardError::Auth("no active session".into()))?;
    state.auth.current_user(&token).await
}

async fn owned_records(
    state: &AppState,
    jar: &CookieJar,
) -> Result<(Session, Vec<SalesRecord>), DashboardError> {
    let session = require_session(state, jar).await?;
    let records = state.store.select_by_owner(&session.user_id).await?;
    Ok((session, records))
}

#[derive(Deserialize)]
struct Credentials {
    email: String,
    password: String,
    #[serde(default)]
    name: String,
}

async fn signup(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(body): Json<Credentials>,
) -> Result<impl IntoResponse, DashboardError> {
    let session = state
        .auth
        .sign_up(&body.email, &body.password, &body.name)
        .await?;
    let jar = jar.add(session_cookie(&session.access_token));
    Ok((jar, Json(session)))
}

async fn signin(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(body): Json<Credentials>,
) -> Result<impl IntoResponse, DashboardError> {
    let session = state.auth.sign_in(&body.email, &body.password).await?;
    info!("session opened for {}", session.email);
    let jar = jar.add(session_cookie(&session.access_token));
    Ok((jar, Json(session)))
}

async fn signout(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<impl IntoResponse, DashboardError> {
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        // Revocation failures still clear the cookie.
        if let Err(e) = state.auth.sign_out(cookie.value()).await {
            warn!("sign-out revocation failed: {e}");
        }
    }
    let jar = jar.remove(Cookie::from(SESSION_COOKIE));
    Ok((jar, Json(serde_json::json!({ "status": "ok" }))))
}

async fn current_session(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<Json<Session>, DashboardError> {
    Ok(Json(require_session(&state, &jar).await?))
}

async fn upload(
    State(state): State<AppState>,
    jar: CookieJar,
    mut multipart: Multipart,
) -> Result<Json<serde_json::Value>, DashboardError> {
    let session = require_session(&state, &jar).await?;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| DashboardError::Decode(e.to_string()))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let source_file = field.file_name().unwrap_or("archivo.xlsx").to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| DashboardError::Decode(e.to_string()))?;

        let inserted =
            ingest::ingest_workbook(state.store.as_ref(), &session.user_id, &source_file, &bytes)
                .await?;
        return Ok(Json(serde_json::json!({
            "status": "ok",
            "file": source_file,
            "inserted": inserted,
        })));
    }

    Err(DashboardError::Decode("no file field in the upload".into()))
}

/// Flat query shape for the table route: filter criteria plus sort and
/// pagination. `toggle` names the column header the client clicked; the
/// effective sort is the carried sort toggled by it.
#[derive(Deserialize, Default)]
struct RecordsQuery {
    city: Option<String>,
    business: Option<String>,
    quantity_min: Option<f64>,
    quantity_max: Option<f64>,
    source_file: Option<String>,
    search_text: Option<String>,
    sort_field: Option<SortField>,
    sort_dir: Option<SortDir>,
    toggle: Option<SortField>,
    page: Option<usize>,
    page_size: Option<usize>,
}

impl RecordsQuery {
    fn filter(&self) -> FilterSpec {
        FilterSpec {
            city: self.city.clone(),
            business: self.business.clone(),
            quantity_min: self.quantity_min,
            quantity_max: self.quantity_max,
            source_file: self.source_file.clone(),
            search_text: self.search_text.clone(),
        }
    }

    fn sort(&self) -> SortSpec {
        let mut spec = SortSpec::default();
        if let Some(field) = self.sort_field {
            spec.field = field;
        }
        if let Some(dir) = self.sort_dir {
            spec.dir = dir;
        }
        match self.toggle {
            Some(field) => spec.toggled(field),
            None => spec,
        }
    }

    fn page(&self) -> PageSpec {
        let defaults = PageSpec::default();
        PageSpec {
            page: self.page.unwrap_or(defaults.page),
            page_size: self.page_size.unwrap_or(defaults.page_size),
        }
    }
}

async fn records(
    State(state): State<AppState>,
    jar: CookieJar,
    Query(query): Query<RecordsQuery>,
) -> Result<Json<table::TablePage>, DashboardError> {
    let (_, records) = owned_records(&state, &jar).await?;
    let page = table::query(&records, &query.filter(), query.sort(), query.page());
    Ok(Json(page))
}

async fn files(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<Json<Vec<table::FileGroup>>, DashboardError> {
    let (_, records) = owned_records(&state, &jar).await?;
    Ok(Json(table::file_groups(&records)))
}

async fn delete_record(
    State(state): State<AppState>,
    jar: CookieJar,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, DashboardError> {
    let session = require_session(&state, &jar).await?;
    state.store.delete_by_id(&session.user_id, id).await?;
    Ok(Json(serde_json::json!({ "status": "ok" })))
}

async fn bulk_delete(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(filter): Json<FilterSpec>,
) -> Result<Json<serde_json::Value>, DashboardError> {
    let (session, records) = owned_records(&state, &jar).await?;
    let (ids, skipped) = table::deletable_ids(&records, &filter);
    if skipped > 0 {
        warn!("bulk delete skipping {skipped} records without ids");
    }
    state.store.delete_by_ids(&session.user_id, &ids).await?;
    Ok(Json(serde_json::json!({
        "status": "ok",
        "deleted": ids.len(),
        "skipped": skipped,
    })))
}

async fn analytics_view(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<Json<serde_json::Value>, DashboardError> {
    let (_, records) = owned_records(&state, &jar).await?;
    Ok(Json(serde_json::json!({
        "kpis": analytics::kpis(&records),
        "por_ciudad": analytics::by_city(&records),
        "por_negocio": analytics::by_business(&records),
        "por_mes": analytics::monthly_series(&records),
        "top_vendedores": analytics::top_salespeople(&records),
        "heatmap": geo::heat_points(&records),
    })))
}

fn attachment(
    bytes: Vec<u8>,
    content_type: &str,
    filename: &str,
) -> Result<Response, DashboardError> {
    Response::builder()
        .header(CONTENT_TYPE, content_type)
        .header(
            CONTENT_DISPOSITION,
            format!("attachment; filename=\"{filename}\""),
        )
        .body(Body::from(bytes))
        .map_err(|e| DashboardError::Export(e.to_string()))
}

const XLSX_MIME: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

async fn export_csv(
    State(state): State<AppState>,
    jar: CookieJar,
    Query(query): Query<RecordsQuery>,
) -> Result<Response, DashboardError> {
    let (_, records) = owned_records(&state, &jar).await?;
    let filter = query.filter();
    let filtered: Vec<SalesRecord> = records.into_iter().filter(|r| filter.matches(r)).collect();
    attachment(
        export::to_csv(&filtered).into_bytes(),
        "text/csv; charset=utf-8",
        &export::export_filename("datos", "csv"),
    )
}

async fn export_xlsx(
    State(state): State<AppState>,
    jar: CookieJar,
    Query(query): Query<RecordsQuery>,
) -> Result<Response, DashboardError> {
    let (_, records) = owned_records(&state, &jar).await?;
    let filter = query.filter();
    let filtered: Vec<SalesRecord> = records.into_iter().filter(|r| filter.matches(r)).collect();
    attachment(
        export::to_xlsx(&filtered)?,
        XLSX_MIME,
        &export::export_filename("datos", "xlsx"),
    )
}

async fn report_xlsx(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<Response, DashboardError> {
    let (_, records) = owned_records(&state, &jar).await?;
    attachment(
        export::report_xlsx(&records)?,
        XLSX_MIME,
        &export::export_filename("reporte-analisis", "xlsx"),
    )
}

async fn report_pdf(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<Response, DashboardError> {
    let (_, records) = owned_records(&state, &jar).await?;
    info!("rendering pdf report over {} records", records.len());
    attachment(
        report::report_pdf(&records)?,
        "application/pdf",
        &export::export_filename("reporte-analisis", "pdf"),
    )
}

async fn template(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<Response, DashboardError> {
    require_session(&state, &jar).await?;
    attachment(
        export::template_xlsx()?,
        XLSX_MIME,
        "plantilla-frijolitos.xlsx",
    )
}

/// Last open section, remembered across reloads in its own cookie. The
/// retired "dashboard" section maps onto "analytics".
fn normalize_section(section: &str) -> &str {
    match section {
        "dashboard" | "" => DEFAULT_SECTION,
        other => other,
    }
}

async fn get_section(jar: CookieJar) -> Json<serde_json::Value> {
    let section = jar
        .get(SECTION_COOKIE)
        .map(|c| normalize_section(c.value()).to_string())
        .unwrap_or_else(|| DEFAULT_SECTION.to_string());
    Json(serde_json::json!({ "section": section }))
}

#[derive(Deserialize)]
struct SectionBody {
    section: String,
}

async fn put_section(jar: CookieJar, Json(body): Json<SectionBody>) -> impl IntoResponse {
    let section = normalize_section(&body.section).to_string();
    let jar = jar.add(
        Cookie::build((SECTION_COOKIE, section.clone()))
            .path("/")
            .build(),
    );
    (jar, Json(serde_json::json!({ "section": section })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::StaticAuth;
    use crate::store::MemoryStore;
    use axum::body::to_bytes;
    use axum::http::{header, Request, StatusCode};
    use tower::ServiceExt;

    fn test_state() -> AppState {
        AppState {
            store: Arc::new(MemoryStore::new()),
            auth: Arc::new(StaticAuth),
        }
    }

    fn authed(request: axum::http::request::Builder) -> axum::http::request::Builder {
        request.header(
            header::COOKIE,
            format!("{SESSION_COOKIE}=token-ana@frijolitos.hn"),
        )
    }

    async fn seed(state: &AppState, records: &[SalesRecord]) {
        state.store.insert_batch(records).await.unwrap();
    }

    fn record(city: &str, quantity: f64, date: &str) -> SalesRecord {
        SalesRecord {
            id: None,
            salesperson: "Ana".into(),
            city: city.into(),
            business: "Tienda".into(),
            presentation: "500g".into(),
            quantity,
            date: date.into(),
            owner_id: "user-ana@frijolitos.hn".into(),
            source_file: "ventas.xlsx".into(),
        }
    }

    #[tokio::test]
    async fn data_routes_require_a_session() {
        let app = router(test_state());
        let response = app
            .oneshot(Request::get("/api/records").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn records_route_filters_and_paginates() {
        let state = test_state();
        seed(
            &state,
            &[
                record("La Ceiba", 10.0, "2024-01-05"),
                record("Tela", 5.0, "2024-02-01"),
            ],
        )
        .await;

        let app = router(state);
        let response = app
            .oneshot(
                authed(Request::get("/api/records?city=La%20Ceiba"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let page: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(page["total"], 1);
        assert_eq!(page["rows"][0]["ciudad"], "La Ceiba");
    }

    #[tokio::test]
    async fn csv_export_is_an_attachment() {
        let state = test_state();
        seed(&state, &[record("La Ceiba", 10.0, "2024-01-05")]).await;

        let app = router(state);
        let response = app
            .oneshot(
                authed(Request::get("/api/export/csv"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let disposition = response
            .headers()
            .get(CONTENT_DISPOSITION)
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();
        assert!(disposition.starts_with("attachment; filename=\"frijolitos-datos-"));

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.starts_with("Vendedor-usuario,Ciudad,Negocio,Presentacion,Venta,Fecha"));
    }

    #[tokio::test]
    async fn section_preference_defaults_and_remaps_the_retired_value() {
        let app = router(test_state());
        let response = app
            .clone()
            .oneshot(
                Request::get("/api/prefs/section")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["section"], "analytics");

        let response = app
            .oneshot(
                Request::get("/api/prefs/section")
                    .header(header::COOKIE, format!("{SECTION_COOKIE}=dashboard"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["section"], "analytics");
    }

    #[tokio::test]
    async fn bulk_delete_reports_deleted_and_skipped_counts() {
        let state = test_state();
        seed(
            &state,
            &[
                record("La Ceiba", 10.0, "2024-01-05"),
                record("La Ceiba", 3.0, "2024-01-06"),
                record("Tela", 5.0, "2024-02-01"),
            ],
        )
        .await;

        let app = router(state.clone());
        let response = app
            .oneshot(
                authed(Request::post("/api/records/delete"))
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"city":"La Ceiba"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["deleted"], 2);
        assert_eq!(value["skipped"], 0);

        let left = state
            .store
            .select_by_owner("user-ana@frijolitos.hn")
            .await
            .unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].city, "Tela");
    }
}
