use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

/// Error taxonomy for the dashboard backend.
///
/// Every failure is caught at the operation boundary (upload handler, delete
/// handler, export handler) and surfaced to the client as a single JSON
/// notification. Normalization fallbacks (unparsable numbers or dates) are
/// deliberately not represented here: they default silently instead of
/// failing the row.
#[derive(Debug, Error)]
pub enum DashboardError {
    /// The uploaded workbook could not be decoded. Nothing was persisted.
    #[error("could not read the uploaded file: {0}")]
    Decode(String),

    /// The external store rejected an insert, select or delete.
    #[error("store request failed: {0}")]
    Store(String),

    /// The auth service rejected the credentials or the session is missing.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// A chart could not be rendered. Callers log and skip the section.
    #[error("chart rendering failed: {0}")]
    Chart(String),

    /// An export encoder (CSV/XLSX/PDF) failed.
    #[error("export failed: {0}")]
    Export(String),
}

impl From<rust_xlsxwriter::XlsxError> for DashboardError {
    fn from(e: rust_xlsxwriter::XlsxError) -> Self {
        DashboardError::Export(e.to_string())
    }
}

impl From<calamine::Error> for DashboardError {
    fn from(e: calamine::Error) -> Self {
        DashboardError::Decode(e.to_string())
    }
}

impl IntoResponse for DashboardError {
    fn into_response(self) -> Response {
        let status = match &self {
            DashboardError::Auth(_) => StatusCode::UNAUTHORIZED,
            DashboardError::Decode(_) => StatusCode::BAD_REQUEST,
            DashboardError::Store(_) => StatusCode::BAD_GATEWAY,
            DashboardError::Chart(_) | DashboardError::Export(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        if status.is_server_error() {
            log::error!("{self}");
        }
        let body = Json(serde_json::json!({
            "status": "error",
            "message": self.to_string(),
        }));

        (status, body).into_response()
    }
}
