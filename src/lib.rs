/*!
# Frijolitos Costeños — sales dashboard backend

Backend for a small-business sales tracking dashboard. Salespeople upload
spreadsheets of sales rows with inconsistent headers, number formats and
date formats; the service normalizes them into canonical records, persists
them in a hosted store scoped per user, and serves the aggregated views the
dashboard renders.

## Architecture

The service is an axum HTTP application over two injected collaborators:

- **Store** — a PostgREST-style record store (Supabase in production, an
  in-memory double for tests). No server-side cache: every mutation is
  followed by a full owner-scoped reload.
- **Auth** — a GoTrue-style token service. Sessions live in an HTTP-only
  cookie; every data route resolves it before touching the store.

## Modules

- **record**: canonical sales record and raw cell values
- **normalize**: header folding, synonym matching, number/date parsing
- **ingest**: workbook decoding and the upload pipeline
- **store** / **auth**: external collaborators and their test doubles
- **table**: filter/sort/paginate engine and file provenance groups
- **analytics**: KPI and grouped aggregations
- **geo**: heatmap bucketing onto known locations
- **export**: CSV/XLSX encoders, upload template, report workbook
- **charts**: plotters-rendered PNG charts
- **report**: the PDF analysis report
- **app**: routing and handlers
*/

pub mod analytics;
pub mod app;
pub mod auth;
pub mod charts;
pub mod error;
pub mod export;
pub mod geo;
pub mod ingest;
pub mod normalize;
pub mod record;
pub mod report;
pub mod store;
pub mod table;

pub use app::{AppState, run};
pub use error::DashboardError;
pub use record::SalesRecord;
