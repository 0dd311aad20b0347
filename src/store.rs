//! External record store collaborator.
//!
//! Persistence and row-level querying are delegated to a hosted PostgREST
//! style service; this module only defines the narrow call contract the
//! rest of the crate consumes and two implementations of it: the HTTP
//! client used in production and an in-memory store for tests and local
//! development.
//!
//! Cache policy is deliberate and explicit: there is no incremental cache.
//! Every mutation (upload, delete, bulk delete) is followed by a full
//! owner-scoped reload by the caller.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};

use crate::error::DashboardError;
use crate::record::SalesRecord;

/// Record-oriented query/insert/delete API, scoped by the ownership key on
/// every call. Injected as an explicit dependency, never a global handle.
#[async_trait]
pub trait SalesStore: Send + Sync {
    /// All records owned by `owner_id`, ordered by date descending.
    async fn select_by_owner(&self, owner_id: &str) -> Result<Vec<SalesRecord>, DashboardError>;

    /// Persists a batch in a single call. All-or-nothing: a rejection
    /// leaves nothing inserted.
    async fn insert_batch(&self, records: &[SalesRecord]) -> Result<(), DashboardError>;

    async fn delete_by_id(&self, owner_id: &str, id: i64) -> Result<(), DashboardError>;

    async fn delete_by_ids(&self, owner_id: &str, ids: &[i64]) -> Result<(), DashboardError>;
}

/// HTTP implementation over a Supabase/PostgREST REST endpoint.
pub struct SupabaseStore {
    http: reqwest::Client,
    rest_url: String,
    api_key: String,
}

const RECORDS_TABLE: &str = "datos_emprendimiento";

impl SupabaseStore {
    pub fn new(base_url: &str, api_key: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            rest_url: format!("{}/rest/v1/{}", base_url.trim_end_matches('/'), RECORDS_TABLE),
            api_key: api_key.to_string(),
        }
    }

    fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Ok(key) = HeaderValue::from_str(&self.api_key) {
            headers.insert("apikey", key);
        }
        if let Ok(bearer) = HeaderValue::from_str(&format!("Bearer {}", self.api_key)) {
            headers.insert(reqwest::header::AUTHORIZATION, bearer);
        }
        headers
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, DashboardError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(DashboardError::Store(format!("{}: {}", status, body)))
        }
    }
}

#[async_trait]
impl SalesStore for SupabaseStore {
    async fn select_by_owner(&self, owner_id: &str) -> Result<Vec<SalesRecord>, DashboardError> {
        let response = self
            .http
            .get(&self.rest_url)
            .headers(self.headers())
            .query(&[
                ("select", "*"),
                ("usuario_id", &format!("eq.{owner_id}")),
                ("order", "fecha.desc"),
            ])
            .send()
            .await
            .map_err(|e| DashboardError::Store(e.to_string()))?;

        Self::check(response)
            .await?
            .json::<Vec<SalesRecord>>()
            .await
            .map_err(|e| DashboardError::Store(e.to_string()))
    }

    async fn insert_batch(&self, records: &[SalesRecord]) -> Result<(), DashboardError> {
        if records.is_empty() {
            return Ok(());
        }
        let response = self
            .http
            .post(&self.rest_url)
            .headers(self.headers())
            .header("Prefer", "return=minimal")
            .json(records)
            .send()
            .await
            .map_err(|e| DashboardError::Store(e.to_string()))?;
        Self::check(response).await.map(|_| ())
    }

    async fn delete_by_id(&self, owner_id: &str, id: i64) -> Result<(), DashboardError> {
        let response = self
            .http
            .delete(&self.rest_url)
            .headers(self.headers())
            .query(&[
                ("id", &format!("eq.{id}")),
                ("usuario_id", &format!("eq.{owner_id}")),
            ])
            .send()
            .await
            .map_err(|e| DashboardError::Store(e.to_string()))?;
        Self::check(response).await.map(|_| ())
    }

    async fn delete_by_ids(&self, owner_id: &str, ids: &[i64]) -> Result<(), DashboardError> {
        if ids.is_empty() {
            return Ok(());
        }
        let id_list = ids
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join(",");
        let response = self
            .http
            .delete(&self.rest_url)
            .headers(self.headers())
            .query(&[
                ("id", &format!("in.({id_list})")),
                ("usuario_id", &format!("eq.{owner_id}")),
            ])
            .send()
            .await
            .map_err(|e| DashboardError::Store(e.to_string()))?;
        Self::check(response).await.map(|_| ())
    }
}

/// In-memory store with the same contract, for tests and offline runs.
/// Assigns monotonically increasing ids on insert, like the real store.
#[derive(Default)]
pub struct MemoryStore {
    rows: Mutex<Vec<SalesRecord>>,
    next_id: AtomicI64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            rows: Mutex::new(Vec::new()),
            next_id: AtomicI64::new(1),
        }
    }
}

#[async_trait]
impl SalesStore for MemoryStore {
    async fn select_by_owner(&self, owner_id: &str) -> Result<Vec<SalesRecord>, DashboardError> {
        let rows = self.rows.lock().expect("store lock");
        let mut owned: Vec<SalesRecord> = rows
            .iter()
            .filter(|r| r.owner_id == owner_id)
            .cloned()
            .collect();
        owned.sort_by(|a, b| b.date.cmp(&a.date));
        Ok(owned)
    }

    async fn insert_batch(&self, records: &[SalesRecord]) -> Result<(), DashboardError> {
        let mut rows = self.rows.lock().expect("store lock");
        for record in records {
            let mut stored = record.clone();
            stored.id = Some(self.next_id.fetch_add(1, Ordering::SeqCst));
            rows.push(stored);
        }
        Ok(())
    }

    async fn delete_by_id(&self, owner_id: &str, id: i64) -> Result<(), DashboardError> {
        let mut rows = self.rows.lock().expect("store lock");
        rows.retain(|r| !(r.owner_id == owner_id && r.id == Some(id)));
        Ok(())
    }

    async fn delete_by_ids(&self, owner_id: &str, ids: &[i64]) -> Result<(), DashboardError> {
        let mut rows = self.rows.lock().expect("store lock");
        rows.retain(|r| {
            !(r.owner_id == owner_id && r.id.map(|id| ids.contains(&id)).unwrap_or(false))
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(owner: &str, date: &str, quantity: f64) -> SalesRecord {
        SalesRecord {
            id: None,
            salesperson: "Ana".into(),
            city: "La Ceiba".into(),
            business: "Tienda".into(),
            presentation: "500g".into(),
            quantity,
            date: date.into(),
            owner_id: owner.into(),
            source_file: "ventas.xlsx".into(),
        }
    }

    #[tokio::test]
    async fn memory_store_scopes_by_owner_and_orders_by_date_desc() {
        let store = MemoryStore::new();
        store
            .insert_batch(&[
                record("a", "2024-01-10", 1.0),
                record("a", "2024-03-01", 2.0),
                record("b", "2024-02-01", 3.0),
            ])
            .await
            .unwrap();

        let owned = store.select_by_owner("a").await.unwrap();
        assert_eq!(owned.len(), 2);
        assert_eq!(owned[0].date, "2024-03-01");
        assert!(owned.iter().all(|r| r.id.is_some()));
    }

    #[tokio::test]
    async fn deletes_are_owner_scoped() {
        let store = MemoryStore::new();
        store
            .insert_batch(&[record("a", "2024-01-10", 1.0), record("b", "2024-01-10", 2.0)])
            .await
            .unwrap();

        let other_id = store.select_by_owner("b").await.unwrap()[0].id.unwrap();
        // Wrong owner: nothing happens.
        store.delete_by_id("a", other_id).await.unwrap();
        assert_eq!(store.select_by_owner("b").await.unwrap().len(), 1);

        store.delete_by_ids("b", &[other_id]).await.unwrap();
        assert!(store.select_by_owner("b").await.unwrap().is_empty());
    }
}
