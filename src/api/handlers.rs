//! API Handlers
//!
//! HTTP request handlers for the operational endpoints: listing, inspecting,
//! deleting and cleaning up cache entries.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use tracing::info;

use crate::cache::{CacheEngine, EntryInfo};
use crate::context::CacheContext;
use crate::error::{CacheError, Result};
use crate::models::{
    CleanupResponse, ClearResponse, DeleteResponse, EntriesQuery, EntriesResponse,
    HealthResponse, StatsResponse,
};

/// Application state shared across all handlers.
#[derive(Clone, Debug)]
pub struct AppState {
    /// Engine the operational API inspects
    pub cache: CacheEngine,
}

impl AppState {
    pub fn new(cache: CacheEngine) -> Self {
        Self { cache }
    }

    pub fn from_context(ctx: &CacheContext) -> Self {
        Self::new(ctx.engine().clone())
    }
}

/// Handler for GET /entries?prefix=
pub async fn list_entries_handler(
    State(state): State<AppState>,
    Query(query): Query<EntriesQuery>,
) -> Result<Json<EntriesResponse>> {
    let entries = state.cache.entries(query.prefix()).await?;
    Ok(Json(EntriesResponse::new(entries)))
}

/// Handler for GET /entries/:key
///
/// Returns the entry even when it has expired; 404 only if nothing is stored.
pub async fn get_entry_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<EntryInfo>> {
    state
        .cache
        .entry(&key)
        .await?
        .map(Json)
        .ok_or_else(|| CacheError::NotFound(key))
}

/// Handler for DELETE /entries/:key
pub async fn delete_entry_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<DeleteResponse>> {
    if state.cache.entry(&key).await?.is_none() {
        return Err(CacheError::NotFound(key));
    }
    state.cache.delete(&key).await?;

    Ok(Json(DeleteResponse::new(key)))
}

/// Handler for DELETE /entries?prefix=
pub async fn clear_entries_handler(
    State(state): State<AppState>,
    Query(query): Query<EntriesQuery>,
) -> Result<Json<ClearResponse>> {
    let removed = state.cache.clear(query.prefix()).await?;
    info!("Cleared {} keys under prefix '{}'", removed, query.prefix());

    Ok(Json(ClearResponse::new(query.prefix(), removed)))
}

/// Handler for POST /cleanup
pub async fn cleanup_handler(State(state): State<AppState>) -> Result<Json<CleanupResponse>> {
    let removed = state.cache.cleanup_expired().await?;
    Ok(Json(CleanupResponse { removed }))
}

/// Handler for GET /stats
pub async fn stats_handler(State(state): State<AppState>) -> Json<StatsResponse> {
    Json(StatsResponse::new(
        state.cache.backend().kind(),
        state.cache.stats(),
    ))
}

/// Handler for GET /health
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Backend;
    use crate::cache::{EngineSettings, Ttl};
    use std::time::Duration;

    async fn seeded_state() -> AppState {
        let settings = EngineSettings {
            cleanup_grace: Duration::ZERO,
            ..EngineSettings::default()
        };
        let cache = CacheEngine::new(Backend::memory(), settings);
        cache.set("parks_1", &"magic", None).await.unwrap();
        cache.set("parks_2", &"epcot", Some(Ttl::millis(0))).await.unwrap();
        cache.set("rides_1", &"coaster", None).await.unwrap();
        AppState::new(cache)
    }

    #[tokio::test]
    async fn test_list_entries_handler_filters_by_prefix() {
        let state = seeded_state().await;
        let query = EntriesQuery {
            prefix: Some("parks_".to_string()),
        };

        let response = list_entries_handler(State(state), Query(query)).await.unwrap();
        assert_eq!(response.count, 2);
        assert!(response.entries.iter().any(|e| e.key == "parks_2" && e.expired));
    }

    #[tokio::test]
    async fn test_get_entry_handler_not_found() {
        let state = seeded_state().await;

        let result = get_entry_handler(State(state), Path("nope".to_string())).await;
        assert!(matches!(result, Err(CacheError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_delete_entry_handler() {
        let state = seeded_state().await;

        let result = delete_entry_handler(State(state.clone()), Path("rides_1".to_string())).await;
        assert!(result.is_ok());

        let again = delete_entry_handler(State(state), Path("rides_1".to_string())).await;
        assert!(matches!(again, Err(CacheError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_clear_and_cleanup_handlers() {
        let state = seeded_state().await;

        let cleaned = cleanup_handler(State(state.clone())).await.unwrap();
        assert_eq!(cleaned.removed, 1);

        let cleared = clear_entries_handler(State(state.clone()), Query(EntriesQuery::default()))
            .await
            .unwrap();
        assert_eq!(cleared.removed, 2);
        assert!(state.cache.get_keys("").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_stats_handler() {
        let state = seeded_state().await;
        state.cache.get::<String>("parks_1").await.unwrap();

        let response = stats_handler(State(state)).await;
        assert_eq!(response.backend, "memory");
        assert_eq!(response.stats.hits, 1);
    }

    #[tokio::test]
    async fn test_health_handler() {
        let response = health_handler().await;
        assert_eq!(response.status, "healthy");
    }
}
