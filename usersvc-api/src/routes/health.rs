/// Health check endpoint
///
/// Checks the credential store and session cache, each under the backend
/// timeout. Always answers 200; the body says whether the service is
/// `healthy` or `degraded`.
///
/// # Endpoint
///
/// ```text
/// GET /health
/// ```
///
/// # Response
///
/// ```json
/// {
///   "status": "healthy",
///   "service": "user-service",
///   "version": "0.1.0",
///   "timestamp": "2025-01-01T00:00:00Z",
///   "active_requests": 1,
///   "dependencies": {
///     "database": "healthy",
///     "redis": "healthy"
///   }
/// }
/// ```

use crate::{app::AppState, middleware::correlation::CorrelationId};
use axum::{extract::State, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

/// Name reported in health responses
pub const SERVICE_NAME: &str = "user-service";

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// `healthy` or `degraded`
    pub status: String,

    pub service: String,

    /// Application version
    pub version: String,

    pub timestamp: DateTime<Utc>,

    /// Requests in flight, this one included
    pub active_requests: usize,

    pub dependencies: DependencyStatus,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DependencyStatus {
    /// `healthy` or `unhealthy: <reason>`
    pub database: String,

    pub redis: String,
}

impl DependencyStatus {
    pub fn all_healthy(&self) -> bool {
        self.database == "healthy" && self.redis == "healthy"
    }
}

async fn check_dependency<E, F>(timeout: Duration, fut: F) -> String
where
    E: Display,
    F: Future<Output = Result<(), E>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(Ok(())) => "healthy".to_string(),
        Ok(Err(e)) => format!("unhealthy: {}", e),
        Err(_) => format!("unhealthy: timed out after {:?}", timeout),
    }
}

/// Health check handler
pub async fn health_check(
    State(state): State<AppState>,
    correlation: CorrelationId,
) -> Json<HealthResponse> {
    let timeout = state.config.backend_timeout();

    let result = state
        .spans
        .instrument::<_, Infallible, _>("health_check", correlation.as_str(), async {
            let (database, redis) = tokio::join!(
                check_dependency(timeout, state.store.ping()),
                check_dependency(timeout, state.cache.ping()),
            );
            Ok(DependencyStatus { database, redis })
        })
        .await;
    let dependencies = match result {
        Ok(dependencies) => dependencies,
        Err(never) => match never {},
    };

    if !dependencies.all_healthy() {
        tracing::warn!(
            database = %dependencies.database,
            redis = %dependencies.redis,
            "Health check degraded"
        );
    }

    Json(HealthResponse {
        status: if dependencies.all_healthy() {
            "healthy".to_string()
        } else {
            "degraded".to_string()
        },
        service: SERVICE_NAME.to_string(),
        version: usersvc_shared::VERSION.to_string(),
        timestamp: Utc::now(),
        active_requests: state.active.get(),
        dependencies,
    })
}
