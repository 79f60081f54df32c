pub mod candidates;
pub mod config;
pub mod dataset;
pub mod engine;
pub mod error;
pub mod models;
pub mod planner;
pub mod ranking;
pub mod resolver;
pub mod routing;
pub mod shade;
pub mod sun_position;

#[cfg(test)]
mod test_fixtures;

use std::{sync::Arc, time::Duration};

use axum::{
    Json, Router,
    extract::{Query, State, rejection::JsonRejection},
    http::StatusCode,
    routing::{get, post},
};
use serde::Deserialize;
use shared::ApiError;
use tower_http::cors::{Any, CorsLayer};

use crate::error::PlanError;
use crate::models::{Landmark, Route, RouteRequest};
use crate::planner::RoutePlanner;

#[derive(Clone)]
pub struct AppState {
    pub planner: Arc<RoutePlanner>,
    pub request_timeout: Duration,
}

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/route", post(route_handler))
        .route("/api/landmarks", get(landmarks_handler))
        .layer(cors)
        .with_state(state)
}

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<ApiError>)>;

async fn route_handler(
    State(state): State<AppState>,
    payload: Result<Json<shared::RouteRequest>, JsonRejection>,
) -> ApiResult<Vec<Route>> {
    let Json(payload) = payload.map_err(|rejection| {
        tracing::debug!("rejected route payload: {rejection}");
        (
            StatusCode::BAD_REQUEST,
            Json(ApiError {
                kind: "InvalidRequest".to_string(),
                field: None,
                message: rejection.body_text(),
            }),
        )
    })?;

    let request = RouteRequest::try_from(payload).map_err(plan_error)?;
    let routes = Arc::clone(&state.planner)
        .plan_with_timeout(request, state.request_timeout)
        .await
        .map_err(plan_error)?;

    Ok(Json(routes))
}

#[derive(Debug, Deserialize)]
struct LandmarkQuery {
    q: Option<String>,
}

async fn landmarks_handler(
    State(state): State<AppState>,
    Query(query): Query<LandmarkQuery>,
) -> Json<Vec<Landmark>> {
    let landmarks = match query.q {
        Some(q) => state.planner.suggest(&q),
        None => state.planner.landmarks().to_vec(),
    };
    Json(landmarks)
}

fn plan_error(err: PlanError) -> (StatusCode, Json<ApiError>) {
    let status = match &err {
        PlanError::InvalidRequest { .. } => StatusCode::BAD_REQUEST,
        PlanError::LocationNotResolved { .. } | PlanError::NoRouteFound { .. } => {
            StatusCode::NOT_FOUND
        }
        PlanError::AmbiguousLocation { .. } => StatusCode::CONFLICT,
        PlanError::RouteComputationTimeout => StatusCode::GATEWAY_TIMEOUT,
    };
    tracing::debug!("route request failed with {status}: {err}");

    (
        status,
        Json(ApiError {
            kind: err.kind().to_string(),
            field: err.field().map(|f| f.as_str().to_string()),
            message: err.to_string(),
        }),
    )
}
