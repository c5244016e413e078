use axum::{
    Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
};
use chrono::NaiveDate;
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use crate::solar::analysis::{CurvePoint, DailyTotal};
use crate::solar::calendar::DaySpan;
use crate::solar::document::{Metadata, SolarDocument};
use crate::solar::key_dates::KeyDate;
use crate::solar::operators;

#[derive(Clone)]
struct AppState {
    document: Arc<SolarDocument>,
}

#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    data: Option<T>,
    error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
        }
    }
}

#[derive(Serialize)]
struct DayResponse {
    total: DailyTotal,
    curve: Vec<CurvePoint>,
    key_dates: Vec<KeyDate>,
}

fn parse_date(raw: &str) -> Result<NaiveDate, StatusCode> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|e| {
        warn!(date = raw, error = %e, "Rejected malformed date");
        StatusCode::BAD_REQUEST
    })
}

/// GET /api/v1/solar/document
/// Serialized straight from the shared document
async fn get_document(State(state): State<AppState>) -> Response {
    Json(ApiResponse::success(state.document.as_ref())).into_response()
}

/// GET /api/v1/solar/metadata
async fn get_metadata(State(state): State<AppState>) -> Json<ApiResponse<Metadata>> {
    Json(ApiResponse::success(state.document.metadata.clone()))
}

/// GET /api/v1/solar/daily-totals
async fn get_daily_totals(State(state): State<AppState>) -> Json<ApiResponse<Vec<DailyTotal>>> {
    Json(ApiResponse::success(state.document.daily_totals.clone()))
}

/// GET /api/v1/solar/key-dates
async fn get_key_dates(State(state): State<AppState>) -> Json<ApiResponse<Vec<KeyDate>>> {
    Json(ApiResponse::success(state.document.key_dates.clone()))
}

/// GET /api/v1/solar/curves/:date
/// Intraday curve of one local day
async fn get_curve(
    State(state): State<AppState>,
    Path(date): Path<String>,
) -> Result<Json<ApiResponse<Vec<CurvePoint>>>, StatusCode> {
    let date = parse_date(&date)?;
    let curve = state
        .document
        .intraday_curves
        .get(&date)
        .ok_or(StatusCode::NOT_FOUND)?;

    Ok(Json(ApiResponse::success(curve.clone())))
}

/// GET /api/v1/solar/days/:date
/// Total, curve and any annotations of one local day
async fn get_day(
    State(state): State<AppState>,
    Path(date): Path<String>,
) -> Result<Json<ApiResponse<DayResponse>>, StatusCode> {
    let date = parse_date(&date)?;
    let year = state.document.metadata.year;

    let in_year = DaySpan::calendar_year(year).is_some_and(|span| span.contains(date));
    let total = state.document.total_for(date).filter(|_| in_year);
    let Some(total) = total else {
        return Ok(Json(ApiResponse::error(format!(
            "No data for {} in {}",
            date, year
        ))));
    };

    let response = DayResponse {
        total: total.clone(),
        curve: state
            .document
            .intraday_curves
            .get(&date)
            .cloned()
            .unwrap_or_default(),
        key_dates: state
            .document
            .key_dates
            .iter()
            .filter(|k| k.date == date)
            .cloned()
            .collect(),
    };

    Ok(Json(ApiResponse::success(response)))
}

#[derive(Serialize)]
struct OperatorInfo {
    code: String,
    name: String,
    timezone: String,
    interval_minutes: u32,
}

/// GET /api/v1/operators
/// List all known grid operators
async fn list_operators() -> Json<ApiResponse<Vec<OperatorInfo>>> {
    let operators = operators::list_operators()
        .into_iter()
        .map(|op| OperatorInfo {
            code: op.code.to_string(),
            name: op.name.to_string(),
            timezone: op.timezone.to_string(),
            interval_minutes: op.fuel_mix_interval_minutes,
        })
        .collect();

    Json(ApiResponse::success(operators))
}

/// GET /health
async fn health() -> &'static str {
    "OK"
}

fn router(document: SolarDocument) -> Router {
    let state = AppState {
        document: Arc::new(document),
    };

    Router::new()
        .route("/health", get(health))
        .route("/api/v1/operators", get(list_operators))
        .route("/api/v1/solar/document", get(get_document))
        .route("/api/v1/solar/metadata", get(get_metadata))
        .route("/api/v1/solar/daily-totals", get(get_daily_totals))
        .route("/api/v1/solar/key-dates", get(get_key_dates))
        .route("/api/v1/solar/curves/{date}", get(get_curve))
        .route("/api/v1/solar/days/{date}", get(get_day))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn start_server(document: SolarDocument, bind: &str) -> anyhow::Result<()> {
    let year = document.metadata.year;
    let app = router(document);

    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!(address = bind, year, "Server running");
    info!("Endpoints: /health, /api/v1/operators, /api/v1/solar/{{document,metadata,daily-totals,key-dates}}, /api/v1/solar/curves/:date, /api/v1/solar/days/:date");

    axum::serve(listener, app).await?;

    Ok(())
}
