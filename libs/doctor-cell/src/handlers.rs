use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    Json,
};
use chrono::{Duration, Utc};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_models::auth::{Role, User};
use shared_models::error::AppError;
use shared_utils::extractor::require_role;
use shared_utils::AppState;

use crate::models::{DateRangeQuery, UpdateScheduleRequest};
use crate::services::{AvailabilityService, ScheduleService};

// ==============================================================================
// PUBLIC AVAILABILITY HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn get_available_slots(
    State(state): State<Arc<AppState>>,
    Path(doctor_id): Path<Uuid>,
    Query(query): Query<DateRangeQuery>,
) -> Result<Json<Value>, AppError> {
    let now = Utc::now();
    let from = query
        .from
        .unwrap_or_else(|| state.config.clinic.local_date(now));
    let to = query.to.unwrap_or(from);

    let availability_service = AvailabilityService::new(&state);
    let days = availability_service
        .available_slots(doctor_id, from, to, now)
        .await?;

    let total_slots: usize = days.iter().map(|d| d.slots.len()).sum();

    Ok(Json(json!({
        "doctor_id": doctor_id,
        "from": from,
        "to": to,
        "days": days,
        "total_slots": total_slots
    })))
}

#[axum::debug_handler]
pub async fn get_schedule(
    State(state): State<Arc<AppState>>,
    Path(doctor_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let schedule = ScheduleService::new(&state).get_schedule(doctor_id).await?;
    Ok(Json(json!(schedule)))
}

#[axum::debug_handler]
pub async fn get_day_offs(
    State(state): State<Arc<AppState>>,
    Path(doctor_id): Path<Uuid>,
    Query(query): Query<DateRangeQuery>,
) -> Result<Json<Value>, AppError> {
    let today = state.config.clinic.local_date(Utc::now());
    let from = query.from.unwrap_or(today);
    let to = query
        .to
        .unwrap_or(from + Duration::days(state.config.clinic.max_range_days));

    let day_offs = ScheduleService::new(&state)
        .day_offs(doctor_id, from, to)
        .await?;

    Ok(Json(json!({
        "doctor_id": doctor_id,
        "day_offs": day_offs,
        "total": day_offs.len()
    })))
}

// ==============================================================================
// PROTECTED SCHEDULE HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn update_schedule(
    State(state): State<Arc<AppState>>,
    Path(doctor_id): Path<Uuid>,
    Extension(user): Extension<User>,
    Json(request): Json<UpdateScheduleRequest>,
) -> Result<Json<Value>, AppError> {
    let role = require_role(&user, &[Role::Admin, Role::Doctor])?;
    if role == Role::Doctor && !user.is(doctor_id) {
        return Err(AppError::Forbidden(
            "Doctors can only update their own schedule".to_string(),
        ));
    }

    let schedule = ScheduleService::new(&state)
        .update_schedule(doctor_id, request)
        .await?;

    Ok(Json(json!(schedule)))
}
