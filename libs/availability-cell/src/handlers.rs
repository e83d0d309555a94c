use std::str::FromStr;
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    Json,
};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::{json, Value};

use pricing_cell::ServiceType;
use shared_models::error::AppError;

use crate::models::AvailabilityError;
use crate::router::AvailabilityState;
use crate::services::availability::AvailabilityService;

#[derive(Debug, Deserialize)]
pub struct AvailabilityQueryParams {
    pub service_type: String,
    pub date: String,
}

#[axum::debug_handler]
pub async fn get_availability(
    State(state): State<Arc<AvailabilityState>>,
    Query(params): Query<AvailabilityQueryParams>,
) -> Result<Json<Value>, AppError> {
    let service_type = ServiceType::from_str(&params.service_type)
        .map_err(|e| AppError::ValidationError(e.to_string()))?;

    let date = NaiveDate::parse_from_str(&params.date, "%Y-%m-%d")
        .map_err(|_| AppError::ValidationError("Date must be in YYYY-MM-DD format".to_string()))?;

    let service = AvailabilityService::new(&state.config, state.cache.clone());

    let day = service
        .get_available_slots(service_type, date)
        .await
        .map_err(|e| match e {
            AvailabilityError::InvalidDate(msg) => AppError::ValidationError(msg),
            AvailabilityError::UnknownService(msg) => {
                AppError::ValidationError(format!("Unknown service type: {}", msg))
            }
            AvailabilityError::InactiveService(_) => {
                AppError::NotFound("Service not found or inactive".to_string())
            }
            AvailabilityError::CalendarNotMapped(service) => AppError::Internal(format!(
                "No calendar configured for service type {}",
                service
            )),
            AvailabilityError::Provider(inner) => AppError::ExternalService(format!(
                "Calendar provider unavailable: {}",
                inner
            )),
            AvailabilityError::DatabaseError(msg) => AppError::Database(msg),
        })?;

    Ok(Json(json!(day)))
}
