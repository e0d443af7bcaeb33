use async_trait::async_trait;
use axum::{
    extract::{FromRequestParts, Path, State},
    http::{header, request::Parts, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::{
    error::{AppError, FieldErrors},
    services::invitations::{confirmation_email, dispatch},
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new().route(
        "/trips/:tripId/confirm/:participantId",
        get(confirm_participant),
    )
}

#[derive(Deserialize)]
struct RawConfirmParams {
    #[serde(rename = "tripId")]
    trip_id: String,
    #[serde(rename = "participantId")]
    participant_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfirmParams {
    pub trip_id: Uuid,
    /// Checked for shape only; confirming a trip notifies every guest.
    pub participant_id: Uuid,
}

impl ConfirmParams {
    pub fn parse(trip_id: &str, participant_id: &str) -> Result<Self, AppError> {
        let mut errors = FieldErrors::new();
        let trip_id = parse_uuid_field(&mut errors, "tripId", trip_id);
        let participant_id = parse_uuid_field(&mut errors, "participantId", participant_id);

        match (trip_id, participant_id) {
            (Some(trip_id), Some(participant_id)) if errors.is_empty() => Ok(Self {
                trip_id,
                participant_id,
            }),
            _ => Err(AppError::InvalidInput(errors)),
        }
    }
}

/// Only the hyphenated 8-4-4-4-12 form is accepted.
fn parse_uuid_field(errors: &mut FieldErrors, field: &str, raw: &str) -> Option<Uuid> {
    let hyphenated = raw.len() == 36
        && raw
            .char_indices()
            .all(|(idx, ch)| matches!(idx, 8 | 13 | 18 | 23) == (ch == '-'));
    match Uuid::try_parse(raw) {
        Ok(id) if hyphenated => Some(id),
        _ => {
            errors
                .entry(field.to_string())
                .or_default()
                .push("Invalid uuid".to_string());
            None
        }
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for ConfirmParams
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(raw) = Path::<RawConfirmParams>::from_request_parts(parts, state)
            .await
            .map_err(|rejection| AppError::BadRequest(rejection.body_text()))?;
        Self::parse(&raw.trip_id, &raw.participant_id)
    }
}

fn found(location: String) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location)]).into_response()
}

async fn confirm_participant(
    State(state): State<AppState>,
    params: ConfirmParams,
) -> Result<Response, AppError> {
    let trip_url = state.config.trip_url(params.trip_id);

    let trip = state
        .trips
        .find_with_guests(params.trip_id)
        .await?
        .ok_or_else(|| AppError::not_found("Trip not found."))?;

    if trip.is_confirmed {
        return Ok(found(trip_url));
    }

    if !state.trips.mark_confirmed(trip.id).await? {
        info!(trip_id = %trip.id, "trip confirmed by a concurrent request");
        return Ok(found(trip_url));
    }
    info!(trip_id = %trip.id, guests = trip.participants.len(), "trip confirmed");

    let emails = trip
        .participants
        .iter()
        .map(|participant| confirmation_email(&state.config, &trip, participant))
        .collect::<Result<Vec<_>, _>>()?;
    let report = dispatch(state.mailer.as_ref(), emails).await;
    if !report.is_complete() {
        return Err(AppError::Delivery(report));
    }

    Ok(found(trip_url))
}
