use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use crate::{
    db::DbPool,
    error::AppError,
    models::{participant::Participant, trip::Trip},
};

/// Persistence operations the confirmation flow relies on.
#[async_trait]
pub trait TripStore: Send + Sync {
    /// Loads a trip together with its non-owner participants.
    async fn find_with_guests(&self, trip_id: Uuid) -> Result<Option<Trip>, AppError>;

    /// Flips `is_confirmed` from false to true. Returns `false` when the trip
    /// was already confirmed (or does not exist) and nothing was written.
    async fn mark_confirmed(&self, trip_id: Uuid) -> Result<bool, AppError>;
}

#[derive(Clone)]
pub struct SqliteTripStore {
    db: DbPool,
}

impl SqliteTripStore {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }
}

#[derive(FromRow)]
struct TripRow {
    id: String,
    destination: String,
    starts_at: DateTime<Utc>,
    ends_at: DateTime<Utc>,
    is_confirmed: bool,
}

#[derive(FromRow)]
struct ParticipantRow {
    id: String,
    name: Option<String>,
    email: String,
    is_confirmed: bool,
    is_owner: bool,
    trip_id: String,
}

fn parse_id(raw: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw)
        .map_err(|err| AppError::Other(anyhow::anyhow!("corrupt id {raw:?} in database: {err}")))
}

impl TryFrom<ParticipantRow> for Participant {
    type Error = AppError;

    fn try_from(row: ParticipantRow) -> Result<Self, Self::Error> {
        Ok(Participant {
            id: parse_id(&row.id)?,
            name: row.name,
            email: row.email,
            is_confirmed: row.is_confirmed,
            is_owner: row.is_owner,
            trip_id: parse_id(&row.trip_id)?,
        })
    }
}

#[async_trait]
impl TripStore for SqliteTripStore {
    async fn find_with_guests(&self, trip_id: Uuid) -> Result<Option<Trip>, AppError> {
        let id = trip_id.to_string();
        let Some(row) = sqlx::query_as::<_, TripRow>(
            "SELECT id, destination, starts_at, ends_at, is_confirmed FROM trips WHERE id = ?",
        )
        .bind(&id)
        .fetch_optional(&self.db)
        .await?
        else {
            return Ok(None);
        };

        let participants = sqlx::query_as::<_, ParticipantRow>(
            "SELECT id, name, email, is_confirmed, is_owner, trip_id FROM participants \
             WHERE trip_id = ? AND is_owner = 0 ORDER BY email",
        )
        .bind(&id)
        .fetch_all(&self.db)
        .await?
        .into_iter()
        .map(Participant::try_from)
        .collect::<Result<Vec<_>, _>>()?;

        Ok(Some(Trip {
            id: parse_id(&row.id)?,
            destination: row.destination,
            starts_at: row.starts_at,
            ends_at: row.ends_at,
            is_confirmed: row.is_confirmed,
            participants,
        }))
    }

    async fn mark_confirmed(&self, trip_id: Uuid) -> Result<bool, AppError> {
        let result =
            sqlx::query("UPDATE trips SET is_confirmed = 1 WHERE id = ? AND is_confirmed = 0")
                .bind(trip_id.to_string())
                .execute(&self.db)
                .await?;
        Ok(result.rows_affected() == 1)
    }
}
