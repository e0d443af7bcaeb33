use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::participant::Participant;

#[derive(Debug, Clone)]
pub struct Trip {
    pub id: Uuid,
    pub destination: String,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub is_confirmed: bool,
    /// Only the participants the query asked for; confirmation loads guests.
    pub participants: Vec<Participant>,
}
