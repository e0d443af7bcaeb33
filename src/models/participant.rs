use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    pub id: Uuid,
    pub name: Option<String>,
    pub email: String,
    pub is_confirmed: bool,
    pub is_owner: bool,
    pub trip_id: Uuid,
}
