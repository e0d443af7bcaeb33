pub mod invitations;
pub mod mail;
pub mod trips;
