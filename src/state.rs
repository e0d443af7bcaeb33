use std::sync::Arc;

use crate::{
    config::AppConfig,
    db::DbPool,
    services::{
        mail::Mailer,
        trips::{SqliteTripStore, TripStore},
    },
};

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub trips: Arc<dyn TripStore>,
    pub mailer: Arc<dyn Mailer>,
}

impl AppState {
    pub fn new(config: AppConfig, db: DbPool, mailer: Arc<dyn Mailer>) -> Self {
        Self::with_store(config, Arc::new(SqliteTripStore::new(db)), mailer)
    }

    pub fn with_store(
        config: AppConfig,
        trips: Arc<dyn TripStore>,
        mailer: Arc<dyn Mailer>,
    ) -> Self {
        Self {
            config,
            trips,
            mailer,
        }
    }
}
