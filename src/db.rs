use anyhow::Context;
use sqlx::{postgres::PgPoolOptions, PgPool};

use crate::{
    config::AppConfig,
    error::{StoreError, UniqueField},
};

/// Postgres-backed user and ride store.
#[derive(Clone)]
pub struct PgStore {
    pub db: PgPool,
}

impl PgStore {
    pub async fn connect(config: &AppConfig) -> anyhow::Result<Self> {
        let db = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.database_url)
            .await
            .context("connect to database")?;
        Ok(Self { db })
    }

    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.db)
            .await
            .context("run migrations")
    }
}

/// Translate a unique-constraint violation into the field it protects.
pub(crate) fn map_db_error(e: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db_err) = &e {
        if db_err.is_unique_violation() {
            if let Some(field) = db_err.constraint().and_then(unique_field) {
                return StoreError::Duplicate(field);
            }
        }
    }
    StoreError::Database(e)
}

fn unique_field(constraint: &str) -> Option<UniqueField> {
    match constraint {
        "users_email_key" => Some(UniqueField::Email),
        "users_phone_key" => Some(UniqueField::Phone),
        "users_license_key" => Some(UniqueField::License),
        "users_otp_key" => Some(UniqueField::OneTimeCode),
        "rides_one_open_per_passenger" => Some(UniqueField::PassengerOpenRide),
        "rides_one_open_per_rider" => Some(UniqueField::RiderOpenRide),
        _ => None,
    }
}
