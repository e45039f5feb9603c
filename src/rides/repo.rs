use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    db::{map_db_error, PgStore},
    error::StoreResult,
    rides::repo_types::{
        NewRide, Ride, RideRow, RideStatus, RiderGuard, RiderRide, RiderRideRow,
    },
};

/// Persistent storage for rides.
///
/// Every mutating method is a single conditional update: it either applies
/// in full while its guard holds or returns `None` without touching the ride.
#[async_trait]
pub trait RideStore: Send + Sync {
    /// Insert an `active` ride with its passenger attached.
    async fn insert(&self, ride: NewRide) -> StoreResult<Ride>;

    async fn find(&self, id: Uuid) -> StoreResult<Option<Ride>>;

    /// The passenger's ride in `active` or `accepted`, if any.
    async fn find_open_for_passenger(&self, passenger_id: Uuid) -> StoreResult<Option<Ride>>;

    /// The rider's ride in `accepted`, `pickup` or `drop`, if any.
    async fn find_open_for_rider(&self, rider_id: Uuid) -> StoreResult<Option<Ride>>;

    /// Attach the passenger to the oldest `active` ride without a passenger
    /// whose pickup and dropoff addresses match, moving it to `accepted`.
    async fn attach_passenger(
        &self,
        pickup_address: &str,
        dropoff_address: &str,
        passenger_id: Uuid,
        otp: i32,
    ) -> StoreResult<Option<Ride>>;

    /// Assign the rider while the ride is `active` and has no rider.
    async fn claim(&self, ride_id: Uuid, rider_id: Uuid, otp: i32) -> StoreResult<Option<Ride>>;

    /// Move the ride from `from` to `to` while it is in `from` and `guard` holds.
    async fn transition(
        &self,
        ride_id: Uuid,
        from: RideStatus,
        to: RideStatus,
        guard: RiderGuard,
    ) -> StoreResult<Option<Ride>>;

    async fn list_by_status(&self, status: RideStatus) -> StoreResult<Vec<Ride>>;

    /// Rides of the rider past `active`, newest first.
    async fn list_rider_history(&self, rider_id: Uuid) -> StoreResult<Vec<RiderRide>>;

    /// All rides of the passenger, newest first.
    async fn list_for_passenger(&self, passenger_id: Uuid) -> StoreResult<Vec<Ride>>;
}

const RIDE_COLUMNS: &str = r#"
    id, rider_id, passenger_id,
    pickup_address, pickup_latitude, pickup_longitude,
    dropoff_address, dropoff_latitude, dropoff_longitude,
    status, otp, fare, payment_status, feedback_rating, feedback_comment,
    created_at, updated_at
"#;

#[async_trait]
impl RideStore for PgStore {
    async fn insert(&self, ride: NewRide) -> StoreResult<Ride> {
        let row = sqlx::query_as::<_, RideRow>(&format!(
            r#"
            INSERT INTO rides (
                id, passenger_id,
                pickup_address, pickup_latitude, pickup_longitude,
                dropoff_address, dropoff_latitude, dropoff_longitude
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {RIDE_COLUMNS}
            "#
        ))
        .bind(ride.id)
        .bind(ride.passenger_id)
        .bind(&ride.pickup_location.address)
        .bind(ride.pickup_location.coordinates.latitude)
        .bind(ride.pickup_location.coordinates.longitude)
        .bind(&ride.dropoff_location.address)
        .bind(ride.dropoff_location.coordinates.latitude)
        .bind(ride.dropoff_location.coordinates.longitude)
        .fetch_one(&self.db)
        .await
        .map_err(map_db_error)?;
        Ok(row.into())
    }

    async fn find(&self, id: Uuid) -> StoreResult<Option<Ride>> {
        let row = sqlx::query_as::<_, RideRow>(&format!(
            "SELECT {RIDE_COLUMNS} FROM rides WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await
        .map_err(map_db_error)?;
        Ok(row.map(Into::into))
    }

    async fn find_open_for_passenger(&self, passenger_id: Uuid) -> StoreResult<Option<Ride>> {
        let row = sqlx::query_as::<_, RideRow>(&format!(
            r#"
            SELECT {RIDE_COLUMNS} FROM rides
             WHERE passenger_id = $1 AND status IN ('active', 'accepted')
             LIMIT 1
            "#
        ))
        .bind(passenger_id)
        .fetch_optional(&self.db)
        .await
        .map_err(map_db_error)?;
        Ok(row.map(Into::into))
    }

    async fn find_open_for_rider(&self, rider_id: Uuid) -> StoreResult<Option<Ride>> {
        let row = sqlx::query_as::<_, RideRow>(&format!(
            r#"
            SELECT {RIDE_COLUMNS} FROM rides
             WHERE rider_id = $1 AND status IN ('accepted', 'pickup', 'drop')
             LIMIT 1
            "#
        ))
        .bind(rider_id)
        .fetch_optional(&self.db)
        .await
        .map_err(map_db_error)?;
        Ok(row.map(Into::into))
    }

    async fn attach_passenger(
        &self,
        pickup_address: &str,
        dropoff_address: &str,
        passenger_id: Uuid,
        otp: i32,
    ) -> StoreResult<Option<Ride>> {
        // Rows locked by a concurrent booker are skipped.
        let row = sqlx::query_as::<_, RideRow>(&format!(
            r#"
            UPDATE rides
               SET passenger_id = $3, status = 'accepted', otp = $4, updated_at = now()
             WHERE id = (
                    SELECT id FROM rides
                     WHERE pickup_address = $1 AND dropoff_address = $2
                       AND status = 'active' AND passenger_id IS NULL
                     ORDER BY created_at
                     LIMIT 1
                     FOR UPDATE SKIP LOCKED
                   )
               AND status = 'active' AND passenger_id IS NULL
            RETURNING {RIDE_COLUMNS}
            "#
        ))
        .bind(pickup_address)
        .bind(dropoff_address)
        .bind(passenger_id)
        .bind(otp)
        .fetch_optional(&self.db)
        .await
        .map_err(map_db_error)?;
        Ok(row.map(Into::into))
    }

    async fn claim(&self, ride_id: Uuid, rider_id: Uuid, otp: i32) -> StoreResult<Option<Ride>> {
        let row = sqlx::query_as::<_, RideRow>(&format!(
            r#"
            UPDATE rides
               SET rider_id = $2, status = 'accepted', otp = $3, updated_at = now()
             WHERE id = $1 AND status = 'active' AND rider_id IS NULL
            RETURNING {RIDE_COLUMNS}
            "#
        ))
        .bind(ride_id)
        .bind(rider_id)
        .bind(otp)
        .fetch_optional(&self.db)
        .await
        .map_err(map_db_error)?;
        Ok(row.map(Into::into))
    }

    async fn transition(
        &self,
        ride_id: Uuid,
        from: RideStatus,
        to: RideStatus,
        guard: RiderGuard,
    ) -> StoreResult<Option<Ride>> {
        let (require_rider, rider_id) = match guard {
            RiderGuard::Any => (false, None),
            RiderGuard::Assigned => (true, None),
            RiderGuard::Is(id) => (true, Some(id)),
        };
        let row = sqlx::query_as::<_, RideRow>(&format!(
            r#"
            UPDATE rides
               SET status = $3, updated_at = now()
             WHERE id = $1 AND status = $2
               AND (NOT $4 OR rider_id IS NOT NULL)
               AND ($5::uuid IS NULL OR rider_id = $5)
            RETURNING {RIDE_COLUMNS}
            "#
        ))
        .bind(ride_id)
        .bind(from)
        .bind(to)
        .bind(require_rider)
        .bind(rider_id)
        .fetch_optional(&self.db)
        .await
        .map_err(map_db_error)?;
        Ok(row.map(Into::into))
    }

    async fn list_by_status(&self, status: RideStatus) -> StoreResult<Vec<Ride>> {
        let rows = sqlx::query_as::<_, RideRow>(&format!(
            "SELECT {RIDE_COLUMNS} FROM rides WHERE status = $1 ORDER BY created_at DESC"
        ))
        .bind(status)
        .fetch_all(&self.db)
        .await
        .map_err(map_db_error)?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn list_rider_history(&self, rider_id: Uuid) -> StoreResult<Vec<RiderRide>> {
        let rows = sqlx::query_as::<_, RiderRideRow>(
            r#"
            SELECT r.id, r.rider_id, r.passenger_id,
                   r.pickup_address, r.pickup_latitude, r.pickup_longitude,
                   r.dropoff_address, r.dropoff_latitude, r.dropoff_longitude,
                   r.status, r.otp, r.fare, r.payment_status,
                   r.feedback_rating, r.feedback_comment,
                   r.created_at, r.updated_at,
                   u.otp AS passenger_otp
              FROM rides r
              LEFT JOIN users u ON u.id = r.passenger_id
             WHERE r.rider_id = $1
               AND r.status IN ('accepted', 'pickup', 'drop', 'completed')
             ORDER BY r.created_at DESC
            "#,
        )
        .bind(rider_id)
        .fetch_all(&self.db)
        .await
        .map_err(map_db_error)?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn list_for_passenger(&self, passenger_id: Uuid) -> StoreResult<Vec<Ride>> {
        let rows = sqlx::query_as::<_, RideRow>(&format!(
            r#"
            SELECT {RIDE_COLUMNS} FROM rides
             WHERE passenger_id = $1
             ORDER BY created_at DESC
            "#
        ))
        .bind(passenger_id)
        .fetch_all(&self.db)
        .await
        .map_err(map_db_error)?;
        Ok(rows.into_iter().map(Into::into).collect())
    }
}
