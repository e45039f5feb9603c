use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// Lifecycle status of a ride.
///
/// ```text
/// active -> accepted -> pickup -> drop -> completed
/// active -> cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "ride_status", rename_all = "lowercase")]
pub enum RideStatus {
    Active,
    Accepted,
    Pickup,
    Drop,
    Completed,
    Cancelled,
}

impl RideStatus {
    /// Statuses in which a passenger may not book another ride.
    pub const PASSENGER_OPEN: [RideStatus; 2] = [RideStatus::Active, RideStatus::Accepted];

    /// Statuses in which a rider may not claim another ride.
    pub const RIDER_OPEN: [RideStatus; 3] =
        [RideStatus::Accepted, RideStatus::Pickup, RideStatus::Drop];

    /// Statuses listed in a rider's history.
    pub const RIDER_HISTORY: [RideStatus; 4] = [
        RideStatus::Accepted,
        RideStatus::Pickup,
        RideStatus::Drop,
        RideStatus::Completed,
    ];

    /// Whether `self -> next` is an edge of the lifecycle graph.
    pub fn can_advance_to(self, next: RideStatus) -> bool {
        use RideStatus::*;
        matches!(
            (self, next),
            (Active, Accepted)
                | (Accepted, Pickup)
                | (Pickup, Drop)
                | (Drop, Completed)
                | (Active, Cancelled)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, RideStatus::Completed | RideStatus::Cancelled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RideStatus::Active => "active",
            RideStatus::Accepted => "accepted",
            RideStatus::Pickup => "pickup",
            RideStatus::Drop => "drop",
            RideStatus::Completed => "completed",
            RideStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for RideStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "payment_status", rename_all = "lowercase")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Paid,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

/// An address with its coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub address: String,
    pub coordinates: Coordinates,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feedback {
    pub rating: Option<i16>,
    pub comment: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Ride {
    pub id: Uuid,
    pub rider_id: Option<Uuid>,
    pub passenger_id: Option<Uuid>,
    pub pickup_location: Location,
    pub dropoff_location: Location,
    pub status: RideStatus,
    pub otp: Option<i32>,
    pub fare: Option<f64>,
    pub payment_status: PaymentStatus,
    pub feedback: Option<Feedback>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// A ride in a rider's history, with the passenger's permanent code.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RiderRide {
    #[serde(flatten)]
    pub ride: Ride,
    pub passenger_otp: Option<i32>,
}

/// Ride ready to be inserted.
#[derive(Debug, Clone)]
pub struct NewRide {
    pub id: Uuid,
    pub passenger_id: Uuid,
    pub pickup_location: Location,
    pub dropoff_location: Location,
}

/// Constraint on the ride's `rider_id` checked alongside the status guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RiderGuard {
    Any,
    Assigned,
    Is(Uuid),
}

impl RiderGuard {
    pub fn admits(self, rider_id: Option<Uuid>) -> bool {
        match self {
            RiderGuard::Any => true,
            RiderGuard::Assigned => rider_id.is_some(),
            RiderGuard::Is(id) => rider_id == Some(id),
        }
    }
}

/// Flat `rides` row as stored in Postgres.
#[derive(Debug, Clone, FromRow)]
pub struct RideRow {
    pub id: Uuid,
    pub rider_id: Option<Uuid>,
    pub passenger_id: Option<Uuid>,
    pub pickup_address: String,
    pub pickup_latitude: f64,
    pub pickup_longitude: f64,
    pub dropoff_address: String,
    pub dropoff_latitude: f64,
    pub dropoff_longitude: f64,
    pub status: RideStatus,
    pub otp: Option<i32>,
    pub fare: Option<f64>,
    pub payment_status: PaymentStatus,
    pub feedback_rating: Option<i16>,
    pub feedback_comment: Option<String>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl From<RideRow> for Ride {
    fn from(r: RideRow) -> Self {
        let feedback = match (r.feedback_rating, r.feedback_comment) {
            (None, None) => None,
            (rating, comment) => Some(Feedback { rating, comment }),
        };
        Self {
            id: r.id,
            rider_id: r.rider_id,
            passenger_id: r.passenger_id,
            pickup_location: Location {
                address: r.pickup_address,
                coordinates: Coordinates {
                    latitude: r.pickup_latitude,
                    longitude: r.pickup_longitude,
                },
            },
            dropoff_location: Location {
                address: r.dropoff_address,
                coordinates: Coordinates {
                    latitude: r.dropoff_latitude,
                    longitude: r.dropoff_longitude,
                },
            },
            status: r.status,
            otp: r.otp,
            fare: r.fare,
            payment_status: r.payment_status,
            feedback,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct RiderRideRow {
    #[sqlx(flatten)]
    pub ride: RideRow,
    pub passenger_otp: Option<i32>,
}

impl From<RiderRideRow> for RiderRide {
    fn from(r: RiderRideRow) -> Self {
        Self {
            ride: r.ride.into(),
            passenger_otp: r.passenger_otp,
        }
    }
}
