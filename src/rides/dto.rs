use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    auth::repo_types::User,
    rides::repo_types::{Location, Ride, RideStatus},
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookRideRequest {
    pub pickup_location: Option<Location>,
    pub dropoff_location: Option<Location>,
    pub passenger_id: Option<Uuid>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DropRequest {
    pub otp: Option<i32>,
}

/// Summary returned after booking or matching a ride.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RideDetails {
    pub ride_id: Uuid,
    pub pickup_location: Location,
    pub dropoff_location: Location,
    pub status: RideStatus,
    pub passenger_id: Option<Uuid>,
    pub rider_id: Option<Uuid>,
    pub otp: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rider_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rider_email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rider_phone: Option<String>,
}

impl RideDetails {
    pub fn new(ride: Ride, rider: Option<User>) -> Self {
        let (rider_name, rider_email, rider_phone) = match rider {
            Some(u) => (Some(u.name), Some(u.email), Some(u.phone)),
            None => (None, None, None),
        };
        Self {
            ride_id: ride.id,
            pickup_location: ride.pickup_location,
            dropoff_location: ride.dropoff_location,
            status: ride.status,
            passenger_id: ride.passenger_id,
            rider_id: ride.rider_id,
            otp: ride.otp,
            rider_name,
            rider_email,
            rider_phone,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RideDetailsResponse {
    pub success: bool,
    pub message: String,
    pub ride_details: RideDetails,
}

#[derive(Debug, Serialize)]
pub struct RideResponse {
    pub success: bool,
    pub message: String,
    pub ride: Ride,
}

#[derive(Debug, Serialize)]
pub struct RidesResponse<T> {
    pub success: bool,
    pub rides: Vec<T>,
}
