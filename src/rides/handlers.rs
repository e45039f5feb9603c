use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Path, State,
    },
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use tracing::{instrument, Span};
use uuid::Uuid;

use crate::{
    auth::{dto::MessageResponse, extractors::AuthUser, repo_types::Role},
    error::{AppError, AppResult},
    rides::{
        dto::{
            BookRideRequest, DropRequest, RideDetails, RideDetailsResponse, RideResponse,
            RidesResponse,
        },
        repo_types::{Location, Ride, RiderRide},
        services,
    },
    state::AppState,
};

// --- public routers ---

/// Booking routes; the passenger is named in the body.
pub fn booking_routes() -> Router<AppState> {
    Router::new()
        .route("/ride/search-rider", post(search_rider))
        .route("/ride/book-ride", post(book_ride))
}

/// Token-authenticated lifecycle routes.
pub fn lifecycle_routes() -> Router<AppState> {
    Router::new()
        .route("/ride/my-rides", get(my_rides))
        .route("/ride/active", get(active_rides))
        .route("/ride/history/:rider_id", get(rider_history))
        .route("/ride/cancel/:id", put(cancel_ride))
        .route("/ride/accept/:ride_id", put(accept_ride))
        .route("/ride/pickup/:ride_id", put(pickup_passenger))
        .route("/ride/drop/:ride_id", put(drop_passenger))
        .route("/ride/complete/:ride_id", put(complete_ride))
}

// --- handlers ---

fn booking_parts(body: BookRideRequest) -> AppResult<(Uuid, Location, Location)> {
    let passenger_id = body
        .passenger_id
        .ok_or_else(|| AppError::validation("passengerId is required"))?;
    let pickup = body
        .pickup_location
        .ok_or_else(|| AppError::validation("Please provide the pickup location"))?;
    let dropoff = body
        .dropoff_location
        .ok_or_else(|| AppError::validation("Please provide the drop-off location"))?;
    Ok((passenger_id, pickup, dropoff))
}

/// Parse the ride id and record it on the handler span.
fn ride_id_from(path: Result<Path<Uuid>, PathRejection>) -> AppResult<Uuid> {
    let Path(ride_id) = path?;
    Span::current().record("ride_id", tracing::field::display(ride_id));
    Ok(ride_id)
}

fn ride_response(ride: Ride, message: &str) -> Json<RideResponse> {
    Json(RideResponse {
        success: true,
        message: message.into(),
        ride,
    })
}

#[instrument(skip(state, body))]
pub async fn book_ride(
    State(state): State<AppState>,
    body: Result<Json<BookRideRequest>, JsonRejection>,
) -> AppResult<(StatusCode, Json<RideDetailsResponse>)> {
    let Json(body) = body?;
    let (passenger_id, pickup, dropoff) = booking_parts(body)?;
    let ride = services::request_ride(&state, passenger_id, pickup, dropoff).await?;
    Ok((
        StatusCode::CREATED,
        Json(RideDetailsResponse {
            success: true,
            message: "Ride booked successfully".into(),
            ride_details: RideDetails::new(ride, None),
        }),
    ))
}

#[instrument(skip(state, body))]
pub async fn search_rider(
    State(state): State<AppState>,
    body: Result<Json<BookRideRequest>, JsonRejection>,
) -> AppResult<Json<RideDetailsResponse>> {
    let Json(body) = body?;
    let (passenger_id, pickup, dropoff) = booking_parts(body)?;
    let (ride, rider) = services::search_ride(&state, passenger_id, pickup, dropoff).await?;
    Ok(Json(RideDetailsResponse {
        success: true,
        message: "Matched rider found and passenger added".into(),
        ride_details: RideDetails::new(ride, rider),
    }))
}

#[instrument(skip(state), fields(user_id = %auth.id))]
pub async fn my_rides(
    State(state): State<AppState>,
    auth: AuthUser,
) -> AppResult<Json<RidesResponse<Ride>>> {
    auth.authorize(&[Role::Passenger])?;
    let rides = services::list_passenger_rides(&state, auth.id).await?;
    Ok(Json(RidesResponse { success: true, rides }))
}

#[instrument(skip(state), fields(user_id = %auth.id))]
pub async fn active_rides(
    State(state): State<AppState>,
    auth: AuthUser,
) -> AppResult<Json<RidesResponse<Ride>>> {
    auth.authorize(&[Role::Rider])?;
    let rides = services::list_active_rides(&state).await?;
    Ok(Json(RidesResponse { success: true, rides }))
}

#[instrument(skip(state, path), fields(user_id = %auth.id))]
pub async fn rider_history(
    State(state): State<AppState>,
    auth: AuthUser,
    path: Result<Path<Uuid>, PathRejection>,
) -> AppResult<Json<RidesResponse<RiderRide>>> {
    auth.authorize(&[Role::Rider])?;
    let Path(rider_id) = path?;
    // Owner only: entries carry passengers' codes.
    if rider_id != auth.id {
        return Err(AppError::forbidden("You can only view your own ride history"));
    }
    let rides = services::list_rider_history(&state, rider_id).await?;
    Ok(Json(RidesResponse { success: true, rides }))
}

#[instrument(skip(state, path), fields(user_id = %auth.id, ride_id = tracing::field::Empty))]
pub async fn cancel_ride(
    State(state): State<AppState>,
    auth: AuthUser,
    path: Result<Path<Uuid>, PathRejection>,
) -> AppResult<Json<MessageResponse>> {
    auth.authorize(&[Role::Passenger, Role::Rider])?;
    let id = ride_id_from(path)?;
    services::cancel_ride(&state, id).await?;
    Ok(Json(MessageResponse {
        success: true,
        message: "Ride cancelled successfully".into(),
    }))
}

#[instrument(skip(state, path), fields(user_id = %auth.id, ride_id = tracing::field::Empty))]
pub async fn accept_ride(
    State(state): State<AppState>,
    auth: AuthUser,
    path: Result<Path<Uuid>, PathRejection>,
) -> AppResult<Json<RideResponse>> {
    auth.authorize(&[Role::Rider])?;
    let ride_id = ride_id_from(path)?;
    let ride = services::claim_ride(&state, ride_id, auth.id).await?;
    Ok(ride_response(ride, "Ride accepted successfully"))
}

#[instrument(skip(state, path), fields(user_id = %auth.id, ride_id = tracing::field::Empty))]
pub async fn pickup_passenger(
    State(state): State<AppState>,
    auth: AuthUser,
    path: Result<Path<Uuid>, PathRejection>,
) -> AppResult<Json<RideResponse>> {
    auth.authorize(&[Role::Rider])?;
    let ride_id = ride_id_from(path)?;
    let ride = services::confirm_pickup(&state, ride_id).await?;
    Ok(ride_response(ride, "Passenger picked up"))
}

#[instrument(skip(state, path, body), fields(user_id = %auth.id, ride_id = tracing::field::Empty))]
pub async fn drop_passenger(
    State(state): State<AppState>,
    auth: AuthUser,
    path: Result<Path<Uuid>, PathRejection>,
    body: Result<Json<DropRequest>, JsonRejection>,
) -> AppResult<Json<RideResponse>> {
    auth.authorize(&[Role::Rider])?;
    let ride_id = ride_id_from(path)?;
    let Json(body) = body?;
    let code = body
        .otp
        .ok_or_else(|| AppError::validation("OTP is required"))?;
    let ride = services::verify_otp_and_drop(&state, ride_id, auth.id, code).await?;
    Ok(ride_response(ride, "Passenger dropped off"))
}

#[instrument(skip(state, path), fields(user_id = %auth.id, ride_id = tracing::field::Empty))]
pub async fn complete_ride(
    State(state): State<AppState>,
    auth: AuthUser,
    path: Result<Path<Uuid>, PathRejection>,
) -> AppResult<Json<RideResponse>> {
    auth.authorize(&[Role::Rider])?;
    let ride_id = ride_id_from(path)?;
    let ride = services::complete_ride(&state, ride_id, auth.id).await?;
    Ok(ride_response(ride, "Ride marked as completed"))
}
