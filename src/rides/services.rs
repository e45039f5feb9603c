//! Ride lifecycle engine.
//!
//! Each operation ends in one conditional update against the ride store, so
//! two callers racing on the same ride cannot both win. Reads made before
//! that update only pick the error reported to the loser.

use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    auth::repo_types::{Role, User},
    error::{AppError, AppResult},
    otp,
    rides::repo_types::{
        Coordinates, Location, NewRide, Ride, RideStatus, RiderGuard, RiderRide,
    },
    state::AppState,
};

fn normalize_location(loc: Location, label: &str) -> AppResult<Location> {
    let address = loc.address.trim().to_string();
    if address.is_empty() {
        return Err(AppError::validation(format!(
            "Please provide the {label} location"
        )));
    }
    let Coordinates { latitude, longitude } = loc.coordinates;
    if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
        return Err(AppError::validation(format!(
            "Please provide a valid {label} latitude"
        )));
    }
    if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
        return Err(AppError::validation(format!(
            "Please provide a valid {label} longitude"
        )));
    }
    Ok(Location {
        address,
        coordinates: Coordinates { latitude, longitude },
    })
}

async fn find_with_role(state: &AppState, id: Uuid, role: Role) -> AppResult<Option<User>> {
    Ok(state
        .users
        .find_by_id(id)
        .await?
        .filter(|u| u.role() == role))
}

async fn ensure_passenger_free(state: &AppState, passenger_id: Uuid) -> AppResult<()> {
    if let Some(open) = state.rides.find_open_for_passenger(passenger_id).await? {
        warn!(%passenger_id, ride_id = %open.id, status = %open.status, "passenger already has an open ride");
        return Err(AppError::conflict(
            "You already have an active or accepted ride. Complete it before booking a new one.",
        ));
    }
    Ok(())
}

/// Apply `from -> to` if the ride is in `from` and `guard` holds.
/// Returns `None` when the guard did not match.
async fn advance(
    state: &AppState,
    ride_id: Uuid,
    from: RideStatus,
    to: RideStatus,
    guard: RiderGuard,
) -> AppResult<Option<Ride>> {
    if !from.can_advance_to(to) {
        return Err(AppError::Internal(anyhow::anyhow!(
            "illegal ride transition {from} -> {to}"
        )));
    }
    let ride = state.rides.transition(ride_id, from, to, guard).await?;
    match &ride {
        Some(r) => info!(
            ride_id = %r.id,
            %from,
            %to,
            terminal = to.is_terminal(),
            "ride status changed"
        ),
        None => warn!(%ride_id, %from, %to, "ride transition precondition not met"),
    }
    Ok(ride)
}

/// Try to attach the passenger to an unclaimed active ride on the same route.
async fn attach_to_existing(
    state: &AppState,
    passenger_id: Uuid,
    pickup: &Location,
    dropoff: &Location,
) -> AppResult<Option<Ride>> {
    let ride = state
        .rides
        .attach_passenger(&pickup.address, &dropoff.address, passenger_id, otp::generate())
        .await?;
    if let Some(r) = &ride {
        info!(ride_id = %r.id, %passenger_id, "passenger attached to existing ride");
    }
    Ok(ride)
}

/// Book a ride for the passenger: join an unclaimed ride on the same route
/// or create a new `active` one.
pub async fn request_ride(
    state: &AppState,
    passenger_id: Uuid,
    pickup: Location,
    dropoff: Location,
) -> AppResult<Ride> {
    let pickup = normalize_location(pickup, "pickup")?;
    let dropoff = normalize_location(dropoff, "drop-off")?;

    if find_with_role(state, passenger_id, Role::Passenger).await?.is_none() {
        return Err(AppError::not_found("Passenger not found"));
    }
    ensure_passenger_free(state, passenger_id).await?;

    if let Some(ride) = attach_to_existing(state, passenger_id, &pickup, &dropoff).await? {
        return Ok(ride);
    }

    let ride = state
        .rides
        .insert(NewRide {
            id: Uuid::new_v4(),
            passenger_id,
            pickup_location: pickup,
            dropoff_location: dropoff,
        })
        .await?;
    info!(ride_id = %ride.id, %passenger_id, "ride created");
    Ok(ride)
}

/// Match-only booking: join an unclaimed ride on the same route or fail.
/// Returns the assigned rider alongside the ride when there is one.
pub async fn search_ride(
    state: &AppState,
    passenger_id: Uuid,
    pickup: Location,
    dropoff: Location,
) -> AppResult<(Ride, Option<User>)> {
    let pickup = normalize_location(pickup, "pickup")?;
    let dropoff = normalize_location(dropoff, "drop-off")?;

    if find_with_role(state, passenger_id, Role::Passenger).await?.is_none() {
        return Err(AppError::not_found("Passenger not found"));
    }
    ensure_passenger_free(state, passenger_id).await?;

    let ride = attach_to_existing(state, passenger_id, &pickup, &dropoff)
        .await?
        .ok_or_else(|| AppError::not_found("No available riders found"))?;
    let rider = match ride.rider_id {
        Some(id) => state.users.find_by_id(id).await?,
        None => None,
    };
    Ok((ride, rider))
}

/// Assign the rider to an `active` ride and issue its OTP.
pub async fn claim_ride(state: &AppState, ride_id: Uuid, rider_id: Uuid) -> AppResult<Ride> {
    if find_with_role(state, rider_id, Role::Rider).await?.is_none() {
        return Err(AppError::not_found("Rider not found"));
    }
    if let Some(open) = state.rides.find_open_for_rider(rider_id).await? {
        warn!(%rider_id, ride_id = %open.id, "rider already has an open ride");
        return Err(AppError::conflict(
            "You already have an active ride. Complete it before accepting a new one.",
        ));
    }

    let ride = state
        .rides
        .claim(ride_id, rider_id, otp::generate())
        .await?
        .ok_or_else(|| {
            warn!(%ride_id, %rider_id, "claim lost or ride not claimable");
            AppError::not_found("Ride not found or already accepted")
        })?;
    info!(%ride_id, %rider_id, "ride accepted");
    Ok(ride)
}

/// `accepted -> pickup`, for a ride with a rider assigned.
pub async fn confirm_pickup(state: &AppState, ride_id: Uuid) -> AppResult<Ride> {
    if let Some(ride) = advance(
        state,
        ride_id,
        RideStatus::Accepted,
        RideStatus::Pickup,
        RiderGuard::Assigned,
    )
    .await?
    {
        return Ok(ride);
    }
    match state.rides.find(ride_id).await? {
        None => Err(AppError::not_found("Ride not found")),
        Some(_) => Err(AppError::validation(
            "Ride must be accepted and have a rider assigned to update to pickup",
        )),
    }
}

/// `pickup -> drop` once the rider enters the passenger's one-time code.
pub async fn verify_otp_and_drop(
    state: &AppState,
    ride_id: Uuid,
    rider_id: Uuid,
    entered_code: i32,
) -> AppResult<Ride> {
    let not_ready = || AppError::not_found("Ride not found or not ready for drop");

    let ride = state
        .rides
        .find(ride_id)
        .await?
        .filter(|r| r.status == RideStatus::Pickup && r.rider_id == Some(rider_id))
        .ok_or_else(not_ready)?;

    let passenger_code = match ride.passenger_id {
        Some(id) => state
            .users
            .find_by_id(id)
            .await?
            .and_then(|u| u.kind.one_time_code()),
        None => None,
    }
    .ok_or_else(|| AppError::not_found("Passenger not found"))?;

    if entered_code != passenger_code {
        warn!(%ride_id, %rider_id, "invalid OTP entered");
        return Err(AppError::auth("Invalid OTP"));
    }

    advance(
        state,
        ride_id,
        RideStatus::Pickup,
        RideStatus::Drop,
        RiderGuard::Is(rider_id),
    )
    .await?
    .ok_or_else(not_ready)
}

/// `drop -> completed`, by the assigned rider.
pub async fn complete_ride(state: &AppState, ride_id: Uuid, rider_id: Uuid) -> AppResult<Ride> {
    advance(
        state,
        ride_id,
        RideStatus::Drop,
        RideStatus::Completed,
        RiderGuard::Is(rider_id),
    )
    .await?
    .ok_or_else(|| AppError::not_found("Ride not found or not ready for completion"))
}

/// `active -> cancelled`.
pub async fn cancel_ride(state: &AppState, ride_id: Uuid) -> AppResult<Ride> {
    if let Some(ride) = advance(
        state,
        ride_id,
        RideStatus::Active,
        RideStatus::Cancelled,
        RiderGuard::Any,
    )
    .await?
    {
        return Ok(ride);
    }
    match state.rides.find(ride_id).await? {
        None => Err(AppError::not_found("Ride not found")),
        Some(_) => Err(AppError::validation("Only active rides can be cancelled")),
    }
}

pub async fn list_active_rides(state: &AppState) -> AppResult<Vec<Ride>> {
    Ok(state.rides.list_by_status(RideStatus::Active).await?)
}

pub async fn list_rider_history(state: &AppState, rider_id: Uuid) -> AppResult<Vec<RiderRide>> {
    Ok(state.rides.list_rider_history(rider_id).await?)
}

pub async fn list_passenger_rides(state: &AppState, passenger_id: Uuid) -> AppResult<Vec<Ride>> {
    Ok(state.rides.list_for_passenger(passenger_id).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        auth::{dto::RegisterRequest, services::register},
        config::AppConfig,
    };

    fn state() -> AppState {
        AppState::in_memory(AppConfig::ephemeral("test"))
    }

    fn loc(address: &str) -> Location {
        Location {
            address: address.into(),
            coordinates: Coordinates { latitude: 19.07, longitude: 72.87 },
        }
    }

    async fn passenger(st: &AppState, n: u32) -> User {
        register(
            st,
            RegisterRequest {
                name: Some(format!("Passenger {n}")),
                email: Some(format!("p{n}@example.com")),
                phone: Some(format!("+91-p{n}")),
                password: Some("secret1".into()),
                role: Some(Role::Passenger),
                license: None,
            },
        )
        .await
        .unwrap()
    }

    async fn rider(st: &AppState, n: u32) -> User {
        register(
            st,
            RegisterRequest {
                name: Some(format!("Rider {n}")),
                email: Some(format!("r{n}@example.com")),
                phone: Some(format!("+91-r{n}")),
                password: Some("secret1".into()),
                role: Some(Role::Rider),
                license: Some(format!("DL{n}")),
            },
        )
        .await
        .unwrap()
    }

    async fn status_of(st: &AppState, ride_id: Uuid) -> RideStatus {
        st.rides.find(ride_id).await.unwrap().unwrap().status
    }

    #[tokio::test]
    async fn full_lifecycle() {
        let st = state();
        let p = passenger(&st, 1).await;
        let r = rider(&st, 1).await;

        let ride = request_ride(&st, p.id, loc("A"), loc("B")).await.unwrap();
        assert_eq!(ride.status, RideStatus::Active);
        assert_eq!(ride.passenger_id, Some(p.id));
        assert_eq!(ride.rider_id, None);

        let ride = claim_ride(&st, ride.id, r.id).await.unwrap();
        assert_eq!(ride.status, RideStatus::Accepted);
        assert_eq!(ride.rider_id, Some(r.id));
        assert!(ride.otp.is_some_and(otp::is_valid));

        let ride = confirm_pickup(&st, ride.id).await.unwrap();
        assert_eq!(ride.status, RideStatus::Pickup);

        let code = p.kind.one_time_code().unwrap();
        let ride = verify_otp_and_drop(&st, ride.id, r.id, code).await.unwrap();
        assert_eq!(ride.status, RideStatus::Drop);

        let ride = complete_ride(&st, ride.id, r.id).await.unwrap();
        assert_eq!(ride.status, RideStatus::Completed);
    }

    #[tokio::test]
    async fn concurrent_claims_have_one_winner() {
        let st = state();
        let p = passenger(&st, 1).await;
        let r1 = rider(&st, 1).await;
        let r2 = rider(&st, 2).await;
        let ride = request_ride(&st, p.id, loc("A"), loc("B")).await.unwrap();

        let (a, b) = tokio::join!(
            claim_ride(&st, ride.id, r1.id),
            claim_ride(&st, ride.id, r2.id)
        );
        let wins = [a.is_ok(), b.is_ok()].iter().filter(|w| **w).count();
        assert_eq!(wins, 1);
        let loser = if a.is_ok() { b } else { a };
        assert!(matches!(loser, Err(AppError::NotFound(_))));

        let stored = st.rides.find(ride.id).await.unwrap().unwrap();
        assert!(stored.rider_id == Some(r1.id) || stored.rider_id == Some(r2.id));
        assert_eq!(stored.status, RideStatus::Accepted);
    }

    #[tokio::test]
    async fn passenger_cannot_hold_two_open_rides() {
        let st = state();
        let p = passenger(&st, 1).await;
        request_ride(&st, p.id, loc("A"), loc("B")).await.unwrap();

        let err = request_ride(&st, p.id, loc("C"), loc("D")).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        assert_eq!(list_passenger_rides(&st, p.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn concurrent_bookings_by_one_passenger_create_one_ride() {
        let st = state();
        let p = passenger(&st, 1).await;
        let (a, b) = tokio::join!(
            request_ride(&st, p.id, loc("A"), loc("B")),
            request_ride(&st, p.id, loc("C"), loc("D"))
        );
        assert_eq!([a.is_ok(), b.is_ok()].iter().filter(|w| **w).count(), 1);
        assert_eq!(list_passenger_rides(&st, p.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unknown_or_wrong_role_passenger_is_not_found() {
        let st = state();
        let r = rider(&st, 1).await;
        for id in [Uuid::new_v4(), r.id] {
            let err = request_ride(&st, id, loc("A"), loc("B")).await.unwrap_err();
            assert!(matches!(err, AppError::NotFound(_)));
        }
    }

    #[tokio::test]
    async fn invalid_locations_are_rejected() {
        let st = state();
        let p = passenger(&st, 1).await;
        let err = request_ride(&st, p.id, loc("   "), loc("B")).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let mut bad = loc("B");
        bad.coordinates.latitude = 91.0;
        let err = request_ride(&st, p.id, loc("A"), bad).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn booking_joins_unclaimed_ride_on_same_route() {
        let store = crate::memory::MemoryStore::new();
        let st = AppState::from_memory(AppConfig::ephemeral("test"), store.clone());
        let p1 = passenger(&st, 1).await;
        let p2 = passenger(&st, 2).await;
        let now = time::OffsetDateTime::now_utc();

        // A rider-posted ride with no passenger yet.
        let open = Ride {
            id: Uuid::new_v4(),
            rider_id: None,
            passenger_id: None,
            pickup_location: loc("A"),
            dropoff_location: loc("B"),
            status: RideStatus::Active,
            otp: None,
            fare: None,
            payment_status: Default::default(),
            feedback: None,
            created_at: now,
            updated_at: now,
        };
        store.seed_ride(open.clone()).await;

        let joined = request_ride(&st, p1.id, loc(" A "), loc("B")).await.unwrap();
        assert_eq!(joined.id, open.id);
        assert_eq!(joined.status, RideStatus::Accepted);
        assert_eq!(joined.passenger_id, Some(p1.id));
        assert!(joined.otp.is_some());

        let fresh = request_ride(&st, p2.id, loc("A"), loc("B")).await.unwrap();
        assert_ne!(fresh.id, open.id);
        assert_eq!(fresh.status, RideStatus::Active);
    }

    #[tokio::test]
    async fn search_without_match_is_not_found() {
        let st = state();
        let p = passenger(&st, 1).await;
        let err = search_ride(&st, p.id, loc("A"), loc("B")).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(ref m) if m == "No available riders found"));
        assert!(list_passenger_rides(&st, p.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn search_matches_rider_posted_ride() {
        let store = crate::memory::MemoryStore::new();
        let st = AppState::from_memory(AppConfig::ephemeral("test"), store.clone());
        let p = passenger(&st, 1).await;
        let r = rider(&st, 1).await;
        let now = time::OffsetDateTime::now_utc();
        let posted = Ride {
            id: Uuid::new_v4(),
            rider_id: Some(r.id),
            passenger_id: None,
            pickup_location: loc("A"),
            dropoff_location: loc("B"),
            status: RideStatus::Active,
            otp: None,
            fare: None,
            payment_status: Default::default(),
            feedback: None,
            created_at: now,
            updated_at: now,
        };
        store.seed_ride(posted.clone()).await;

        let (ride, matched) = search_ride(&st, p.id, loc("A"), loc("B")).await.unwrap();
        assert_eq!(ride.id, posted.id);
        assert_eq!(ride.status, RideStatus::Accepted);
        assert_eq!(ride.passenger_id, Some(p.id));
        assert!(ride.otp.is_some_and(otp::is_valid));
        assert_eq!(matched.as_ref().map(|u| u.id), Some(r.id));

        let details = serde_json::to_value(crate::rides::dto::RideDetails::new(ride, matched))
            .unwrap();
        assert_eq!(details["status"], "accepted");
        assert_eq!(details["riderName"], "Rider 1");
        assert_eq!(details["riderEmail"], "r1@example.com");
        assert_eq!(details["riderPhone"], "+91-r1");

        // the joined ride now blocks further bookings
        let err = request_ride(&st, p.id, loc("C"), loc("D")).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn search_with_open_ride_conflicts() {
        let st = state();
        let p = passenger(&st, 1).await;
        request_ride(&st, p.id, loc("A"), loc("B")).await.unwrap();

        let err = search_ride(&st, p.id, loc("A"), loc("B")).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        assert_eq!(list_passenger_rides(&st, p.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn rider_with_open_ride_cannot_claim_another() {
        let st = state();
        let p1 = passenger(&st, 1).await;
        let p2 = passenger(&st, 2).await;
        let r = rider(&st, 1).await;
        let first = request_ride(&st, p1.id, loc("A"), loc("B")).await.unwrap();
        let second = request_ride(&st, p2.id, loc("C"), loc("D")).await.unwrap();

        claim_ride(&st, first.id, r.id).await.unwrap();
        let err = claim_ride(&st, second.id, r.id).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        assert_eq!(status_of(&st, second.id).await, RideStatus::Active);
    }

    #[tokio::test]
    async fn claim_by_unknown_rider_or_of_unknown_ride_is_not_found() {
        let st = state();
        let p = passenger(&st, 1).await;
        let r = rider(&st, 1).await;
        let ride = request_ride(&st, p.id, loc("A"), loc("B")).await.unwrap();

        let err = claim_ride(&st, ride.id, p.id).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(ref m) if m == "Rider not found"));

        let err = claim_ride(&st, Uuid::new_v4(), r.id).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn out_of_order_transitions_fail_and_leave_status() {
        let st = state();
        let p = passenger(&st, 1).await;
        let r = rider(&st, 1).await;
        let code = p.kind.one_time_code().unwrap();
        let ride = request_ride(&st, p.id, loc("A"), loc("B")).await.unwrap();

        // active: pickup, drop and complete are all premature
        assert!(matches!(confirm_pickup(&st, ride.id).await, Err(AppError::Validation(_))));
        assert!(matches!(
            verify_otp_and_drop(&st, ride.id, r.id, code).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(complete_ride(&st, ride.id, r.id).await, Err(AppError::NotFound(_))));
        assert_eq!(status_of(&st, ride.id).await, RideStatus::Active);

        claim_ride(&st, ride.id, r.id).await.unwrap();
        assert!(matches!(complete_ride(&st, ride.id, r.id).await, Err(AppError::NotFound(_))));
        assert!(matches!(cancel_ride(&st, ride.id).await, Err(AppError::Validation(_))));
        assert_eq!(status_of(&st, ride.id).await, RideStatus::Accepted);

        confirm_pickup(&st, ride.id).await.unwrap();
        assert!(matches!(confirm_pickup(&st, ride.id).await, Err(AppError::Validation(_))));
        assert!(matches!(complete_ride(&st, ride.id, r.id).await, Err(AppError::NotFound(_))));
        assert_eq!(status_of(&st, ride.id).await, RideStatus::Pickup);
    }

    #[tokio::test]
    async fn drop_requires_passenger_code_and_assigned_rider() {
        let st = state();
        let p = passenger(&st, 1).await;
        let r = rider(&st, 1).await;
        let other = rider(&st, 2).await;
        let code = p.kind.one_time_code().unwrap();
        let ride = request_ride(&st, p.id, loc("A"), loc("B")).await.unwrap();
        claim_ride(&st, ride.id, r.id).await.unwrap();
        confirm_pickup(&st, ride.id).await.unwrap();

        let wrong = if code == otp::CODE_MAX { otp::CODE_MIN } else { code + 1 };
        assert!(matches!(
            verify_otp_and_drop(&st, ride.id, r.id, wrong).await,
            Err(AppError::Auth(_))
        ));
        assert!(matches!(
            verify_otp_and_drop(&st, ride.id, other.id, code).await,
            Err(AppError::NotFound(_))
        ));
        assert_eq!(status_of(&st, ride.id).await, RideStatus::Pickup);

        verify_otp_and_drop(&st, ride.id, r.id, code).await.unwrap();
        assert!(matches!(
            complete_ride(&st, ride.id, other.id).await,
            Err(AppError::NotFound(_))
        ));
        assert_eq!(status_of(&st, ride.id).await, RideStatus::Drop);
    }

    #[tokio::test]
    async fn cancel_only_from_active() {
        let st = state();
        let p = passenger(&st, 1).await;
        let ride = request_ride(&st, p.id, loc("A"), loc("B")).await.unwrap();

        let cancelled = cancel_ride(&st, ride.id).await.unwrap();
        assert_eq!(cancelled.status, RideStatus::Cancelled);
        assert!(matches!(cancel_ride(&st, ride.id).await, Err(AppError::Validation(_))));
        assert!(matches!(
            cancel_ride(&st, Uuid::new_v4()).await,
            Err(AppError::NotFound(_))
        ));

        // a cancelled ride no longer blocks booking
        request_ride(&st, p.id, loc("A"), loc("B")).await.unwrap();
    }

    #[tokio::test]
    async fn listings() {
        let st = state();
        let p1 = passenger(&st, 1).await;
        let p2 = passenger(&st, 2).await;
        let r = rider(&st, 1).await;
        let first = request_ride(&st, p1.id, loc("A"), loc("B")).await.unwrap();
        let second = request_ride(&st, p2.id, loc("C"), loc("D")).await.unwrap();

        let active: Vec<Uuid> = list_active_rides(&st).await.unwrap().iter().map(|r| r.id).collect();
        assert_eq!(active.len(), 2);
        assert!(active.contains(&first.id) && active.contains(&second.id));

        claim_ride(&st, first.id, r.id).await.unwrap();
        let active = list_active_rides(&st).await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, second.id);

        let history = list_rider_history(&st, r.id).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].ride.id, first.id);
        assert_eq!(history[0].passenger_otp, p1.kind.one_time_code());

        cancel_ride(&st, second.id).await.unwrap();
        let third = request_ride(&st, p2.id, loc("E"), loc("F")).await.unwrap();
        let mine = list_passenger_rides(&st, p2.id).await.unwrap();
        assert_eq!(mine.len(), 2);
        assert_eq!(mine[0].id, third.id, "newest first");
        assert_eq!(mine[1].id, second.id);
    }
}
