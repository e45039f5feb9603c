//! In-memory user and ride store.
//!
//! Mirrors the Postgres schema's constraints so the lifecycle engine behaves
//! the same against either backend. Each conditional update runs under one
//! write lock.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{
    auth::{
        repo::UserStore,
        repo_types::{NewUser, ProfileChanges, User, UserKind},
    },
    error::{StoreError, StoreResult, UniqueField},
    rides::{
        repo::RideStore,
        repo_types::{NewRide, PaymentStatus, Ride, RideStatus, RiderGuard, RiderRide},
    },
};

#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    users: Arc<RwLock<HashMap<Uuid, User>>>,
    rides: Arc<RwLock<HashMap<Uuid, Ride>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a ride record as-is, bypassing the booking rules.
    #[cfg(test)]
    pub(crate) async fn seed_ride(&self, ride: Ride) {
        self.rides.write().await.insert(ride.id, ride);
    }
}

fn newest_first(rides: &mut [Ride]) {
    rides.sort_by(|a, b| b.created_at.cmp(&a.created_at));
}

fn passenger_has_open_ride(rides: &HashMap<Uuid, Ride>, passenger_id: Uuid) -> bool {
    rides.values().any(|r| {
        r.passenger_id == Some(passenger_id) && RideStatus::PASSENGER_OPEN.contains(&r.status)
    })
}

fn rider_has_open_ride(rides: &HashMap<Uuid, Ride>, rider_id: Uuid) -> bool {
    rides
        .values()
        .any(|r| r.rider_id == Some(rider_id) && RideStatus::RIDER_OPEN.contains(&r.status))
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn create(&self, user: NewUser) -> StoreResult<User> {
        let mut users = self.users.write().await;
        for existing in users.values() {
            if existing.email == user.email {
                return Err(StoreError::Duplicate(UniqueField::Email));
            }
            if existing.phone == user.phone {
                return Err(StoreError::Duplicate(UniqueField::Phone));
            }
            match (&existing.kind, &user.kind) {
                (UserKind::Rider { license: a }, UserKind::Rider { license: b }) if a == b => {
                    return Err(StoreError::Duplicate(UniqueField::License));
                }
                (
                    UserKind::Passenger { one_time_code: a },
                    UserKind::Passenger { one_time_code: b },
                ) if a == b => {
                    return Err(StoreError::Duplicate(UniqueField::OneTimeCode));
                }
                _ => {}
            }
        }
        let now = OffsetDateTime::now_utc();
        let created = User {
            id: user.id,
            name: user.name,
            email: user.email,
            phone: user.phone,
            password_hash: user.password_hash,
            kind: user.kind,
            created_at: now,
            updated_at: now,
        };
        users.insert(created.id, created.clone());
        Ok(created)
    }

    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<User>> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let users = self.users.read().await;
        Ok(users.values().find(|u| u.email == email).cloned())
    }

    async fn code_taken(&self, code: i32) -> StoreResult<bool> {
        let users = self.users.read().await;
        Ok(users.values().any(|u| u.kind.one_time_code() == Some(code)))
    }

    async fn update_profile(
        &self,
        id: Uuid,
        changes: ProfileChanges,
    ) -> StoreResult<Option<User>> {
        let mut users = self.users.write().await;
        if let (Some(new_license), true) = (&changes.license, users.contains_key(&id)) {
            let clash = users
                .values()
                .any(|u| u.id != id && u.kind.license() == Some(new_license.as_str()));
            if clash {
                return Err(StoreError::Duplicate(UniqueField::License));
            }
        }
        let Some(user) = users.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(name) = changes.name {
            user.name = name;
        }
        if let Some(hash) = changes.password_hash {
            user.password_hash = hash;
        }
        if let (Some(new_license), UserKind::Rider { license }) = (changes.license, &mut user.kind)
        {
            *license = new_license;
        }
        user.updated_at = OffsetDateTime::now_utc();
        Ok(Some(user.clone()))
    }
}

#[async_trait]
impl RideStore for MemoryStore {
    async fn insert(&self, ride: NewRide) -> StoreResult<Ride> {
        let mut rides = self.rides.write().await;
        if passenger_has_open_ride(&rides, ride.passenger_id) {
            return Err(StoreError::Duplicate(UniqueField::PassengerOpenRide));
        }
        let now = OffsetDateTime::now_utc();
        let created = Ride {
            id: ride.id,
            rider_id: None,
            passenger_id: Some(ride.passenger_id),
            pickup_location: ride.pickup_location,
            dropoff_location: ride.dropoff_location,
            status: RideStatus::Active,
            otp: None,
            fare: None,
            payment_status: PaymentStatus::Pending,
            feedback: None,
            created_at: now,
            updated_at: now,
        };
        rides.insert(created.id, created.clone());
        Ok(created)
    }

    async fn find(&self, id: Uuid) -> StoreResult<Option<Ride>> {
        Ok(self.rides.read().await.get(&id).cloned())
    }

    async fn find_open_for_passenger(&self, passenger_id: Uuid) -> StoreResult<Option<Ride>> {
        let rides = self.rides.read().await;
        Ok(rides
            .values()
            .find(|r| {
                r.passenger_id == Some(passenger_id)
                    && RideStatus::PASSENGER_OPEN.contains(&r.status)
            })
            .cloned())
    }

    async fn find_open_for_rider(&self, rider_id: Uuid) -> StoreResult<Option<Ride>> {
        let rides = self.rides.read().await;
        Ok(rides
            .values()
            .find(|r| r.rider_id == Some(rider_id) && RideStatus::RIDER_OPEN.contains(&r.status))
            .cloned())
    }

    async fn attach_passenger(
        &self,
        pickup_address: &str,
        dropoff_address: &str,
        passenger_id: Uuid,
        otp: i32,
    ) -> StoreResult<Option<Ride>> {
        let mut rides = self.rides.write().await;
        let candidate = rides
            .values()
            .filter(|r| {
                r.status == RideStatus::Active
                    && r.passenger_id.is_none()
                    && r.pickup_location.address == pickup_address
                    && r.dropoff_location.address == dropoff_address
            })
            .min_by_key(|r| r.created_at)
            .map(|r| r.id);
        let Some(id) = candidate else {
            return Ok(None);
        };
        if passenger_has_open_ride(&rides, passenger_id) {
            return Err(StoreError::Duplicate(UniqueField::PassengerOpenRide));
        }
        if let Some(rider_id) = rides.get(&id).and_then(|r| r.rider_id) {
            if rider_has_open_ride(&rides, rider_id) {
                return Err(StoreError::Duplicate(UniqueField::RiderOpenRide));
            }
        }
        let Some(ride) = rides.get_mut(&id) else {
            return Ok(None);
        };
        ride.passenger_id = Some(passenger_id);
        ride.status = RideStatus::Accepted;
        ride.otp = Some(otp);
        ride.updated_at = OffsetDateTime::now_utc();
        Ok(Some(ride.clone()))
    }

    async fn claim(&self, ride_id: Uuid, rider_id: Uuid, otp: i32) -> StoreResult<Option<Ride>> {
        let mut rides = self.rides.write().await;
        let claimable = rides
            .get(&ride_id)
            .is_some_and(|r| r.status == RideStatus::Active && r.rider_id.is_none());
        if !claimable {
            return Ok(None);
        }
        if rider_has_open_ride(&rides, rider_id) {
            return Err(StoreError::Duplicate(UniqueField::RiderOpenRide));
        }
        let Some(ride) = rides.get_mut(&ride_id) else {
            return Ok(None);
        };
        ride.rider_id = Some(rider_id);
        ride.status = RideStatus::Accepted;
        ride.otp = Some(otp);
        ride.updated_at = OffsetDateTime::now_utc();
        Ok(Some(ride.clone()))
    }

    async fn transition(
        &self,
        ride_id: Uuid,
        from: RideStatus,
        to: RideStatus,
        guard: RiderGuard,
    ) -> StoreResult<Option<Ride>> {
        let mut rides = self.rides.write().await;
        let Some(ride) = rides.get_mut(&ride_id) else {
            return Ok(None);
        };
        if ride.status != from || !guard.admits(ride.rider_id) {
            return Ok(None);
        }
        ride.status = to;
        ride.updated_at = OffsetDateTime::now_utc();
        Ok(Some(ride.clone()))
    }

    async fn list_by_status(&self, status: RideStatus) -> StoreResult<Vec<Ride>> {
        let rides = self.rides.read().await;
        let mut out: Vec<Ride> = rides.values().filter(|r| r.status == status).cloned().collect();
        newest_first(&mut out);
        Ok(out)
    }

    async fn list_rider_history(&self, rider_id: Uuid) -> StoreResult<Vec<RiderRide>> {
        let mut matched: Vec<Ride> = {
            let rides = self.rides.read().await;
            rides
                .values()
                .filter(|r| {
                    r.rider_id == Some(rider_id) && RideStatus::RIDER_HISTORY.contains(&r.status)
                })
                .cloned()
                .collect()
        };
        newest_first(&mut matched);
        let users = self.users.read().await;
        Ok(matched
            .into_iter()
            .map(|ride| {
                let passenger_otp = ride
                    .passenger_id
                    .and_then(|id| users.get(&id))
                    .and_then(|u| u.kind.one_time_code());
                RiderRide { ride, passenger_otp }
            })
            .collect())
    }

    async fn list_for_passenger(&self, passenger_id: Uuid) -> StoreResult<Vec<Ride>> {
        let rides = self.rides.read().await;
        let mut out: Vec<Ride> = rides
            .values()
            .filter(|r| r.passenger_id == Some(passenger_id))
            .cloned()
            .collect();
        newest_first(&mut out);
        Ok(out)
    }
}
