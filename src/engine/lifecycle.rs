//! Offer and trip lifecycle as one explicit state machine.
//!
//! [`OfferLifecycle::apply`] is the only way state changes. It never touches
//! timers or the network; it returns [`Effect`]s that the runtime executes,
//! and results of those effects come back in as further [`Action`]s.

use std::collections::HashSet;
use std::mem;

use serde::Serialize;
use thiserror::Error;

use crate::engine::progress::check_transition;
use crate::geo::within_radius_m;
use crate::models::driver::GeoPoint;
use crate::models::event::{DriverEvent, OfferResolution};
use crate::models::offer::Offer;
use crate::models::trip::{Trip, TripStatus};

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum Phase {
    Offline,
    Idle,
    OfferShown {
        offer: Offer,
        remaining_secs: u32,
    },
    Accepting {
        offer: Offer,
    },
    TripActive {
        trip: Trip,
        #[serde(skip)]
        arrival_requested: bool,
    },
}

impl Phase {
    pub fn name(&self) -> &'static str {
        match self {
            Phase::Offline => "offline",
            Phase::Idle => "idle",
            Phase::OfferShown { .. } => "offer_shown",
            Phase::Accepting { .. } => "accepting",
            Phase::TripActive { .. } => "trip_active",
        }
    }
}

#[derive(Debug, Clone)]
pub enum Action {
    GoOnline,
    GoOffline,
    PollTick,
    OffersFetched(Vec<Offer>),
    CountdownTick,
    Accept,
    Decline,
    AcceptSucceeded(Trip),
    AcceptFailed,
    AdvanceTrip {
        status: TripStatus,
        pin: Option<String>,
    },
    TripUpdated(Trip),
    TripUpdateFailed,
    LocationChanged(GeoPoint),
    RouteSynced(Option<Trip>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    PersistAvailability(bool),
    StartPolling,
    /// Restart polling with the first fetch one full interval away.
    ResumePolling,
    StopPolling,
    FetchOffers,
    StartCountdown,
    StopCountdown,
    SubmitAccept(Offer),
    RequestTripStatus {
        trip_id: String,
        status: TripStatus,
        pin: Option<String>,
    },
    PublishLocation(GeoPoint),
    Emit(DriverEvent),
}

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("no offer is currently shown")]
    NoOffer,

    #[error("no trip is active")]
    NoActiveTrip,

    #[error("a trip is in progress")]
    TripInProgress,

    #[error("cannot move trip from {} to {}", from.as_str(), to.as_str())]
    InvalidTransition { from: TripStatus, to: TripStatus },

    #[error("delivery pin is required to complete")]
    PinRequired,

    #[error("delivery pin does not match")]
    PinMismatch,
}

#[derive(Debug, Clone, Serialize)]
pub struct DriverSnapshot {
    pub online: bool,
    #[serde(flatten)]
    pub phase: Phase,
    pub declined_offers: usize,
    pub location: Option<GeoPoint>,
}

#[derive(Debug)]
pub struct OfferLifecycle {
    phase: Phase,
    declined: HashSet<String>,
    location: Option<GeoPoint>,
    countdown_secs: u32,
    arrival_radius_m: f64,
}

impl OfferLifecycle {
    pub fn new(countdown_secs: u32, arrival_radius_m: f64) -> Self {
        Self {
            phase: Phase::Offline,
            declined: HashSet::new(),
            location: None,
            countdown_secs,
            arrival_radius_m,
        }
    }

    pub fn phase(&self) -> &Phase {
        &self.phase
    }

    pub fn is_online(&self) -> bool {
        !matches!(self.phase, Phase::Offline)
    }

    pub fn is_declined(&self, offer_id: &str) -> bool {
        self.declined.contains(offer_id)
    }

    pub fn location(&self) -> Option<GeoPoint> {
        self.location
    }

    pub fn snapshot(&self) -> DriverSnapshot {
        DriverSnapshot {
            online: self.is_online(),
            phase: self.phase.clone(),
            declined_offers: self.declined.len(),
            location: self.location,
        }
    }

    pub fn apply(&mut self, action: Action) -> Result<Vec<Effect>, LifecycleError> {
        match action {
            Action::GoOnline => Ok(self.go_online()),
            Action::GoOffline => self.go_offline(),
            Action::PollTick => Ok(self.poll_tick()),
            Action::OffersFetched(offers) => Ok(self.offers_fetched(offers)),
            Action::CountdownTick => Ok(self.countdown_tick()),
            Action::Accept => self.accept(),
            Action::Decline => self.decline(),
            Action::AcceptSucceeded(trip) => Ok(self.accept_succeeded(trip)),
            Action::AcceptFailed => Ok(self.accept_failed()),
            Action::AdvanceTrip { status, pin } => self.advance_trip(status, pin),
            Action::TripUpdated(trip) => Ok(self.trip_updated(trip)),
            Action::TripUpdateFailed => Ok(self.trip_update_failed()),
            Action::LocationChanged(point) => Ok(self.location_changed(point)),
            Action::RouteSynced(trip) => Ok(self.route_synced(trip)),
        }
    }

    fn go_online(&mut self) -> Vec<Effect> {
        if self.is_online() {
            return Vec::new();
        }

        self.phase = Phase::Idle;
        vec![
            Effect::PersistAvailability(true),
            Effect::StartPolling,
            Effect::Emit(DriverEvent::AvailabilityChanged { online: true }),
        ]
    }

    fn go_offline(&mut self) -> Result<Vec<Effect>, LifecycleError> {
        match self.phase {
            Phase::Offline => return Ok(Vec::new()),
            Phase::Accepting { .. } | Phase::TripActive { .. } => {
                return Err(LifecycleError::TripInProgress);
            }
            Phase::Idle | Phase::OfferShown { .. } => {}
        }

        let mut effects = vec![Effect::StopPolling, Effect::StopCountdown];
        if let Phase::OfferShown { offer, .. } = mem::replace(&mut self.phase, Phase::Offline) {
            effects.push(resolved(offer.id, OfferResolution::Withdrawn));
        }
        effects.push(Effect::PersistAvailability(false));
        effects.push(Effect::Emit(DriverEvent::AvailabilityChanged { online: false }));
        Ok(effects)
    }

    fn poll_tick(&self) -> Vec<Effect> {
        match self.phase {
            Phase::Idle => vec![Effect::FetchOffers],
            _ => Vec::new(),
        }
    }

    fn offers_fetched(&mut self, offers: Vec<Offer>) -> Vec<Effect> {
        // a response that lands after the driver moved on is stale
        if self.phase != Phase::Idle {
            return Vec::new();
        }

        let Some(offer) = offers
            .into_iter()
            .find(|offer| !self.declined.contains(&offer.id))
        else {
            return Vec::new();
        };

        self.phase = Phase::OfferShown {
            offer: offer.clone(),
            remaining_secs: self.countdown_secs,
        };
        vec![
            Effect::StopPolling,
            Effect::StartCountdown,
            Effect::Emit(DriverEvent::OfferShown {
                offer,
                countdown_secs: self.countdown_secs,
            }),
        ]
    }

    fn countdown_tick(&mut self) -> Vec<Effect> {
        let Phase::OfferShown {
            offer,
            remaining_secs,
        } = &mut self.phase
        else {
            return Vec::new();
        };

        *remaining_secs = remaining_secs.saturating_sub(1);
        if *remaining_secs > 0 {
            return vec![Effect::Emit(DriverEvent::OfferCountdown {
                offer_id: offer.id.clone(),
                remaining_secs: *remaining_secs,
            })];
        }

        let offer_id = offer.id.clone();
        self.declined.insert(offer_id.clone());
        self.phase = Phase::Idle;
        vec![
            Effect::StopCountdown,
            Effect::ResumePolling,
            resolved(offer_id, OfferResolution::Expired),
        ]
    }

    fn accept(&mut self) -> Result<Vec<Effect>, LifecycleError> {
        let Phase::OfferShown { offer, .. } = &self.phase else {
            return Err(LifecycleError::NoOffer);
        };

        let offer = offer.clone();
        self.phase = Phase::Accepting {
            offer: offer.clone(),
        };
        Ok(vec![Effect::StopCountdown, Effect::SubmitAccept(offer)])
    }

    fn decline(&mut self) -> Result<Vec<Effect>, LifecycleError> {
        let Phase::OfferShown { offer, .. } = &self.phase else {
            return Err(LifecycleError::NoOffer);
        };

        let offer_id = offer.id.clone();
        self.declined.insert(offer_id.clone());
        self.phase = Phase::Idle;
        Ok(vec![
            Effect::StopCountdown,
            Effect::ResumePolling,
            resolved(offer_id, OfferResolution::Declined),
        ])
    }

    fn accept_succeeded(&mut self, trip: Trip) -> Vec<Effect> {
        let Phase::Accepting { offer } = &self.phase else {
            return Vec::new();
        };

        let offer_id = offer.id.clone();
        self.phase = Phase::TripActive {
            trip: trip.clone(),
            arrival_requested: false,
        };
        vec![
            resolved(offer_id, OfferResolution::Accepted),
            Effect::Emit(DriverEvent::TripUpdated { trip }),
        ]
    }

    fn accept_failed(&mut self) -> Vec<Effect> {
        let Phase::Accepting { offer } = &self.phase else {
            return Vec::new();
        };

        // the backend refused or never answered; treat the offer as gone
        let offer_id = offer.id.clone();
        self.declined.insert(offer_id.clone());
        self.phase = Phase::Idle;
        vec![
            Effect::ResumePolling,
            resolved(offer_id, OfferResolution::AcceptFailed),
        ]
    }

    fn advance_trip(
        &mut self,
        status: TripStatus,
        pin: Option<String>,
    ) -> Result<Vec<Effect>, LifecycleError> {
        let Phase::TripActive { trip, .. } = &self.phase else {
            return Err(LifecycleError::NoActiveTrip);
        };

        let pin = pin
            .map(|pin| pin.trim().to_string())
            .filter(|pin| !pin.is_empty());
        check_transition(trip, status, pin.as_deref())?;
        Ok(vec![Effect::RequestTripStatus {
            trip_id: trip.id.clone(),
            status,
            pin,
        }])
    }

    fn trip_updated(&mut self, updated: Trip) -> Vec<Effect> {
        let Phase::TripActive { trip, .. } = &self.phase else {
            return Vec::new();
        };
        if trip.id != updated.id {
            return Vec::new();
        }

        self.apply_trip(updated)
    }

    fn trip_update_failed(&mut self) -> Vec<Effect> {
        if let Phase::TripActive {
            arrival_requested, ..
        } = &mut self.phase
        {
            *arrival_requested = false;
        }
        Vec::new()
    }

    fn location_changed(&mut self, point: GeoPoint) -> Vec<Effect> {
        self.location = Some(point);
        if !self.is_online() {
            return Vec::new();
        }

        let mut effects = vec![Effect::PublishLocation(point)];
        if let Phase::TripActive {
            trip,
            arrival_requested,
        } = &mut self.phase
        {
            let at_pickup = within_radius_m(&point, &trip.pickup.location, self.arrival_radius_m);
            if trip.status == TripStatus::Accepted && !*arrival_requested && at_pickup {
                *arrival_requested = true;
                effects.push(Effect::RequestTripStatus {
                    trip_id: trip.id.clone(),
                    status: TripStatus::Arrived,
                    pin: None,
                });
            }
        }
        effects
    }

    fn route_synced(&mut self, remote: Option<Trip>) -> Vec<Effect> {
        match &self.phase {
            Phase::Offline | Phase::Accepting { .. } => Vec::new(),
            Phase::Idle | Phase::OfferShown { .. } => match remote {
                Some(trip) if !trip.status.is_terminal() => self.adopt_trip(trip),
                _ => Vec::new(),
            },
            Phase::TripActive { trip, .. } => match remote {
                None => {
                    let trip_id = trip.id.clone();
                    self.end_trip(trip_id, None)
                }
                Some(remote) if trip.id == remote.id && trip.status == remote.status => Vec::new(),
                Some(remote) => self.apply_trip(remote),
            },
        }
    }

    fn adopt_trip(&mut self, trip: Trip) -> Vec<Effect> {
        let mut effects = vec![Effect::StopPolling, Effect::StopCountdown];
        if let Phase::OfferShown { offer, .. } = &self.phase {
            effects.push(resolved(offer.id.clone(), OfferResolution::Withdrawn));
        }
        self.phase = Phase::TripActive {
            trip: trip.clone(),
            arrival_requested: false,
        };
        effects.push(Effect::Emit(DriverEvent::TripUpdated { trip }));
        effects
    }

    fn apply_trip(&mut self, trip: Trip) -> Vec<Effect> {
        if trip.status.is_terminal() {
            return self.end_trip(trip.id, Some(trip.status));
        }

        let arrival_requested = match &self.phase {
            Phase::TripActive {
                trip: current,
                arrival_requested,
            } if current.id == trip.id => *arrival_requested,
            _ => false,
        };
        self.phase = Phase::TripActive {
            trip: trip.clone(),
            arrival_requested,
        };
        vec![Effect::Emit(DriverEvent::TripUpdated { trip })]
    }

    fn end_trip(&mut self, trip_id: String, status: Option<TripStatus>) -> Vec<Effect> {
        self.phase = Phase::Idle;
        vec![
            Effect::ResumePolling,
            Effect::Emit(DriverEvent::TripEnded { trip_id, status }),
        ]
    }
}

fn resolved(offer_id: String, resolution: OfferResolution) -> Effect {
    Effect::Emit(DriverEvent::OfferResolved {
        offer_id,
        resolution,
    })
}
