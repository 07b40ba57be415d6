use serde::Serialize;

use crate::models::offer::Offer;
use crate::models::payment::PaymentSession;
use crate::models::trip::{Trip, TripStatus};

/// How a shown offer left the screen.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OfferResolution {
    Accepted,
    Declined,
    Expired,
    AcceptFailed,
    /// Cleared without a decision: driver went offline or a trip was
    /// assigned by the backend.
    Withdrawn,
}

impl OfferResolution {
    pub fn as_str(self) -> &'static str {
        match self {
            OfferResolution::Accepted => "accepted",
            OfferResolution::Declined => "declined",
            OfferResolution::Expired => "expired",
            OfferResolution::AcceptFailed => "accept_failed",
            OfferResolution::Withdrawn => "withdrawn",
        }
    }
}

/// Pushed to UI subscribers over the websocket.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DriverEvent {
    AvailabilityChanged {
        online: bool,
    },
    OfferShown {
        offer: Offer,
        countdown_secs: u32,
    },
    OfferCountdown {
        offer_id: String,
        remaining_secs: u32,
    },
    OfferResolved {
        offer_id: String,
        resolution: OfferResolution,
    },
    TripUpdated {
        trip: Trip,
    },
    /// `status` is `None` when the backend stopped reporting the trip.
    TripEnded {
        trip_id: String,
        status: Option<TripStatus>,
    },
    PaymentUpdated {
        payment: PaymentSession,
    },
}
