use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::offer::{Contact, OfferKind, Waypoint};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TripStatus {
    Accepted,
    Arrived,
    Started,
    PickedUp,
    Completed,
    Cancelled,
}

impl TripStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TripStatus::Completed | TripStatus::Cancelled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TripStatus::Accepted => "accepted",
            TripStatus::Arrived => "arrived",
            TripStatus::Started => "started",
            TripStatus::PickedUp => "picked_up",
            TripStatus::Completed => "completed",
            TripStatus::Cancelled => "cancelled",
        }
    }
}

/// An active ride or delivery assignment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Trip {
    pub id: String,
    pub offer_id: String,
    pub kind: OfferKind,
    pub status: TripStatus,
    pub customer: Contact,
    pub pickup: Waypoint,
    pub dropoff: Waypoint,
    pub fare: f64,
    /// Delivery confirmation code the customer hands to the driver.
    #[serde(default)]
    pub pin: Option<String>,
    pub updated_at: DateTime<Utc>,
}
