use serde::{Deserialize, Serialize};

use crate::models::driver::GeoPoint;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OfferKind {
    Ride,
    Delivery,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Contact {
    pub name: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub rating: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Waypoint {
    pub address: String,
    pub location: GeoPoint,
}

/// A ride or delivery request surfaced to the driver. The backend owns it;
/// the client only holds it in memory while it is shown.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Offer {
    pub id: String,
    pub kind: OfferKind,
    pub customer: Contact,
    pub pickup: Waypoint,
    pub dropoff: Waypoint,
    pub estimated_price: f64,
    pub estimated_distance_km: f64,
    pub estimated_duration_min: u32,
}
