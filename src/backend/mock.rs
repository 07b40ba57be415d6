use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::backend::{BackendError, DispatchBackend};
use crate::models::driver::GeoPoint;
use crate::models::offer::{Contact, Offer, OfferKind, Waypoint};
use crate::models::payment::{PaymentInitiation, PaymentMethod, PaymentRequest, PaymentStatus};
use crate::models::trip::{Trip, TripStatus};

#[derive(Debug)]
struct MockPayment {
    polls_left: u32,
    outcome: PaymentStatus,
}

#[derive(Debug)]
struct MockInner {
    offers: Vec<Offer>,
    current_trip: Option<Trip>,
    fail_accept: bool,
    fail_polls: bool,
    polls: usize,
    availability: Vec<bool>,
    locations: Vec<GeoPoint>,
    payments: HashMap<String, MockPayment>,
    payment_outcome: PaymentStatus,
    payment_polls: u32,
}

/// In-memory backend for tests and for running without a server.
#[derive(Debug)]
pub struct MockBackend {
    inner: Mutex<MockInner>,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBackend {
    pub fn new() -> Self {
        Self::with_offers(Vec::new())
    }

    pub fn with_offers(offers: Vec<Offer>) -> Self {
        Self {
            inner: Mutex::new(MockInner {
                offers,
                current_trip: None,
                fail_accept: false,
                fail_polls: false,
                polls: 0,
                availability: Vec::new(),
                locations: Vec::new(),
                payments: HashMap::new(),
                payment_outcome: PaymentStatus::Paid,
                payment_polls: 1,
            }),
        }
    }

    /// A handful of rides and deliveries around `center`.
    pub fn demo(center: GeoPoint) -> Self {
        let offers = vec![
            demo_offer(OfferKind::Ride, center, 0.004, "Chipo M.", 5.5),
            demo_offer(OfferKind::Delivery, center, -0.006, "Greenwood Pharmacy", 3.0),
            demo_offer(OfferKind::Ride, center, 0.009, "Blessing K.", 9.0),
        ];
        Self::with_offers(offers)
    }

    pub async fn push_offer(&self, offer: Offer) {
        self.inner.lock().await.offers.push(offer);
    }

    pub async fn set_accept_failure(&self, fail: bool) {
        self.inner.lock().await.fail_accept = fail;
    }

    pub async fn set_poll_failure(&self, fail: bool) {
        self.inner.lock().await.fail_polls = fail;
    }

    pub async fn set_current_trip(&self, trip: Option<Trip>) {
        self.inner.lock().await.current_trip = trip;
    }

    /// Payments initiated after this call settle to `outcome` on the
    /// `after_polls`-th status query.
    pub async fn set_payment_outcome(&self, outcome: PaymentStatus, after_polls: u32) {
        let mut inner = self.inner.lock().await;
        inner.payment_outcome = outcome;
        inner.payment_polls = after_polls;
    }

    pub async fn poll_count(&self) -> usize {
        self.inner.lock().await.polls
    }

    pub async fn availability_calls(&self) -> Vec<bool> {
        self.inner.lock().await.availability.clone()
    }

    pub async fn locations(&self) -> Vec<GeoPoint> {
        self.inner.lock().await.locations.clone()
    }

    pub async fn current(&self) -> Option<Trip> {
        self.inner.lock().await.current_trip.clone()
    }
}

fn demo_offer(kind: OfferKind, center: GeoPoint, offset: f64, customer: &str, price: f64) -> Offer {
    Offer {
        id: Uuid::new_v4().to_string(),
        kind,
        customer: Contact {
            name: customer.to_string(),
            phone: None,
            rating: Some(4.7),
        },
        pickup: Waypoint {
            address: "Pickup point".to_string(),
            location: GeoPoint {
                lat: center.lat + offset,
                lng: center.lng + offset,
            },
        },
        dropoff: Waypoint {
            address: "Drop-off point".to_string(),
            location: GeoPoint {
                lat: center.lat - offset * 3.0,
                lng: center.lng + offset * 2.0,
            },
        },
        estimated_price: price,
        estimated_distance_km: price * 0.8,
        estimated_duration_min: (price * 2.0) as u32,
    }
}

#[async_trait]
impl DispatchBackend for MockBackend {
    async fn nearby_offers(&self, _near: Option<GeoPoint>) -> Result<Vec<Offer>, BackendError> {
        let mut inner = self.inner.lock().await;
        inner.polls += 1;
        if inner.fail_polls {
            return Err(BackendError::Rejected("nearby offers unavailable".to_string()));
        }
        Ok(inner.offers.clone())
    }

    async fn accept_offer(&self, offer: &Offer) -> Result<Trip, BackendError> {
        let mut inner = self.inner.lock().await;
        if inner.fail_accept {
            return Err(BackendError::Rejected(format!(
                "offer {} already taken",
                offer.id
            )));
        }

        let before = inner.offers.len();
        inner.offers.retain(|candidate| candidate.id != offer.id);
        if inner.offers.len() == before {
            return Err(BackendError::Rejected(format!("unknown offer {}", offer.id)));
        }

        let pin = match offer.kind {
            OfferKind::Delivery => Some(format!("{:04}", Uuid::new_v4().as_u128() % 10_000)),
            OfferKind::Ride => None,
        };
        let trip = Trip {
            id: format!("trip-{}", offer.id),
            offer_id: offer.id.clone(),
            kind: offer.kind,
            status: TripStatus::Accepted,
            customer: offer.customer.clone(),
            pickup: offer.pickup.clone(),
            dropoff: offer.dropoff.clone(),
            fare: offer.estimated_price,
            pin,
            updated_at: Utc::now(),
        };
        inner.current_trip = Some(trip.clone());
        Ok(trip)
    }

    async fn update_trip_status(
        &self,
        trip_id: &str,
        status: TripStatus,
        pin: Option<&str>,
    ) -> Result<Trip, BackendError> {
        let mut inner = self.inner.lock().await;
        let Some(trip) = inner.current_trip.as_mut().filter(|trip| trip.id == trip_id) else {
            return Err(BackendError::Rejected(format!("trip {trip_id} is not assigned")));
        };

        if status == TripStatus::Completed && trip.pin.is_some() && trip.pin.as_deref() != pin {
            return Err(BackendError::Rejected("wrong delivery pin".to_string()));
        }

        trip.status = status;
        trip.updated_at = Utc::now();
        let updated = trip.clone();
        if status.is_terminal() {
            inner.current_trip = None;
        }
        Ok(updated)
    }

    async fn current_trip(&self) -> Result<Option<Trip>, BackendError> {
        Ok(self.inner.lock().await.current_trip.clone())
    }

    async fn set_availability(&self, online: bool) -> Result<(), BackendError> {
        self.inner.lock().await.availability.push(online);
        Ok(())
    }

    async fn update_location(&self, at: GeoPoint) -> Result<(), BackendError> {
        self.inner.lock().await.locations.push(at);
        Ok(())
    }

    async fn initiate_payment(
        &self,
        request: &PaymentRequest,
    ) -> Result<PaymentInitiation, BackendError> {
        let mut inner = self.inner.lock().await;
        let reference = format!("pay-{}", Uuid::new_v4().simple());
        let payment = MockPayment {
            polls_left: inner.payment_polls,
            outcome: inner.payment_outcome,
        };
        inner.payments.insert(reference.clone(), payment);

        Ok(PaymentInitiation {
            redirect_url: request
                .method
                .is_redirect()
                .then(|| format!("https://pay.example.test/checkout/{reference}")),
            auth_code: (request.method == PaymentMethod::InnBucks)
                .then(|| format!("{:06}", Uuid::new_v4().as_u128() % 1_000_000)),
            reference,
        })
    }

    async fn payment_status(&self, reference: &str) -> Result<PaymentStatus, BackendError> {
        let mut inner = self.inner.lock().await;
        let payment = inner
            .payments
            .get_mut(reference)
            .ok_or_else(|| BackendError::Rejected(format!("unknown payment {reference}")))?;

        payment.polls_left = payment.polls_left.saturating_sub(1);
        if payment.polls_left == 0 {
            Ok(payment.outcome)
        } else {
            Ok(PaymentStatus::Pending)
        }
    }
}
