pub mod http;
pub mod mock;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::driver::GeoPoint;
use crate::models::offer::Offer;
use crate::models::payment::{PaymentInitiation, PaymentRequest, PaymentStatus};
use crate::models::trip::{Trip, TripStatus};

pub use http::HttpBackend;
pub use mock::MockBackend;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("backend returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("rejected: {0}")]
    Rejected(String),
}

/// Everything the driver client asks of the dispatch backend.
#[async_trait]
pub trait DispatchBackend: Send + Sync {
    async fn nearby_offers(&self, near: Option<GeoPoint>) -> Result<Vec<Offer>, BackendError>;

    async fn accept_offer(&self, offer: &Offer) -> Result<Trip, BackendError>;

    async fn update_trip_status(
        &self,
        trip_id: &str,
        status: TripStatus,
        pin: Option<&str>,
    ) -> Result<Trip, BackendError>;

    /// The trip the backend currently has assigned to this driver, if any.
    async fn current_trip(&self) -> Result<Option<Trip>, BackendError>;

    async fn set_availability(&self, online: bool) -> Result<(), BackendError>;

    async fn update_location(&self, at: GeoPoint) -> Result<(), BackendError>;

    async fn initiate_payment(
        &self,
        request: &PaymentRequest,
    ) -> Result<PaymentInitiation, BackendError>;

    async fn payment_status(&self, reference: &str) -> Result<PaymentStatus, BackendError>;
}
