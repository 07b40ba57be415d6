use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::backend::{BackendError, DispatchBackend};
use crate::models::driver::GeoPoint;
use crate::models::offer::Offer;
use crate::models::payment::{PaymentInitiation, PaymentRequest, PaymentStatus};
use crate::models::trip::{Trip, TripStatus};
use crate::session::SessionStore;

/// REST client for the dispatch backend. The session token, when present,
/// is sent as a bearer token on every request.
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
    session: Arc<SessionStore>,
}

#[derive(Serialize)]
struct TripStatusBody<'a> {
    status: TripStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pin: Option<&'a str>,
}

#[derive(Serialize)]
struct AvailabilityBody {
    online: bool,
}

#[derive(Deserialize)]
struct PaymentStatusBody {
    status: PaymentStatus,
}

impl HttpBackend {
    pub fn new(
        base_url: impl Into<String>,
        timeout: Duration,
        session: Arc<SessionStore>,
    ) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("driver-agent/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            session,
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        debug!(%method, %url, "backend request");

        let builder = self.client.request(method, url);
        match self.session.token() {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }
}

async fn read_json<T: DeserializeOwned>(builder: RequestBuilder) -> Result<T, BackendError> {
    let response = check(builder.send().await?).await?;
    Ok(response.json::<T>().await?)
}

async fn send_empty(builder: RequestBuilder) -> Result<(), BackendError> {
    check(builder.send().await?).await?;
    Ok(())
}

async fn check(response: reqwest::Response) -> Result<reqwest::Response, BackendError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(BackendError::Status {
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl DispatchBackend for HttpBackend {
    async fn nearby_offers(&self, near: Option<GeoPoint>) -> Result<Vec<Offer>, BackendError> {
        let mut builder = self.request(Method::GET, "/offers/nearby");
        if let Some(point) = near {
            builder = builder.query(&[("lat", point.lat), ("lng", point.lng)]);
        }
        read_json(builder).await
    }

    async fn accept_offer(&self, offer: &Offer) -> Result<Trip, BackendError> {
        read_json(self.request(Method::POST, &format!("/offers/{}/accept", offer.id))).await
    }

    async fn update_trip_status(
        &self,
        trip_id: &str,
        status: TripStatus,
        pin: Option<&str>,
    ) -> Result<Trip, BackendError> {
        let builder = self
            .request(Method::PATCH, &format!("/trips/{trip_id}/status"))
            .json(&TripStatusBody { status, pin });
        read_json(builder).await
    }

    async fn current_trip(&self) -> Result<Option<Trip>, BackendError> {
        let response = self
            .request(Method::GET, "/drivers/me/route")
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Ok(check(response).await?.json::<Option<Trip>>().await?)
    }

    async fn set_availability(&self, online: bool) -> Result<(), BackendError> {
        let builder = self
            .request(Method::PATCH, "/drivers/me/availability")
            .json(&AvailabilityBody { online });
        send_empty(builder).await
    }

    async fn update_location(&self, at: GeoPoint) -> Result<(), BackendError> {
        let builder = self
            .request(Method::POST, "/drivers/me/location")
            .json(&at);
        send_empty(builder).await
    }

    async fn initiate_payment(
        &self,
        request: &PaymentRequest,
    ) -> Result<PaymentInitiation, BackendError> {
        read_json(self.request(Method::POST, "/payments").json(request)).await
    }

    async fn payment_status(&self, reference: &str) -> Result<PaymentStatus, BackendError> {
        let body: PaymentStatusBody =
            read_json(self.request(Method::GET, &format!("/payments/{reference}"))).await?;
        Ok(body.status)
    }
}
