use std::sync::Arc;

use chrono::Utc;
use tokio::time::{Instant, interval_at};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::event::DriverEvent;
use crate::models::payment::{PaymentRequest, PaymentSession, PaymentStatus};
use crate::state::AppState;

/// Starts a payment with the backend and spawns the status poller for it.
pub async fn start_payment(
    state: &Arc<AppState>,
    request: PaymentRequest,
) -> Result<PaymentSession, AppError> {
    let request = validate_request(request)?;
    let initiation = state.backend.initiate_payment(&request).await?;

    if request.method.is_redirect() && initiation.redirect_url.is_none() {
        return Err(AppError::Upstream(
            "card payment was started without a checkout url".to_string(),
        ));
    }

    let now = Utc::now();
    let payment = PaymentSession {
        id: Uuid::new_v4(),
        method: request.method,
        amount: request.amount,
        currency: request.currency,
        reference: initiation.reference,
        redirect_url: initiation.redirect_url,
        auth_code: initiation.auth_code,
        status: PaymentStatus::Pending,
        created_at: now,
        updated_at: now,
    };

    state.payments.insert(payment.id, payment.clone());
    let _ = state.events_tx.send(DriverEvent::PaymentUpdated {
        payment: payment.clone(),
    });

    info!(
        payment_id = %payment.id,
        method = payment.method.as_str(),
        reference = %payment.reference,
        amount = payment.amount,
        "payment initiated"
    );

    tokio::spawn(track_payment(state.clone(), payment.id));
    Ok(payment)
}

pub fn validate_request(mut request: PaymentRequest) -> Result<PaymentRequest, AppError> {
    if !request.amount.is_finite() || request.amount <= 0.0 {
        return Err(AppError::BadRequest("amount must be > 0".to_string()));
    }

    request.currency = request.currency.trim().to_uppercase();
    if request.currency.is_empty() {
        return Err(AppError::BadRequest("currency cannot be empty".to_string()));
    }

    if request.method.requires_phone() {
        let phone = request.phone.as_deref().ok_or_else(|| {
            AppError::BadRequest(format!(
                "phone number is required for {}",
                request.method.as_str()
            ))
        })?;
        request.phone = Some(normalize_phone(phone)?);
    }

    Ok(request)
}

fn normalize_phone(raw: &str) -> Result<String, AppError> {
    let digits: String = raw
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '+' | '(' | ')'))
        .collect();

    if !(9..=15).contains(&digits.len()) || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(AppError::BadRequest(format!("invalid phone number: {raw}")));
    }
    Ok(digits)
}

/// Polls the backend until the payment settles or the deadline passes.
pub async fn track_payment(state: Arc<AppState>, payment_id: Uuid) {
    let period = state.config.payment_poll_interval;
    let deadline = Instant::now() + state.config.payment_timeout;
    let mut ticker = interval_at(Instant::now() + period, period);

    loop {
        ticker.tick().await;

        let Some(reference) = state
            .payments
            .get(&payment_id)
            .map(|payment| payment.reference.clone())
        else {
            return;
        };

        if Instant::now() >= deadline {
            settle(&state, payment_id, PaymentStatus::TimedOut);
            return;
        }

        match state.backend.payment_status(&reference).await {
            Ok(PaymentStatus::Pending) => debug!(payment_id = %payment_id, "payment still pending"),
            Ok(status) => {
                settle(&state, payment_id, status);
                return;
            }
            Err(err) => warn!(payment_id = %payment_id, error = %err, "payment status check failed"),
        }
    }
}

fn settle(state: &AppState, payment_id: Uuid, status: PaymentStatus) {
    let Some(payment) = state.payments.get_mut(&payment_id).map(|mut payment| {
        payment.status = status;
        payment.updated_at = Utc::now();
        payment.clone()
    }) else {
        return;
    };

    state
        .metrics
        .payments_total
        .with_label_values(&[payment.method.as_str(), status.as_str()])
        .inc();
    info!(
        payment_id = %payment.id,
        method = payment.method.as_str(),
        status = status.as_str(),
        "payment settled"
    );

    let _ = state.events_tx.send(DriverEvent::PaymentUpdated { payment });
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use tokio::time::sleep;

    use super::{start_payment, validate_request};
    use crate::backend::MockBackend;
    use crate::config::Config;
    use crate::error::AppError;
    use crate::models::payment::{PaymentMethod, PaymentRequest, PaymentStatus};
    use crate::session::SessionStore;
    use crate::state::AppState;

    fn request(method: PaymentMethod, phone: Option<&str>) -> PaymentRequest {
        PaymentRequest {
            method,
            amount: 12.5,
            currency: " usd ".to_string(),
            phone: phone.map(str::to_string),
            description: Some("weekly commission".to_string()),
        }
    }

    fn state_with(backend: Arc<MockBackend>) -> Arc<AppState> {
        let (state, _rx) = AppState::new(
            Config::default(),
            backend,
            Arc::new(SessionStore::in_memory()),
        );
        Arc::new(state)
    }

    #[test]
    fn wallet_methods_need_a_phone() {
        for method in [PaymentMethod::EcoCash, PaymentMethod::Omari, PaymentMethod::SmileCash] {
            assert!(matches!(
                validate_request(request(method, None)),
                Err(AppError::BadRequest(_))
            ));
        }
        assert!(validate_request(request(PaymentMethod::Card, None)).is_ok());
        assert!(validate_request(request(PaymentMethod::InnBucks, None)).is_ok());
    }

    #[test]
    fn phone_and_currency_are_normalized() {
        let valid =
            validate_request(request(PaymentMethod::EcoCash, Some("+263 77-212-3456"))).unwrap();
        assert_eq!(valid.phone.as_deref(), Some("263772123456"));
        assert_eq!(valid.currency, "USD");
    }

    #[test]
    fn bad_amounts_and_phones_are_rejected() {
        let mut zero = request(PaymentMethod::Card, None);
        zero.amount = 0.0;
        assert!(validate_request(zero).is_err());

        let mut nan = request(PaymentMethod::Card, None);
        nan.amount = f64::NAN;
        assert!(validate_request(nan).is_err());

        assert!(validate_request(request(PaymentMethod::Omari, Some("07abc"))).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn wallet_payment_settles_after_polling() {
        let backend = Arc::new(MockBackend::new());
        backend.set_payment_outcome(PaymentStatus::Paid, 3).await;
        let state = state_with(backend);

        let payment = start_payment(&state, request(PaymentMethod::EcoCash, Some("0772123456")))
            .await
            .unwrap();
        assert_eq!(payment.status, PaymentStatus::Pending);
        assert!(payment.redirect_url.is_none());

        sleep(Duration::from_secs(11)).await;
        assert_eq!(state.payments.get(&payment.id).unwrap().status, PaymentStatus::Pending);

        sleep(Duration::from_secs(5)).await;
        assert_eq!(state.payments.get(&payment.id).unwrap().status, PaymentStatus::Paid);
    }

    #[tokio::test(start_paused = true)]
    async fn card_payment_returns_checkout_url() {
        let state = state_with(Arc::new(MockBackend::new()));
        let payment = start_payment(&state, request(PaymentMethod::Card, None))
            .await
            .unwrap();
        assert!(payment.redirect_url.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn unsettled_payment_times_out() {
        let backend = Arc::new(MockBackend::new());
        backend.set_payment_outcome(PaymentStatus::Pending, 1).await;
        let state = state_with(backend);

        let payment = start_payment(&state, request(PaymentMethod::InnBucks, None))
            .await
            .unwrap();
        assert!(payment.auth_code.is_some());

        sleep(Duration::from_secs(301)).await;
        assert_eq!(state.payments.get(&payment.id).unwrap().status, PaymentStatus::TimedOut);
    }
}
