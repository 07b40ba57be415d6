use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task;
use tokio::time::{Instant, Interval, MissedTickBehavior, interval, interval_at};
use tracing::{debug, info, warn};

use crate::engine::commands::Command;
use crate::engine::lifecycle::{Action, Effect, OfferLifecycle};
use crate::error::AppError;
use crate::models::event::DriverEvent;
use crate::state::AppState;

/// Drives the offer lifecycle: owns its timers, runs its effects against the
/// backend and feeds the results back in. One task, so actions never race.
pub async fn run_driver_runtime(state: Arc<AppState>, commands: mpsc::Receiver<Command>) {
    DriverRuntime::new(state).run(commands).await;
}

struct DriverRuntime {
    state: Arc<AppState>,
    lifecycle: OfferLifecycle,
    poll_timer: Option<Interval>,
    countdown_timer: Option<Interval>,
    offer_shown_at: Option<Instant>,
}

impl DriverRuntime {
    fn new(state: Arc<AppState>) -> Self {
        let lifecycle = OfferLifecycle::new(
            state.config.offer_countdown_secs,
            state.config.arrival_radius_m,
        );

        Self {
            state,
            lifecycle,
            poll_timer: None,
            countdown_timer: None,
            offer_shown_at: None,
        }
    }

    async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        info!("driver runtime started");

        if self.state.session.is_online() {
            info!("restoring persisted availability");
            self.tick(Action::GoOnline).await;
        }

        let sync_period = self.state.config.route_sync_interval;
        let mut route_sync = interval_at(Instant::now() + sync_period, sync_period);
        route_sync.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.handle(command).await,
                    None => break,
                },
                _ = next_tick(&mut self.poll_timer) => self.tick(Action::PollTick).await,
                _ = next_tick(&mut self.countdown_timer) => self.tick(Action::CountdownTick).await,
                _ = route_sync.tick() => self.sync_route().await,
            }
        }

        warn!("driver runtime stopped: command channel closed");
    }

    async fn handle(&mut self, command: Command) {
        let result = self
            .dispatch(command.action)
            .await
            .map(|()| self.lifecycle.snapshot());

        if command.reply.send(result).is_err() {
            debug!("command caller went away before the reply");
        }
    }

    async fn tick(&mut self, action: Action) {
        if let Err(err) = self.dispatch(action).await {
            debug!(error = %err, "timer action rejected");
        }
    }

    async fn sync_route(&mut self) {
        if !self.lifecycle.is_online() {
            return;
        }

        match self.state.backend.current_trip().await {
            Ok(trip) => self.tick(Action::RouteSynced(trip)).await,
            Err(err) => warn!(error = %err, "route sync failed"),
        }
    }

    /// Applies `action` and every follow-up action its effects produce.
    /// Only accept and trip-status requests report backend failures to the
    /// caller; everything else is logged and reconciled on a later tick.
    async fn dispatch(&mut self, action: Action) -> Result<(), AppError> {
        let surfaces_failure = matches!(action, Action::Accept | Action::AdvanceTrip { .. });

        let effects = self.lifecycle.apply(action)?;
        let mut pending = VecDeque::new();
        let mut failure = None;

        for effect in effects {
            if let Err(err) = self.execute(effect, &mut pending).await {
                failure.get_or_insert(err);
            }
        }

        while let Some(follow_up) = pending.pop_front() {
            match self.lifecycle.apply(follow_up) {
                Ok(effects) => {
                    for effect in effects {
                        if let Err(err) = self.execute(effect, &mut pending).await {
                            failure.get_or_insert(err);
                        }
                    }
                }
                Err(err) => warn!(error = %err, "follow-up action rejected"),
            }
        }

        self.state.snapshot.send_replace(self.lifecycle.snapshot());

        match failure {
            Some(err) if surfaces_failure => Err(err),
            Some(err) => {
                warn!(error = %err, "background backend call failed");
                Ok(())
            }
            None => Ok(()),
        }
    }

    async fn execute(
        &mut self,
        effect: Effect,
        pending: &mut VecDeque<Action>,
    ) -> Result<(), AppError> {
        let backend = self.state.backend.clone();
        let metrics = &self.state.metrics;

        match effect {
            Effect::PersistAvailability(online) => {
                let session = self.state.session.clone();
                match task::spawn_blocking(move || session.set_online(online)).await {
                    Ok(Ok(())) => {}
                    Ok(Err(err)) => warn!(online, error = %err, "failed to persist availability"),
                    Err(err) => warn!(online, error = %err, "availability persist task failed"),
                }
                if let Err(err) = backend.set_availability(online).await {
                    warn!(online, error = %err, "backend availability update failed");
                }
                metrics.driver_online.set(i64::from(online));
            }
            Effect::StartPolling => {
                let mut timer = interval(self.state.config.poll_interval);
                timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
                self.poll_timer = Some(timer);
            }
            Effect::ResumePolling => {
                let period = self.state.config.poll_interval;
                let mut timer = interval_at(Instant::now() + period, period);
                timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
                self.poll_timer = Some(timer);
            }
            Effect::StopPolling => self.poll_timer = None,
            Effect::FetchOffers => match backend.nearby_offers(self.lifecycle.location()).await {
                Ok(offers) => {
                    let outcome = if offers.is_empty() { "empty" } else { "offers" };
                    metrics.polls_total.with_label_values(&[outcome]).inc();
                    debug!(count = offers.len(), "polled nearby offers");
                    pending.push_back(Action::OffersFetched(offers));
                }
                Err(err) => {
                    metrics.polls_total.with_label_values(&["error"]).inc();
                    warn!(error = %err, "offer poll failed");
                }
            },
            Effect::StartCountdown => {
                let period = self.state.config.countdown_tick;
                self.countdown_timer = Some(interval_at(Instant::now() + period, period));
            }
            Effect::StopCountdown => self.countdown_timer = None,
            Effect::SubmitAccept(offer) => match backend.accept_offer(&offer).await {
                Ok(trip) => {
                    info!(offer_id = %offer.id, trip_id = %trip.id, "offer accepted");
                    pending.push_back(Action::AcceptSucceeded(trip));
                }
                Err(err) => {
                    warn!(offer_id = %offer.id, error = %err, "accept failed");
                    pending.push_back(Action::AcceptFailed);
                    return Err(err.into());
                }
            },
            Effect::RequestTripStatus {
                trip_id,
                status,
                pin,
            } => match backend
                .update_trip_status(&trip_id, status, pin.as_deref())
                .await
            {
                Ok(trip) => pending.push_back(Action::TripUpdated(trip)),
                Err(err) => {
                    warn!(
                        trip_id = %trip_id,
                        status = status.as_str(),
                        error = %err,
                        "trip status update failed"
                    );
                    pending.push_back(Action::TripUpdateFailed);
                    return Err(err.into());
                }
            },
            Effect::PublishLocation(point) => {
                if let Err(err) = backend.update_location(point).await {
                    debug!(error = %err, "location update failed");
                }
            }
            Effect::Emit(event) => {
                self.record(&event);
                // no subscribers is fine
                let _ = self.state.events_tx.send(event);
            }
        }

        Ok(())
    }

    fn record(&mut self, event: &DriverEvent) {
        let metrics = &self.state.metrics;

        match event {
            DriverEvent::AvailabilityChanged { online } => {
                info!(online = *online, "availability changed");
            }
            DriverEvent::OfferShown { offer, .. } => {
                metrics.offers_total.with_label_values(&["shown"]).inc();
                self.offer_shown_at = Some(Instant::now());
                info!(offer_id = %offer.id, kind = ?offer.kind, price = offer.estimated_price, "offer shown");
            }
            DriverEvent::OfferResolved {
                offer_id,
                resolution,
            } => {
                metrics
                    .offers_total
                    .with_label_values(&[resolution.as_str()])
                    .inc();
                if let Some(shown_at) = self.offer_shown_at.take() {
                    metrics
                        .offer_decision_seconds
                        .observe(shown_at.elapsed().as_secs_f64());
                }
                info!(offer_id = %offer_id, resolution = resolution.as_str(), "offer resolved");
            }
            DriverEvent::TripUpdated { trip } => {
                metrics
                    .trip_transitions_total
                    .with_label_values(&[trip.status.as_str()])
                    .inc();
                info!(trip_id = %trip.id, status = trip.status.as_str(), "trip updated");
            }
            DriverEvent::TripEnded { trip_id, status } => {
                if let Some(status) = status {
                    metrics
                        .trip_transitions_total
                        .with_label_values(&[status.as_str()])
                        .inc();
                }
                info!(trip_id = %trip_id, status = ?status, "trip ended");
            }
            DriverEvent::OfferCountdown { .. } | DriverEvent::PaymentUpdated { .. } => {}
        }
    }
}

async fn next_tick(timer: &mut Option<Interval>) {
    match timer {
        Some(timer) => {
            timer.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use chrono::Utc;
    use tokio::time::sleep;

    use super::run_driver_runtime;
    use crate::backend::MockBackend;
    use crate::config::Config;
    use crate::engine::commands::submit;
    use crate::engine::lifecycle::{Action, Phase};
    use crate::error::AppError;
    use crate::models::driver::GeoPoint;
    use crate::models::offer::{Contact, Offer, OfferKind, Waypoint};
    use crate::models::trip::{Trip, TripStatus};
    use crate::session::SessionStore;
    use crate::state::AppState;

    fn offer(id: &str, kind: OfferKind) -> Offer {
        Offer {
            id: id.to_string(),
            kind,
            customer: Contact {
                name: "Nyasha".to_string(),
                phone: Some("0773000111".to_string()),
                rating: None,
            },
            pickup: Waypoint {
                address: "Julius Nyerere Way".to_string(),
                location: GeoPoint {
                    lat: -17.8310,
                    lng: 31.0470,
                },
            },
            dropoff: Waypoint {
                address: "Avondale Shops".to_string(),
                location: GeoPoint {
                    lat: -17.8000,
                    lng: 31.0350,
                },
            },
            estimated_price: 4.0,
            estimated_distance_km: 4.2,
            estimated_duration_min: 11,
        }
    }

    fn start(backend: Arc<MockBackend>, session: SessionStore) -> Arc<AppState> {
        let (state, rx) = AppState::new(Config::default(), backend, Arc::new(session));
        let state = Arc::new(state);
        tokio::spawn(run_driver_runtime(state.clone(), rx));
        state
    }

    #[tokio::test(start_paused = true)]
    async fn unanswered_offer_expires_and_polling_resumes() {
        let backend = Arc::new(MockBackend::with_offers(vec![offer("o-1", OfferKind::Ride)]));
        let state = start(backend.clone(), SessionStore::in_memory());

        submit(&state, Action::GoOnline).await.unwrap();
        sleep(Duration::from_millis(100)).await;

        match state.current_snapshot().phase {
            Phase::OfferShown {
                offer,
                remaining_secs,
            } => {
                assert_eq!(offer.id, "o-1");
                assert_eq!(remaining_secs, 20);
            }
            other => panic!("expected an offer, got {other:?}"),
        }
        assert_eq!(backend.poll_count().await, 1);

        sleep(Duration::from_secs(19)).await;
        assert!(matches!(
            state.current_snapshot().phase,
            Phase::OfferShown {
                remaining_secs: 1,
                ..
            }
        ));
        assert_eq!(backend.poll_count().await, 1);

        sleep(Duration::from_secs(1)).await;
        let snapshot = state.current_snapshot();
        assert_eq!(snapshot.phase, Phase::Idle);
        assert_eq!(snapshot.declined_offers, 1);
        assert_eq!(backend.poll_count().await, 1);

        sleep(Duration::from_secs(4)).await;
        assert_eq!(backend.poll_count().await, 2);

        sleep(Duration::from_secs(4)).await;
        assert_eq!(backend.poll_count().await, 3);
        assert_eq!(state.current_snapshot().phase, Phase::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn polls_at_most_once_per_interval_and_stop_offline() {
        let backend = Arc::new(MockBackend::new());
        let state = start(backend.clone(), SessionStore::in_memory());

        submit(&state, Action::GoOnline).await.unwrap();
        assert!(state.session.is_online());
        sleep(Duration::from_millis(9_500)).await;
        // ticks at 0s, 4s and 8s
        assert_eq!(backend.poll_count().await, 3);

        let snapshot = submit(&state, Action::GoOffline).await.unwrap();
        assert!(!snapshot.online);
        assert!(!state.session.is_online());

        sleep(Duration::from_secs(20)).await;
        assert_eq!(backend.poll_count().await, 3);
        assert_eq!(backend.availability_calls().await, vec![true, false]);
    }

    #[tokio::test(start_paused = true)]
    async fn accepted_offer_becomes_trip_and_progresses() {
        let backend = Arc::new(MockBackend::with_offers(vec![offer(
            "o-2",
            OfferKind::Delivery,
        )]));
        let state = start(backend.clone(), SessionStore::in_memory());

        submit(&state, Action::GoOnline).await.unwrap();
        sleep(Duration::from_millis(100)).await;

        let snapshot = submit(&state, Action::Accept).await.unwrap();
        let Phase::TripActive { trip, .. } = snapshot.phase else {
            panic!("expected an active trip");
        };
        assert_eq!(trip.status, TripStatus::Accepted);
        let pin = trip.pin.clone().expect("deliveries carry a pin");

        for status in [TripStatus::Arrived, TripStatus::PickedUp] {
            submit(
                &state,
                Action::AdvanceTrip {
                    status,
                    pin: None,
                },
            )
            .await
            .unwrap();
        }

        let wrong = submit(
            &state,
            Action::AdvanceTrip {
                status: TripStatus::Completed,
                pin: Some("wrong".to_string()),
            },
        )
        .await;
        assert!(matches!(wrong, Err(AppError::BadRequest(_))));

        let done = submit(
            &state,
            Action::AdvanceTrip {
                status: TripStatus::Completed,
                pin: Some(pin),
            },
        )
        .await
        .unwrap();
        assert_eq!(done.phase, Phase::Idle);
        assert!(backend.current().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn failed_accept_is_reported_and_polling_resumes() {
        let backend = Arc::new(MockBackend::with_offers(vec![offer("o-3", OfferKind::Ride)]));
        backend.set_accept_failure(true).await;
        let state = start(backend.clone(), SessionStore::in_memory());

        submit(&state, Action::GoOnline).await.unwrap();
        sleep(Duration::from_millis(100)).await;

        let result = submit(&state, Action::Accept).await;
        assert!(matches!(result, Err(AppError::Upstream(_))));

        let snapshot = state.current_snapshot();
        assert_eq!(snapshot.phase, Phase::Idle);
        assert_eq!(snapshot.declined_offers, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn persisted_availability_is_restored_on_start() {
        let session = SessionStore::in_memory();
        session.set_online(true).unwrap();
        let backend = Arc::new(MockBackend::new());
        let state = start(backend.clone(), session);

        sleep(Duration::from_millis(100)).await;
        assert!(state.current_snapshot().online);
        assert_eq!(backend.poll_count().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn route_sync_adopts_trip_assigned_by_backend() {
        let backend = Arc::new(MockBackend::new());
        let state = start(backend.clone(), SessionStore::in_memory());
        submit(&state, Action::GoOnline).await.unwrap();

        let assigned = offer("o-4", OfferKind::Ride);
        backend
            .set_current_trip(Some(Trip {
                id: "trip-remote".to_string(),
                offer_id: assigned.id.clone(),
                kind: assigned.kind,
                status: TripStatus::Accepted,
                customer: assigned.customer.clone(),
                pickup: assigned.pickup.clone(),
                dropoff: assigned.dropoff.clone(),
                fare: assigned.estimated_price,
                pin: None,
                updated_at: Utc::now(),
            }))
            .await;

        sleep(Duration::from_millis(10_100)).await;
        assert!(matches!(
            state.current_snapshot().phase,
            Phase::TripActive { trip, .. } if trip.id == "trip-remote"
        ));

        backend.set_current_trip(None).await;
        sleep(Duration::from_secs(10)).await;
        assert_eq!(state.current_snapshot().phase, Phase::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn arriving_at_pickup_marks_trip_arrived() {
        let backend = Arc::new(MockBackend::with_offers(vec![offer("o-5", OfferKind::Ride)]));
        let state = start(backend.clone(), SessionStore::in_memory());

        submit(&state, Action::GoOnline).await.unwrap();
        sleep(Duration::from_millis(100)).await;
        submit(&state, Action::Accept).await.unwrap();

        let at_pickup = GeoPoint {
            lat: -17.8311,
            lng: 31.0470,
        };
        let snapshot = submit(&state, Action::LocationChanged(at_pickup))
            .await
            .unwrap();

        assert!(matches!(
            snapshot.phase,
            Phase::TripActive { trip, .. } if trip.status == TripStatus::Arrived
        ));
        assert_eq!(backend.locations().await, vec![at_pickup]);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_polls_are_counted_and_retried_next_tick() {
        let backend = Arc::new(MockBackend::new());
        backend.set_poll_failure(true).await;
        let state = start(backend.clone(), SessionStore::in_memory());
        let errors = || state.metrics.polls_total.with_label_values(&["error"]).get();

        submit(&state, Action::GoOnline).await.unwrap();
        sleep(Duration::from_millis(100)).await;
        assert_eq!(state.current_snapshot().phase, Phase::Idle);
        assert_eq!(backend.poll_count().await, 1);
        assert_eq!(errors(), 1);

        sleep(Duration::from_secs(4)).await;
        assert_eq!(state.current_snapshot().phase, Phase::Idle);
        assert_eq!(backend.poll_count().await, 2);
        assert_eq!(errors(), 2);

        backend.set_poll_failure(false).await;
        backend.push_offer(offer("o-6", OfferKind::Ride)).await;
        sleep(Duration::from_secs(4)).await;
        assert!(matches!(
            state.current_snapshot().phase,
            Phase::OfferShown { offer, .. } if offer.id == "o-6"
        ));
        assert_eq!(backend.poll_count().await, 3);
        assert_eq!(errors(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn declining_waits_a_full_interval_before_polling_again() {
        let backend = Arc::new(MockBackend::with_offers(vec![offer("o-7", OfferKind::Ride)]));
        let state = start(backend.clone(), SessionStore::in_memory());

        submit(&state, Action::GoOnline).await.unwrap();
        sleep(Duration::from_millis(100)).await;
        assert_eq!(backend.poll_count().await, 1);

        let snapshot = submit(&state, Action::Decline).await.unwrap();
        assert_eq!(snapshot.phase, Phase::Idle);
        assert_eq!(backend.poll_count().await, 1);

        sleep(Duration::from_millis(3_800)).await;
        assert_eq!(backend.poll_count().await, 1);

        sleep(Duration::from_millis(300)).await;
        assert_eq!(backend.poll_count().await, 2);
    }
}
