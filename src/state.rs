use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{broadcast, mpsc, watch};
use uuid::Uuid;

use crate::backend::DispatchBackend;
use crate::config::Config;
use crate::engine::commands::Command;
use crate::engine::lifecycle::{DriverSnapshot, OfferLifecycle};
use crate::models::event::DriverEvent;
use crate::models::payment::PaymentSession;
use crate::observability::metrics::Metrics;
use crate::session::SessionStore;

pub struct AppState {
    pub config: Config,
    pub backend: Arc<dyn DispatchBackend>,
    pub session: Arc<SessionStore>,
    pub payments: DashMap<Uuid, PaymentSession>,
    pub command_tx: mpsc::Sender<Command>,
    pub events_tx: broadcast::Sender<DriverEvent>,
    pub snapshot: watch::Sender<DriverSnapshot>,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(
        config: Config,
        backend: Arc<dyn DispatchBackend>,
        session: Arc<SessionStore>,
    ) -> (Self, mpsc::Receiver<Command>) {
        let (command_tx, command_rx) = mpsc::channel(config.command_queue_size);
        let (events_tx, _unused_rx) = broadcast::channel(config.event_buffer_size);
        let initial = OfferLifecycle::new(config.offer_countdown_secs, config.arrival_radius_m)
            .snapshot();
        let (snapshot, _unused_snapshot_rx) = watch::channel(initial);

        (
            Self {
                config,
                backend,
                session,
                payments: DashMap::new(),
                command_tx,
                events_tx,
                snapshot,
                metrics: Metrics::new(),
            },
            command_rx,
        )
    }

    pub fn current_snapshot(&self) -> DriverSnapshot {
        self.snapshot.borrow().clone()
    }
}
