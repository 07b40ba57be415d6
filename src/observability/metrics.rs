use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub polls_total: IntCounterVec,
    pub offers_total: IntCounterVec,
    pub offer_decision_seconds: Histogram,
    pub trip_transitions_total: IntCounterVec,
    pub payments_total: IntCounterVec,
    pub driver_online: IntGauge,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let polls_total = IntCounterVec::new(
            Opts::new("polls_total", "Nearby-offer polls by outcome"),
            &["outcome"],
        )
        .expect("valid polls_total metric");

        let offers_total = IntCounterVec::new(
            Opts::new("offers_total", "Offers shown and how they were resolved"),
            &["outcome"],
        )
        .expect("valid offers_total metric");

        let offer_decision_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "offer_decision_seconds",
                "Time from showing an offer to its resolution in seconds",
            )
            .buckets(vec![1.0, 2.0, 5.0, 10.0, 15.0, 20.0, 30.0]),
        )
        .expect("valid offer_decision_seconds metric");

        let trip_transitions_total = IntCounterVec::new(
            Opts::new("trip_transitions_total", "Confirmed trip status changes"),
            &["status"],
        )
        .expect("valid trip_transitions_total metric");

        let payments_total = IntCounterVec::new(
            Opts::new("payments_total", "Payments by method and final status"),
            &["method", "outcome"],
        )
        .expect("valid payments_total metric");

        let driver_online = IntGauge::new("driver_online", "1 while the driver is online")
            .expect("valid driver_online metric");

        registry
            .register(Box::new(polls_total.clone()))
            .expect("register polls_total");
        registry
            .register(Box::new(offers_total.clone()))
            .expect("register offers_total");
        registry
            .register(Box::new(offer_decision_seconds.clone()))
            .expect("register offer_decision_seconds");
        registry
            .register(Box::new(trip_transitions_total.clone()))
            .expect("register trip_transitions_total");
        registry
            .register(Box::new(payments_total.clone()))
            .expect("register payments_total");
        registry
            .register(Box::new(driver_online.clone()))
            .expect("register driver_online");

        Self {
            registry,
            polls_total,
            offers_total,
            offer_decision_seconds,
            trip_transitions_total,
            payments_total,
            driver_online,
        }
    }

    pub fn encode(&self) -> Result<String, String> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        TextEncoder::new()
            .encode(&metric_families, &mut buffer)
            .map_err(|err| format!("failed to encode metrics: {err}"))?;

        String::from_utf8(buffer).map_err(|err| format!("metrics are not valid utf8: {err}"))
    }
}
