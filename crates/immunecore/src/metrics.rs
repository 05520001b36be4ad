//! Prometheus metrics
//!
//! Tracks:
//! - incoming updates by kind
//! - conversation transitions by edge
//! - handler errors by kind (input/domain/internal)
//! - certificates and invites issued
//!
//! Metrics live in an explicit [`Registry`] owned by [`Metrics`], which is built
//! once at startup and shared by `Arc`.

use prometheus::{opts, Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Registry, TextEncoder};

use crate::error::AppResult;

pub struct Metrics {
    registry: Registry,

    /// Labels: kind (message/callback/inline_query/...)
    pub updates_total: IntCounterVec,

    /// Labels: from, to
    pub transitions_total: IntCounterVec,

    /// Labels: kind (input/domain/internal)
    pub handler_errors_total: IntCounterVec,

    /// Updates dropped by the auth middleware
    pub updates_dropped_total: IntCounter,

    pub certificates_created_total: IntCounter,

    pub invites_activated_total: IntCounter,

    /// Wall time of one dispatcher step
    pub dispatch_duration_seconds: Histogram,
}

impl Metrics {
    pub fn new() -> AppResult<Self> {
        Self::with_registry(Registry::new_custom(Some("immune".to_string()), None)?)
    }

    pub fn with_registry(registry: Registry) -> AppResult<Self> {
        let updates_total = IntCounterVec::new(opts!("updates_total", "Incoming updates by kind"), &["kind"])?;
        let transitions_total = IntCounterVec::new(
            opts!("transitions_total", "Conversation state transitions"),
            &["from", "to"],
        )?;
        let handler_errors_total = IntCounterVec::new(
            opts!("handler_errors_total", "Handler errors by kind"),
            &["kind"],
        )?;
        let updates_dropped_total = IntCounter::new("updates_dropped_total", "Updates dropped by the auth gate")?;
        let certificates_created_total = IntCounter::new("certificates_created_total", "Certificates issued")?;
        let invites_activated_total = IntCounter::new("invites_activated_total", "Invites redeemed")?;
        let dispatch_duration_seconds = Histogram::with_opts(
            HistogramOpts::new("dispatch_duration_seconds", "Time spent in one conversation step")
                .buckets(vec![0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
        )?;

        registry.register(Box::new(updates_total.clone()))?;
        registry.register(Box::new(transitions_total.clone()))?;
        registry.register(Box::new(handler_errors_total.clone()))?;
        registry.register(Box::new(updates_dropped_total.clone()))?;
        registry.register(Box::new(certificates_created_total.clone()))?;
        registry.register(Box::new(invites_activated_total.clone()))?;
        registry.register(Box::new(dispatch_duration_seconds.clone()))?;

        Ok(Self {
            registry,
            updates_total,
            transitions_total,
            handler_errors_total,
            updates_dropped_total,
            certificates_created_total,
            invites_activated_total,
            dispatch_duration_seconds,
        })
    }

    /// Renders all metrics in the Prometheus text exposition format
    pub fn encode(&self) -> AppResult<(String, Vec<u8>)> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok((encoder.format_type().to_string(), buffer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_contains_prefixed_names() {
        let metrics = Metrics::new().unwrap();
        metrics.updates_total.with_label_values(&["message"]).inc();
        metrics.certificates_created_total.inc();

        let (content_type, body) = metrics.encode().unwrap();
        let body = String::from_utf8(body).unwrap();
        assert!(content_type.starts_with("text/plain"));
        assert!(body.contains("immune_updates_total{kind=\"message\"} 1"));
        assert!(body.contains("immune_certificates_created_total 1"));
    }

    #[test]
    fn test_independent_registries() {
        let a = Metrics::new().unwrap();
        let b = Metrics::new().unwrap();
        a.invites_activated_total.inc();
        assert_eq!(b.invites_activated_total.get(), 0);
    }
}
