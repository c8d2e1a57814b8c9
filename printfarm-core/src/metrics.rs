//! Prometheus metrics for proxy sessions
//!
//! All metrics live in a process-wide registry and are exposed via the
//! `/metrics` endpoint for Prometheus scraping.

use prometheus::{
    register_int_counter_vec_with_registry, register_int_counter_with_registry,
    register_int_gauge_vec_with_registry, Encoder, IntCounter, IntCounterVec, IntGaugeVec,
    Registry, TextEncoder,
};

/// Global metrics registry
pub static REGISTRY: std::sync::LazyLock<Registry> = std::sync::LazyLock::new(Registry::new);

/// Proxy sessions currently open, by kind (`control`, `video`, `resource`)
pub static SESSIONS_ACTIVE: std::sync::LazyLock<IntGaugeVec> = std::sync::LazyLock::new(|| {
    register_int_gauge_vec_with_registry!(
        "proxy_sessions_active",
        "Number of proxy sessions currently open",
        &["kind"],
        REGISTRY.clone()
    )
    .expect("Failed to register SESSIONS_ACTIVE")
});

/// Finished proxy sessions, by kind and outcome
pub static SESSIONS_TOTAL: std::sync::LazyLock<IntCounterVec> = std::sync::LazyLock::new(|| {
    register_int_counter_vec_with_registry!(
        "proxy_sessions_total",
        "Total number of proxy sessions by outcome",
        &["kind", "outcome"],
        REGISTRY.clone()
    )
    .expect("Failed to register SESSIONS_TOTAL")
});

/// Device registry lookups, by result (`found`, `not_found`, `error`)
pub static REGISTRY_LOOKUPS_TOTAL: std::sync::LazyLock<IntCounterVec> =
    std::sync::LazyLock::new(|| {
        register_int_counter_vec_with_registry!(
            "registry_lookups_total",
            "Total number of device registry lookups",
            &["result"],
            REGISTRY.clone()
        )
        .expect("Failed to register REGISTRY_LOOKUPS_TOTAL")
    });

/// Video stream metrics
pub mod video {
    use super::{register_int_counter_with_registry, IntCounter, REGISTRY};

    /// Complete JPEG frames re-emitted to clients
    pub static FRAMES_EMITTED: std::sync::LazyLock<IntCounter> = std::sync::LazyLock::new(|| {
        register_int_counter_with_registry!(
            "video_frames_emitted_total",
            "Total number of video frames emitted to clients",
            REGISTRY.clone()
        )
        .expect("Failed to register FRAMES_EMITTED")
    });
}

/// Control channel metrics
pub mod control {
    use super::{register_int_counter_vec_with_registry, IntCounterVec, REGISTRY};

    /// Relayed control messages, by direction
    pub static MESSAGES_RELAYED: std::sync::LazyLock<IntCounterVec> =
        std::sync::LazyLock::new(|| {
            register_int_counter_vec_with_registry!(
                "control_messages_relayed_total",
                "Total number of control messages relayed",
                &["direction"],
                REGISTRY.clone()
            )
            .expect("Failed to register MESSAGES_RELAYED")
        });
}

/// Static resource metrics
pub mod resource {
    use super::{register_int_counter_with_registry, IntCounter, REGISTRY};

    /// Body bytes fetched from devices
    pub static BYTES_FETCHED: std::sync::LazyLock<IntCounter> = std::sync::LazyLock::new(|| {
        register_int_counter_with_registry!(
            "resource_bytes_fetched_total",
            "Total number of resource body bytes fetched from devices",
            REGISTRY.clone()
        )
        .expect("Failed to register BYTES_FETCHED")
    });
}

/// Keeps `proxy_sessions_active{kind}` raised for as long as it is alive.
#[derive(Debug)]
pub struct ActiveSessionGuard {
    kind: &'static str,
}

impl ActiveSessionGuard {
    #[must_use]
    pub fn new(kind: &'static str) -> Self {
        SESSIONS_ACTIVE.with_label_values(&[kind]).inc();
        Self { kind }
    }

    /// Count the finished session under `outcome`.
    pub fn finish(self, outcome: &str) {
        SESSIONS_TOTAL.with_label_values(&[self.kind, outcome]).inc();
    }
}

impl Drop for ActiveSessionGuard {
    fn drop(&mut self) {
        SESSIONS_ACTIVE.with_label_values(&[self.kind]).dec();
    }
}

/// Expose metrics in Prometheus format
pub fn gather_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|_| prometheus::Error::Msg("Invalid UTF-8".to_string()))
}
