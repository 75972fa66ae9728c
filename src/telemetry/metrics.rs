//! OpenTelemetry instruments for the session engine.
//!
//! Instruments live in `OnceLock` statics and are no-ops until
//! [`counters::init`] is called with a meter.

pub mod counters {
    use opentelemetry::metrics::{Counter, Gauge, Histogram, Meter};
    use opentelemetry::KeyValue;
    use std::sync::OnceLock;

    // ============================================================================
    // SERVER / SESSION LIFECYCLE
    // ============================================================================

    static SERVER_STATUS: OnceLock<Gauge<i64>> = OnceLock::new();
    static SESSIONS_TOTAL: OnceLock<Counter<u64>> = OnceLock::new();
    static SESSIONS_ACTIVE: OnceLock<Gauge<i64>> = OnceLock::new();
    static SESSION_DURATION: OnceLock<Histogram<f64>> = OnceLock::new();
    static BINDS_TOTAL: OnceLock<Counter<u64>> = OnceLock::new();

    // ============================================================================
    // PDU TRAFFIC
    // ============================================================================

    static PDU_RECEIVED_TOTAL: OnceLock<Counter<u64>> = OnceLock::new();
    static PDU_SENT_TOTAL: OnceLock<Counter<u64>> = OnceLock::new();
    static PDU_ERRORS_TOTAL: OnceLock<Counter<u64>> = OnceLock::new();
    static STATE_REJECTIONS_TOTAL: OnceLock<Counter<u64>> = OnceLock::new();
    static DUPLICATE_RESPONSES_TOTAL: OnceLock<Counter<u64>> = OnceLock::new();
    static PROCESSOR_ERRORS_TOTAL: OnceLock<Counter<u64>> = OnceLock::new();

    // ============================================================================
    // WINDOW
    // ============================================================================

    static WINDOW_OFFERS_TOTAL: OnceLock<Counter<u64>> = OnceLock::new();
    static WINDOW_TIMEOUTS_TOTAL: OnceLock<Counter<u64>> = OnceLock::new();
    static WINDOW_EXPIRED_TOTAL: OnceLock<Counter<u64>> = OnceLock::new();
    static WINDOW_UNMATCHED_TOTAL: OnceLock<Counter<u64>> = OnceLock::new();
    static REQUEST_DURATION: OnceLock<Histogram<f64>> = OnceLock::new();

    /// Initialize all instruments.
    pub fn init(meter: &Meter) {
        let _ = SERVER_STATUS.set(
            meter.i64_gauge("smpp_server_status")
                .with_description("Server lifecycle status (0=stopped, 1=starting, 2=started, 3=stopping)")
                .build(),
        );
        let _ = SESSIONS_TOTAL.set(
            meter.u64_counter("smpp_sessions_total")
                .with_description("Sessions by lifecycle event")
                .build(),
        );
        let _ = SESSIONS_ACTIVE.set(
            meter.i64_gauge("smpp_sessions_active")
                .with_description("Currently registered sessions")
                .build(),
        );
        let _ = SESSION_DURATION.set(
            meter.f64_histogram("smpp_session_duration_seconds")
                .with_description("Session lifetime")
                .build(),
        );
        let _ = BINDS_TOTAL.set(
            meter.u64_counter("smpp_binds_total")
                .with_description("Bind operations by type and result")
                .build(),
        );

        let _ = PDU_RECEIVED_TOTAL.set(
            meter.u64_counter("smpp_pdu_received_total")
                .with_description("PDUs received by command")
                .build(),
        );
        let _ = PDU_SENT_TOTAL.set(
            meter.u64_counter("smpp_pdu_sent_total")
                .with_description("PDUs sent by command")
                .build(),
        );
        let _ = PDU_ERRORS_TOTAL.set(
            meter.u64_counter("smpp_pdu_errors_total")
                .with_description("PDU decode/encode/write errors by kind")
                .build(),
        );
        let _ = STATE_REJECTIONS_TOTAL.set(
            meter.u64_counter("smpp_state_rejections_total")
                .with_description("Requests rejected for the session's bind state")
                .build(),
        );
        let _ = DUPLICATE_RESPONSES_TOTAL.set(
            meter.u64_counter("smpp_duplicate_responses_total")
                .with_description("Processor replies dropped because one was already sent")
                .build(),
        );
        let _ = PROCESSOR_ERRORS_TOTAL.set(
            meter.u64_counter("smpp_processor_errors_total")
                .with_description("Packet processor failures by kind")
                .build(),
        );

        let _ = WINDOW_OFFERS_TOTAL.set(
            meter.u64_counter("smpp_window_offers_total")
                .with_description("Window offers by result")
                .build(),
        );
        let _ = WINDOW_TIMEOUTS_TOTAL.set(
            meter.u64_counter("smpp_window_timeouts_total")
                .with_description("Outbound requests that timed out waiting for a response")
                .build(),
        );
        let _ = WINDOW_EXPIRED_TOTAL.set(
            meter.u64_counter("smpp_window_expired_total")
                .with_description("Window entries reclaimed by the expiry sweep")
                .build(),
        );
        let _ = WINDOW_UNMATCHED_TOTAL.set(
            meter.u64_counter("smpp_window_unmatched_total")
                .with_description("Responses dropped with no matching window entry")
                .build(),
        );
        let _ = REQUEST_DURATION.set(
            meter.f64_histogram("smpp_request_duration_seconds")
                .with_description("Outbound request round-trip time")
                .build(),
        );
    }

    /// Record the server lifecycle status as a numeric gauge.
    pub fn server_status(server: &str, status: i64) {
        if let Some(g) = SERVER_STATUS.get() {
            g.record(status, &[kv("server", server)]);
        }
    }

    pub fn session_created(server: &str, active: usize) {
        if let Some(c) = SESSIONS_TOTAL.get() {
            c.add(1, &[kv("server", server), kv("event", "created")]);
        }
        sessions_active(server, active);
    }

    pub fn session_destroyed(server: &str, active: usize, lifetime_secs: f64) {
        if let Some(c) = SESSIONS_TOTAL.get() {
            c.add(1, &[kv("server", server), kv("event", "destroyed")]);
        }
        if let Some(h) = SESSION_DURATION.get() {
            h.record(lifetime_secs, &[kv("server", server)]);
        }
        sessions_active(server, active);
    }

    fn sessions_active(server: &str, active: usize) {
        if let Some(g) = SESSIONS_ACTIVE.get() {
            g.record(active as i64, &[kv("server", server)]);
        }
    }

    /// Record a bind outcome.
    pub fn bind(bind_type: &str, result: &str) {
        if let Some(c) = BINDS_TOTAL.get() {
            c.add(1, &[kv("bind_type", bind_type), kv("result", result)]);
        }
    }

    pub fn pdu_received(command: &str) {
        if let Some(c) = PDU_RECEIVED_TOTAL.get() {
            c.add(1, &[kv("command", command)]);
        }
    }

    pub fn pdu_sent(command: &str) {
        if let Some(c) = PDU_SENT_TOTAL.get() {
            c.add(1, &[kv("command", command)]);
        }
    }

    /// Record a PDU error (`decode`, `encode` or `write`).
    pub fn pdu_error(kind: &str) {
        if let Some(c) = PDU_ERRORS_TOTAL.get() {
            c.add(1, &[kv("kind", kind)]);
        }
    }

    pub fn state_rejection(status: &str) {
        if let Some(c) = STATE_REJECTIONS_TOTAL.get() {
            c.add(1, &[kv("status", status)]);
        }
    }

    pub fn duplicate_response() {
        if let Some(c) = DUPLICATE_RESPONSES_TOTAL.get() {
            c.add(1, &[]);
        }
    }

    /// Record a processor failure (`error` or `panic`).
    pub fn processor_error(kind: &str) {
        if let Some(c) = PROCESSOR_ERRORS_TOTAL.get() {
            c.add(1, &[kv("kind", kind)]);
        }
    }

    pub fn window_offer(result: &str) {
        if let Some(c) = WINDOW_OFFERS_TOTAL.get() {
            c.add(1, &[kv("result", result)]);
        }
    }

    pub fn window_timeout(command: &str) {
        if let Some(c) = WINDOW_TIMEOUTS_TOTAL.get() {
            c.add(1, &[kv("command", command)]);
        }
    }

    pub fn window_expired(count: usize) {
        if let Some(c) = WINDOW_EXPIRED_TOTAL.get() {
            c.add(count as u64, &[]);
        }
    }

    pub fn window_unmatched() {
        if let Some(c) = WINDOW_UNMATCHED_TOTAL.get() {
            c.add(1, &[]);
        }
    }

    pub fn request_duration(command: &str, secs: f64) {
        if let Some(h) = REQUEST_DURATION.get() {
            h.record(secs, &[kv("command", command)]);
        }
    }

    fn kv(key: &'static str, value: &str) -> KeyValue {
        KeyValue::new(key, value.to_string())
    }
}
