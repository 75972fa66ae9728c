use anyhow::{anyhow, Result};
use tracing::info;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

/// Target of the per-frame session logs.
const PDU_TARGET: &str = "smppserver::listener::session";

/// Tracing configuration
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Service name
    pub service_name: String,

    /// Base filter directive; `RUST_LOG` replaces it when set
    pub log_level: String,

    /// JSON log format
    pub json_logs: bool,

    /// Log every inbound and outbound PDU at trace level
    pub pdu_trace: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            service_name: "smppserver".to_string(),
            log_level: "info".to_string(),
            json_logs: false,
            pdu_trace: false,
        }
    }
}

impl TracingConfig {
    /// Filter directive combining the log level with the PDU trace switch.
    pub fn directive(&self) -> String {
        if self.pdu_trace {
            format!("{},{}=trace", self.log_level, PDU_TARGET)
        } else {
            self.log_level.clone()
        }
    }

    fn filter(&self) -> Result<EnvFilter> {
        if let Ok(filter) = EnvFilter::try_from_default_env() {
            return Ok(filter);
        }
        let directive = self.directive();
        EnvFilter::try_new(&directive).map_err(|e| anyhow!("invalid log filter '{}': {}", directive, e))
    }
}

/// Install the global subscriber. Session and listener spans are logged when
/// they close, so each connection ends with one line carrying its lifetime.
pub fn init_tracing(config: &TracingConfig) -> Result<()> {
    let subscriber = tracing_subscriber::registry().with(config.filter()?);

    if config.json_logs {
        subscriber
            .with(
                fmt::layer()
                    .json()
                    .with_span_events(FmtSpan::CLOSE)
                    .with_current_span(true),
            )
            .try_init()?;
    } else {
        subscriber
            .with(fmt::layer().pretty().with_span_events(FmtSpan::CLOSE))
            .try_init()?;
    }

    info!(
        service = %config.service_name,
        filter = %config.directive(),
        json_logs = config.json_logs,
        "tracing initialized"
    );

    Ok(())
}
