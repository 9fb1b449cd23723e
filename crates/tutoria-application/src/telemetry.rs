//! Tracing setup and the operational log.
//!
//! Degraded durable writes are reported with `tracing::warn!`. The
//! [`OperationalLogLayer`] forwards every `WARN` and `ERROR` event over a
//! channel so a view can surface them to the user.

use std::collections::HashMap;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// A warning or error as seen by the operational log.
#[derive(Debug, Clone, Serialize)]
pub struct OperationalEvent {
    pub level: String,
    /// Module path of the emitting code.
    pub target: String,
    pub message: String,
    pub fields: HashMap<String, Value>,
    /// RFC 3339 timestamp.
    pub timestamp: String,
}

pub struct OperationalLogLayer {
    sender: mpsc::UnboundedSender<OperationalEvent>,
}

impl OperationalLogLayer {
    pub fn new(sender: mpsc::UnboundedSender<OperationalEvent>) -> Self {
        Self { sender }
    }

    /// A layer and the receiving end of its channel.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<OperationalEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }
}

impl<S> Layer<S> for OperationalLogLayer
where
    S: Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let level = *event.metadata().level();
        if level > Level::WARN {
            return;
        }

        let mut fields = HashMap::new();
        event.record(&mut FieldVisitor(&mut fields));
        let message = match fields.remove("message") {
            Some(Value::String(message)) => message,
            Some(other) => other.to_string(),
            None => String::new(),
        };

        // A dropped receiver just means nobody is listening.
        let _ = self.sender.send(OperationalEvent {
            level: level.to_string(),
            target: event.metadata().target().to_string(),
            message,
            fields,
            timestamp: chrono::Utc::now().to_rfc3339(),
        });
    }
}

struct FieldVisitor<'a>(&'a mut HashMap<String, Value>);

impl tracing::field::Visit for FieldVisitor<'_> {
    fn record_f64(&mut self, field: &tracing::field::Field, value: f64) {
        self.0.insert(field.name().to_string(), serde_json::json!(value));
    }

    fn record_i64(&mut self, field: &tracing::field::Field, value: i64) {
        self.0.insert(field.name().to_string(), serde_json::json!(value));
    }

    fn record_u64(&mut self, field: &tracing::field::Field, value: u64) {
        self.0.insert(field.name().to_string(), serde_json::json!(value));
    }

    fn record_bool(&mut self, field: &tracing::field::Field, value: bool) {
        self.0.insert(field.name().to_string(), serde_json::json!(value));
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        self.0.insert(field.name().to_string(), serde_json::json!(value));
    }

    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        self.0
            .insert(field.name().to_string(), Value::String(format!("{:?}", value)));
    }
}

/// Filter from `RUST_LOG`, falling back to `default_level`.
pub fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Installs the global subscriber: formatted output plus the operational log.
///
/// Returns the operational event stream. If a global subscriber is already
/// set the stream stays empty.
pub fn init_tracing(default_level: &str) -> mpsc::UnboundedReceiver<OperationalEvent> {
    let (layer, rx) = OperationalLogLayer::channel();
    let result = tracing_subscriber::registry()
        .with(env_filter(default_level))
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .with(layer)
        .try_init();
    if let Err(e) = result {
        eprintln!("tracing already initialized: {}", e);
    }
    rx
}
