use chrono::{DateTime, Utc};

/// A domain event (an immutable fact about an aggregate).
///
/// Events are append-only and versioned so stored payloads can evolve.
pub trait Event: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Stable event name (e.g. "purchasing.order.receipt_created").
    fn event_type(&self) -> &'static str;

    /// Schema version for this event type.
    fn version(&self) -> u32;

    /// When the event occurred (business time).
    fn occurred_at(&self) -> DateTime<Utc>;
}
