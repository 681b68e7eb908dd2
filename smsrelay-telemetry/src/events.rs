//! The event type.
//!
//! Lifecycle events are one tagged sum type carrying a shared header,
//! rather than one struct per event class with a common base. Subscribers
//! match on the [`Event`] variant.

use smsrelay_common::MessageId;

use crate::metrics::AlertLevel;

/// The component that published an event, recorded in its header rather
/// than encoded into a family of per-component event structs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Component {
    Control,
    Dispatcher,
    Health,
    Maintenance,
    Metrics,
    Queue,
    Retry,
    Scheduler,
}

/// Fields shared by every event, regardless of variant.
#[derive(Debug, Clone)]
pub struct EventHeader {
    pub id: u64,
    pub timestamp: u64,
    pub source: Component,
}

/// The discriminant used by [`crate::bus::EventBus::subscribe`]'s
/// `type_filter`, kept separate from [`Event`] so a filter can be
/// expressed (and compared, and stored in a `HashSet`) without carrying a
/// payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    QueuePromoted,
    SendingStarted,
    Sent,
    Failed,
    Maintenance,
    Alert,
}

/// One lifecycle event, covering both bus traffic and [`AlertLevel`]
/// alerts.
#[derive(Debug, Clone)]
pub enum Event {
    /// Emitted once per Scheduler tick batch (`queue.promoted`).
    QueuePromoted {
        header: EventHeader,
        promoted: usize,
        retried: usize,
        expired: usize,
    },
    /// Emitted when a Dispatcher worker claims a message
    /// (`sms.sending.started`).
    SendingStarted {
        header: EventHeader,
        message_id: MessageId,
    },
    /// Emitted on successful delivery (`sms.sent`).
    Sent {
        header: EventHeader,
        message_id: MessageId,
        processing_ms: u64,
    },
    /// Emitted on a failed attempt, retryable or not (`sms.failed`).
    Failed {
        header: EventHeader,
        message_id: MessageId,
        error: String,
        will_retry: bool,
    },
    /// Emitted once per Maintenance pass (`queue.maintenance`).
    Maintenance {
        header: EventHeader,
        sent_deleted: usize,
        failed_deleted: usize,
        rescued: usize,
        expired: usize,
        recommendations: Vec<String>,
    },
    /// Emitted when a metric crosses a configured threshold.
    Alert {
        header: EventHeader,
        metric: String,
        level: AlertLevel,
        value: f64,
    },
}

impl Event {
    #[must_use]
    pub const fn header(&self) -> &EventHeader {
        match self {
            Self::QueuePromoted { header, .. }
            | Self::SendingStarted { header, .. }
            | Self::Sent { header, .. }
            | Self::Failed { header, .. }
            | Self::Maintenance { header, .. }
            | Self::Alert { header, .. } => header,
        }
    }

    #[must_use]
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::QueuePromoted { .. } => EventKind::QueuePromoted,
            Self::SendingStarted { .. } => EventKind::SendingStarted,
            Self::Sent { .. } => EventKind::Sent,
            Self::Failed { .. } => EventKind::Failed,
            Self::Maintenance { .. } => EventKind::Maintenance,
            Self::Alert { .. } => EventKind::Alert,
        }
    }
}
