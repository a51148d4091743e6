#![deny(unsafe_code)]

//! Lifecycle controller for an embeddable chat widget.
//!
//! [`ChatSession`] drives the widget through initialization, readiness, visibility commands
//! and teardown, mirrors every transition and runtime callback into a bounded [`EventLog`],
//! and relays callbacks to a host observer.

mod bridge;
pub mod error;
pub mod event_log;
pub mod session;
/// Deterministic session state boundary.
pub mod state;

pub use bridge::DelegateEvent;
pub use error::{SessionError, SessionResult};
pub use event_log::{DEFAULT_EVENT_LOG_CAPACITY, EventKind, EventLog, EventLogEntry, Severity};
pub use session::{ChatSession, InitializeOutcome, InitializeResolution, PendingInitialize};
pub use state::{
    SessionGeneration, SessionState, SessionTransition, SessionTransitionRejection,
    SessionTransitionResult,
};

pub use chatlink_widget::{ChatDelegate, ChatNotification, SessionConfiguration, WidgetError};
