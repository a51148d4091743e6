use std::fmt;

use super::event_log::Severity;

/// Epoch of the widget handle a session currently owns.
///
/// Bumped on every initialize and every reset so results and callbacks that belong to an
/// abandoned handle can be recognised and dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct SessionGeneration(pub u64);

impl SessionGeneration {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

impl fmt::Display for SessionGeneration {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "#{}", self.0)
    }
}

/// Lifecycle of one chat session.
///
/// Widget visibility is owned by the runtime, so `Ready` covers both open and closed chat.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Uninitialized,
    Initializing,
    Ready,
    InitializationFailed {
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionTransition {
    BeginInitialize,
    InitializeSucceeded,
    InitializeFailed { reason: String },
    Reset,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionTransitionRejection {
    InitializeInFlight,
    AlreadyReady,
    NotInitializing,
}

pub type SessionTransitionResult = Result<SessionState, SessionTransitionRejection>;

impl SessionState {
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }

    pub fn is_initializing(&self) -> bool {
        matches!(self, Self::Initializing)
    }

    pub fn failure_reason(&self) -> Option<&str> {
        match self {
            Self::InitializationFailed { reason } => Some(reason),
            Self::Uninitialized | Self::Initializing | Self::Ready => None,
        }
    }

    pub fn status_text(&self) -> &'static str {
        match self {
            Self::Uninitialized => "Not initialized",
            Self::Initializing => "Initializing...",
            Self::Ready => "Ready",
            Self::InitializationFailed { .. } => "Initialization failed",
        }
    }

    /// Tone of the status indicator a host shows next to [`Self::status_text`].
    pub fn status_severity(&self) -> Severity {
        match self {
            Self::Ready => Severity::Success,
            Self::Initializing => Severity::Warning,
            Self::Uninitialized | Self::InitializationFailed { .. } => Severity::Error,
        }
    }

    /// Applies one transition deterministically.
    ///
    /// Initialization may start from `Uninitialized` or, as a retry, from
    /// `InitializationFailed`. `Reset` is accepted from every state.
    pub fn apply(&self, transition: SessionTransition) -> SessionTransitionResult {
        match transition {
            SessionTransition::BeginInitialize => self.apply_begin(),
            SessionTransition::InitializeSucceeded => self.apply_resolution(Self::Ready),
            SessionTransition::InitializeFailed { reason } => {
                self.apply_resolution(Self::InitializationFailed { reason })
            }
            SessionTransition::Reset => Ok(Self::Uninitialized),
        }
    }

    fn apply_begin(&self) -> SessionTransitionResult {
        match self {
            Self::Uninitialized | Self::InitializationFailed { .. } => Ok(Self::Initializing),
            Self::Initializing => Err(SessionTransitionRejection::InitializeInFlight),
            Self::Ready => Err(SessionTransitionRejection::AlreadyReady),
        }
    }

    fn apply_resolution(&self, next: Self) -> SessionTransitionResult {
        match self {
            Self::Initializing => Ok(next),
            Self::Uninitialized | Self::Ready | Self::InitializationFailed { .. } => {
                Err(SessionTransitionRejection::NotInitializing)
            }
        }
    }
}
