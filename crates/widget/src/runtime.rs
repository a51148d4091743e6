use std::sync::Arc;

use futures::future::BoxFuture;
use snafu::Snafu;

use super::config::SessionConfiguration;
use super::delegate::ChatDelegate;

pub type WidgetResult<T> = Result<T, WidgetError>;

/// Future returned by [`WidgetHandle::initialize`].
///
/// It owns everything it needs so the caller can drop its borrow of the handle while
/// the runtime finishes bringing the widget up.
pub type InitializeFuture = BoxFuture<'static, WidgetResult<()>>;

#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum WidgetError {
    #[snafu(display("{reason}"))]
    InitializationRejected { stage: &'static str, reason: String },
    #[snafu(display("{reason}"))]
    Runtime { stage: &'static str, reason: String },
}

impl WidgetError {
    pub fn initialization_rejected(reason: impl Into<String>) -> Self {
        InitializationRejectedSnafu {
            stage: "widget-initialize",
            reason: reason.into(),
        }
        .build()
    }

    pub fn runtime(reason: impl Into<String>) -> Self {
        RuntimeSnafu {
            stage: "widget-runtime",
            reason: reason.into(),
        }
        .build()
    }

    /// Human-readable description suitable for showing to an end user.
    pub fn description(&self) -> &str {
        match self {
            Self::InitializationRejected { reason, .. } | Self::Runtime { reason, .. } => reason,
        }
    }
}

/// Chat engine that can mint widget handles.
pub trait WidgetRuntime: Send + Sync {
    fn name(&self) -> &str;
    fn create(&self, configuration: &SessionConfiguration) -> Box<dyn WidgetHandle>;
}

/// One live widget instance.
///
/// Visibility commands are fire-and-forget: acknowledgement, if any, arrives later through
/// the registered [`ChatDelegate`].
pub trait WidgetHandle: Send {
    /// Single-slot registration; `None` detaches the current delegate.
    fn set_delegate(&mut self, delegate: Option<Arc<dyn ChatDelegate>>);
    fn initialize(&mut self) -> InitializeFuture;
    fn open(&mut self);
    fn close(&mut self);
    fn show_launcher(&mut self);
    fn hide_launcher(&mut self);
    fn teardown(&mut self);
}
