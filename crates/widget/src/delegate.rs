use serde::{Deserialize, Serialize};

use super::runtime::WidgetError;

/// Inbound notification reported by the widget runtime, passed through untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatNotification {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
}

impl ChatNotification {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: None,
            body: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }
}

/// Lifecycle callbacks the widget runtime delivers to whoever is registered on a handle.
///
/// Callbacks may fire on any thread and at any point after initialization begins,
/// so implementations must not assume they run on the context that issued commands.
pub trait ChatDelegate: Send + Sync {
    fn did_load(&self) {}

    fn did_open(&self) {}

    fn did_close(&self) {}

    fn did_receive_error(&self, _error: &WidgetError) {}

    fn did_receive_notification(&self, _notification: &ChatNotification) {}
}
