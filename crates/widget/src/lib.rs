#![deny(unsafe_code)]

//! Contract between a chat session controller and the embeddable widget runtime it drives.

pub mod config;
pub mod delegate;
pub mod runtime;
/// In-memory runtime for tests and the terminal demo.
pub mod scripted;

pub use config::{ConfigurationError, SessionConfiguration};
pub use delegate::{ChatDelegate, ChatNotification};
pub use runtime::{InitializeFuture, WidgetError, WidgetHandle, WidgetResult, WidgetRuntime};
pub use scripted::{
    InitializePlan, SCRIPTED_RUNTIME_NAME, ScriptedBehavior, ScriptedProbe, ScriptedRuntime,
    WidgetCall,
};
