use chatlink_widget::ConfigurationError;
use snafu::Snafu;

use super::state::SessionGeneration;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SessionError {
    #[snafu(display("session configuration rejected on `{stage}`: {source}"))]
    InvalidConfiguration {
        stage: &'static str,
        source: ConfigurationError,
    },
    #[snafu(display("initialize request {generation} is still in flight"))]
    Busy {
        stage: &'static str,
        generation: SessionGeneration,
    },
    #[snafu(display("session is already initialized for tenant '{tenant_id}'"))]
    AlreadyInitialized {
        stage: &'static str,
        tenant_id: String,
    },
}

pub type SessionResult<T> = Result<T, SessionError>;
