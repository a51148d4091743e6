use serde::{Deserialize, Serialize};
use snafu::{Snafu, ensure};

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ConfigurationError {
    #[snafu(display("tenant identifier must not be empty"))]
    EmptyTenantId { stage: &'static str },
}

/// Describes how one chat widget session is brought up.
///
/// The value is moved into the session that initializes with it, so it never changes
/// after initialization starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfiguration {
    tenant_id: String,
    #[serde(default)]
    profile_id: Option<String>,
    #[serde(default)]
    debug: bool,
}

impl SessionConfiguration {
    pub fn new(tenant_id: impl Into<String>, profile_id: Option<String>, debug: bool) -> Self {
        Self {
            tenant_id: tenant_id.into().trim().to_string(),
            profile_id: normalize_profile_id(profile_id),
            debug,
        }
    }

    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    pub fn profile_id(&self) -> Option<&str> {
        self.profile_id.as_deref()
    }

    pub fn debug(&self) -> bool {
        self.debug
    }

    /// Rejects configurations that cannot bring up a widget.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        ensure!(
            !self.tenant_id.trim().is_empty(),
            EmptyTenantIdSnafu {
                stage: "validate-session-configuration",
            }
        );
        Ok(())
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }
}

// Hosts collect the profile from free text, where blank means "none".
fn normalize_profile_id(profile_id: Option<String>) -> Option<String> {
    profile_id
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
