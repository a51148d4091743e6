use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use chatlink_session::{DEFAULT_EVENT_LOG_CAPACITY, SessionConfiguration};
use chatlink_widget::{InitializePlan, ScriptedBehavior};
use figment::{
    Figment,
    providers::{Env, Format, Json, Serialized},
};
use serde::{Deserialize, Serialize};
use snafu::{ResultExt, Snafu};

pub const SETTINGS_DIRECTORY_NAME: &str = "chatlink";
pub const SETTINGS_FILE_NAME: &str = "settings.json";
pub const SETTINGS_ENV_PREFIX: &str = "CHATLINK_";
/// Upper bound for the event log size read from settings.
pub const MAX_LOG_CAPACITY: usize = 10_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DemoSettings {
    #[serde(default)]
    pub tenant_id: String,
    #[serde(default)]
    pub profile_id: Option<String>,
    #[serde(default = "default_debug")]
    pub debug: bool,
    #[serde(default = "default_log_capacity")]
    pub log_capacity: usize,
    /// Wipe the event log whenever the session is reset.
    #[serde(default = "default_clear_log_on_reset")]
    pub clear_log_on_reset: bool,
    #[serde(default)]
    pub init_delay_ms: u64,
    /// When set, the scripted runtime rejects initialization with this reason.
    #[serde(default)]
    pub simulate_failure: Option<String>,
}

impl Default for DemoSettings {
    fn default() -> Self {
        Self {
            tenant_id: String::new(),
            profile_id: None,
            debug: default_debug(),
            log_capacity: default_log_capacity(),
            clear_log_on_reset: default_clear_log_on_reset(),
            init_delay_ms: 0,
            simulate_failure: None,
        }
    }
}

impl DemoSettings {
    pub fn normalized(mut self) -> Self {
        self.tenant_id = self.tenant_id.trim().to_string();
        self.profile_id = self
            .profile_id
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());
        self.log_capacity = self.log_capacity.clamp(1, MAX_LOG_CAPACITY);
        self.simulate_failure = self
            .simulate_failure
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());
        self
    }

    pub fn to_configuration(&self) -> SessionConfiguration {
        SessionConfiguration::new(&self.tenant_id, self.profile_id.clone(), self.debug)
    }

    pub fn runtime_behavior(&self) -> ScriptedBehavior {
        let plan = match &self.simulate_failure {
            Some(reason) => InitializePlan::Fail(reason.clone()),
            None => InitializePlan::Succeed,
        };
        ScriptedBehavior {
            plan,
            ..ScriptedBehavior::default()
        }
        .with_delay(Duration::from_millis(self.init_delay_ms))
    }
}

pub struct SettingsStore {
    settings: Arc<ArcSwap<DemoSettings>>,
    config_path: PathBuf,
}

impl SettingsStore {
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|path| path.join(SETTINGS_DIRECTORY_NAME))
            .unwrap_or_else(|| PathBuf::from(".chatlink"))
    }

    pub fn default_config_path() -> PathBuf {
        Self::default_config_dir().join(SETTINGS_FILE_NAME)
    }

    pub fn new(config_path: PathBuf) -> Self {
        let settings = Self::load_layers(&config_path);
        Self {
            settings: Arc::new(ArcSwap::from_pointee(settings)),
            config_path,
        }
    }

    pub fn load() -> Self {
        Self::new(Self::default_config_path())
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn settings(&self) -> Arc<DemoSettings> {
        self.settings.load_full()
    }

    pub fn update(&self, settings: DemoSettings) -> Result<(), SettingsError> {
        let normalized_settings = settings.normalized();
        self.persist(&normalized_settings)?;
        self.settings.store(Arc::new(normalized_settings));
        Ok(())
    }

    /// Defaults, then the settings file, then `CHATLINK_*` environment overrides.
    fn load_layers(path: &Path) -> DemoSettings {
        let mut figment = Figment::from(Serialized::defaults(DemoSettings::default()));
        if path.exists() {
            figment = figment.merge(Json::file(path));
        } else {
            tracing::info!("settings file not found at {:?}, using defaults", path);
        }
        figment = figment.merge(Env::prefixed(SETTINGS_ENV_PREFIX));

        match figment.extract::<DemoSettings>() {
            Ok(settings) => settings.normalized(),
            Err(error) => {
                tracing::warn!(
                    "failed to parse settings from {:?}: {}. using defaults",
                    path,
                    error
                );
                DemoSettings::default()
            }
        }
    }

    fn persist(&self, settings: &DemoSettings) -> Result<(), SettingsError> {
        if let Some(parent) = self.config_path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).context(CreateDirSnafu {
                stage: "create-settings-directory",
                path: parent.to_path_buf(),
            })?;
        }

        let content = serde_json::to_string_pretty(settings).context(SerializeConfigSnafu {
            stage: "serialize-settings-json",
        })?;

        let temp_path = self.config_path.with_extension("json.tmp");
        std::fs::write(&temp_path, content).context(WriteFileSnafu {
            stage: "write-temporary-settings-file",
            path: temp_path.clone(),
        })?;

        std::fs::rename(&temp_path, &self.config_path).context(RenameTempFileSnafu {
            stage: "rename-temporary-settings-file",
            from: temp_path,
            to: self.config_path.clone(),
        })?;

        tracing::info!("saved settings to {:?}", self.config_path);
        Ok(())
    }
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SettingsError {
    #[snafu(display("failed to create settings directory at {path:?} on `{stage}`: {source}"))]
    CreateDir {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("failed to serialize settings on `{stage}`: {source}"))]
    SerializeConfig {
        stage: &'static str,
        source: serde_json::Error,
    },
    #[snafu(display("failed to write settings file at {path:?} on `{stage}`: {source}"))]
    WriteFile {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display(
        "failed to replace settings file from {from:?} to {to:?} on `{stage}`: {source}"
    ))]
    RenameTempFile {
        stage: &'static str,
        from: PathBuf,
        to: PathBuf,
        source: std::io::Error,
    },
}

fn default_debug() -> bool {
    true
}

fn default_log_capacity() -> usize {
    DEFAULT_EVENT_LOG_CAPACITY
}

fn default_clear_log_on_reset() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use figment::Jail;

    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        Jail::expect_with(|_jail| {
            let store = SettingsStore::new(PathBuf::from("absent.json"));
            assert_eq!(*store.settings(), DemoSettings::default());
            Ok(())
        });
    }

    #[test]
    fn environment_overrides_file() {
        Jail::expect_with(|jail| {
            jail.create_file(
                SETTINGS_FILE_NAME,
                r#"{ "tenant_id": " acme ", "profile_id": "  ", "log_capacity": 0 }"#,
            )?;
            jail.set_env("CHATLINK_DEBUG", "false");
            jail.set_env("CHATLINK_SIMULATE_FAILURE", "tenant disabled");

            let settings = SettingsStore::new(PathBuf::from(SETTINGS_FILE_NAME)).settings();
            assert_eq!(settings.tenant_id, "acme");
            assert_eq!(settings.profile_id, None);
            assert!(!settings.debug);
            assert_eq!(settings.log_capacity, 1);
            assert_eq!(
                settings.runtime_behavior().plan,
                InitializePlan::Fail("tenant disabled".to_string())
            );
            Ok(())
        });
    }

    #[test]
    fn oversized_log_capacity_is_clamped() {
        Jail::expect_with(|jail| {
            jail.set_env("CHATLINK_LOG_CAPACITY", usize::MAX.to_string());

            let settings = SettingsStore::new(PathBuf::from("absent.json")).settings();
            assert_eq!(settings.log_capacity, MAX_LOG_CAPACITY);
            Ok(())
        });
    }

    #[test]
    fn update_persists_and_swaps_settings() {
        Jail::expect_with(|_jail| {
            let path = PathBuf::from("nested").join(SETTINGS_FILE_NAME);
            let store = SettingsStore::new(path.clone());
            let settings = DemoSettings {
                tenant_id: "acme".to_string(),
                profile_id: Some("vip".to_string()),
                ..DemoSettings::default()
            };

            store.update(settings.clone()).expect("settings persisted");
            assert_eq!(*store.settings(), settings);
            assert_eq!(*SettingsStore::new(path).settings(), settings);
            Ok(())
        });
    }

    #[test]
    fn settings_map_to_session_configuration() {
        let settings = DemoSettings {
            tenant_id: "acme".to_string(),
            debug: false,
            ..DemoSettings::default()
        };
        let configuration = settings.to_configuration();
        assert_eq!(configuration.tenant_id(), "acme");
        assert_eq!(configuration.profile_id(), None);
        assert!(!configuration.debug());
        assert_eq!(settings.runtime_behavior().plan, InitializePlan::Succeed);
    }
}
