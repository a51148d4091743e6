use std::sync::Arc;

use chatlink_session::{
    ChatDelegate, ChatNotification, ChatSession, EventKind, InitializeOutcome,
    InitializeResolution, Severity, WidgetError,
};
use chatlink_widget::{ScriptedProbe, ScriptedRuntime};
use snafu::{ResultExt, Snafu};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use crate::command::{Command, HELP, TEST_TENANT_ID};
use crate::settings::{DemoSettings, SettingsStore};

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum HostError {
    #[snafu(display("failed to read command input on `{stage}`: {source}"))]
    ReadInput {
        stage: &'static str,
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Prints widget callbacks as they are relayed by the session.
struct CallbackPrinter;

impl ChatDelegate for CallbackPrinter {
    fn did_load(&self) {
        println!("  ↳ chat loaded");
    }

    fn did_open(&self) {
        println!("  ↳ chat opened");
    }

    fn did_close(&self) {
        println!("  ↳ chat closed");
    }

    fn did_receive_error(&self, error: &WidgetError) {
        println!("  ↳ widget error: {}", error.description());
    }

    fn did_receive_notification(&self, notification: &ChatNotification) {
        println!("  ↳ notification {}", notification.id);
    }
}

/// Terminal host that owns one chat session and feeds it typed commands.
pub struct DemoHost {
    session: ChatSession,
    probe: ScriptedProbe,
    store: SettingsStore,
    draft: DemoSettings,
    printer: Arc<CallbackPrinter>,
    resolutions_tx: mpsc::UnboundedSender<InitializeResolution>,
    resolutions_rx: Option<mpsc::UnboundedReceiver<InitializeResolution>>,
}

impl DemoHost {
    pub fn new(store: SettingsStore) -> Self {
        let draft = (*store.settings()).clone();
        let runtime = ScriptedRuntime::new(draft.runtime_behavior());
        let probe = runtime.probe();
        let session = ChatSession::with_log_capacity(Arc::new(runtime), draft.log_capacity);
        let (resolutions_tx, resolutions_rx) = mpsc::unbounded_channel();

        Self {
            session,
            probe,
            store,
            draft,
            printer: Arc::new(CallbackPrinter),
            resolutions_tx,
            resolutions_rx: Some(resolutions_rx),
        }
    }

    /// Reads commands from stdin until `quit` or end of input.
    ///
    /// Widget callbacks and initialize results are applied between commands, so the session
    /// is only ever touched from this loop.
    pub async fn run(&mut self) -> Result<(), HostError> {
        let Some(mut resolutions_rx) = self.resolutions_rx.take() else {
            return Ok(());
        };
        let mut lines = BufReader::new(tokio::io::stdin()).lines();

        println!("{HELP}");
        self.print_status();

        loop {
            tokio::select! {
                line = lines.next_line() => {
                    let line = line.context(ReadInputSnafu { stage: "read-command-line" })?;
                    let Some(line) = line else {
                        break;
                    };
                    if line.trim().is_empty() {
                        continue;
                    }
                    if self.handle_line(&line) == Flow::Quit {
                        break;
                    }
                }
                Some(resolution) = resolutions_rx.recv() => {
                    self.finish_initialize(resolution);
                }
                Some(event) = self.session.next_event() => {
                    tracing::debug!(event = event.name(), "widget callback applied");
                }
            }
        }

        Ok(())
    }

    pub fn handle_line(&mut self, line: &str) -> Flow {
        match line.parse::<Command>() {
            Ok(command) => self.handle_command(command),
            Err(error) => {
                println!("{error}");
                Flow::Continue
            }
        }
    }

    pub fn handle_command(&mut self, command: Command) -> Flow {
        match command {
            Command::Tenant(tenant_id) => {
                self.draft.tenant_id = tenant_id;
            }
            Command::Profile(profile_id) => {
                self.draft.profile_id = profile_id;
                if self.draft.profile_id.is_some() {
                    self.session.append_log(
                        "📋 Profile ID set",
                        Severity::Neutral,
                        EventKind::General,
                    );
                }
            }
            Command::Debug(debug) => {
                self.draft.debug = debug;
            }
            Command::UseTestTenant => {
                self.draft.tenant_id = TEST_TENANT_ID.to_string();
                self.session.append_log(
                    "🧪 Using test tenant ID",
                    Severity::Neutral,
                    EventKind::General,
                );
            }
            Command::Init => self.start_initialize(),
            Command::Open => self.session.open(),
            Command::Close => self.session.close(),
            Command::ShowLauncher => self.session.show_launcher(),
            Command::HideLauncher => self.session.hide_launcher(),
            Command::Reset => self.reset(),
            Command::ClearLog => self.session.clear_log(),
            Command::PrintLog => self.print_log(),
            Command::Status => self.print_status(),
            Command::Notify(id) => {
                if !self.probe.notify(&ChatNotification::new(id)) {
                    println!("no widget is listening; run `init` first");
                }
            }
            Command::Save => self.save(),
            Command::Help => println!("{HELP}"),
            Command::Quit => return Flow::Quit,
        }
        Flow::Continue
    }

    /// Refused while the tenant is empty or a request is already running.
    fn start_initialize(&mut self) {
        if self.draft.tenant_id.trim().is_empty() {
            println!("enter a tenant ID first (or use `test-id`)");
            return;
        }
        if self.session.state().is_initializing() {
            println!("initialization is already in progress");
            return;
        }

        self.session.register_delegate(&self.printer);
        match self.session.begin_initialize(self.draft.to_configuration()) {
            Ok(pending) => {
                let resolutions_tx = self.resolutions_tx.clone();
                tokio::spawn(async move {
                    let resolution = pending.wait().await;
                    if resolutions_tx.send(resolution).is_err() {
                        tracing::debug!("host stopped before initialization resolved");
                    }
                });
                self.print_status();
            }
            Err(error) => {
                tracing::warn!(error = %error, "initialize request refused");
                println!("⚠️  {error}");
            }
        }
    }

    pub fn finish_initialize(&mut self, resolution: InitializeResolution) {
        match self.session.complete_initialize(resolution) {
            InitializeOutcome::Ready => self.print_status(),
            InitializeOutcome::Failed { reason } => {
                self.print_status();
                println!("⚠️  Error: {reason}");
            }
            InitializeOutcome::Superseded => {
                tracing::debug!("ignored initialize result for a reset session");
            }
        }
    }

    fn reset(&mut self) {
        self.session.reset();
        if self.store.settings().clear_log_on_reset {
            self.session.clear_log();
        }
        self.print_status();
    }

    fn save(&mut self) {
        let mut settings = (*self.store.settings()).clone();
        settings.tenant_id = self.draft.tenant_id.clone();
        settings.profile_id = self.draft.profile_id.clone();
        settings.debug = self.draft.debug;

        match self.store.update(settings) {
            Ok(()) => println!("saved settings to {}", self.store.config_path().display()),
            Err(error) => {
                tracing::error!(error = %error, "failed to save settings");
                println!("⚠️  {error}");
            }
        }
    }

    fn print_status(&self) {
        let indicator = match self.session.status_severity() {
            Severity::Success => "🟢",
            Severity::Warning => "🟠",
            Severity::Neutral | Severity::Info | Severity::Error => "🔴",
        };
        println!("{indicator} {}", self.session.status_text());
        if !self.session.state().is_ready() && !self.session.state().is_initializing() {
            let tenant = if self.draft.tenant_id.is_empty() {
                "<unset>"
            } else {
                self.draft.tenant_id.as_str()
            };
            println!(
                "   tenant: {tenant}  profile: {}  debug: {}",
                self.draft.profile_id.as_deref().unwrap_or("<none>"),
                self.draft.debug
            );
        }
    }

    fn print_log(&self) {
        if self.session.log().is_empty() {
            println!("(event log is empty)");
            return;
        }
        for entry in self.session.log().iter() {
            println!("{entry}");
        }
    }
}
