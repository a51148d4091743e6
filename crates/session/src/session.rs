use std::sync::{Arc, Weak};

use chatlink_widget::{
    ChatDelegate, InitializeFuture, SessionConfiguration, WidgetHandle, WidgetResult,
    WidgetRuntime,
};
use snafu::ResultExt;
use tokio::sync::{mpsc, watch};

use super::bridge::{
    DelegateBridge, DelegateEvent, RoutedEvent, RoutedEventReceiver, RoutedEventSender,
};
use super::error::{
    AlreadyInitializedSnafu, BusySnafu, InvalidConfigurationSnafu, SessionError, SessionResult,
};
use super::event_log::{EventKind, EventLog, EventLogEntry, Severity};
use super::state::{SessionGeneration, SessionState, SessionTransition, SessionTransitionRejection};

/// How an initialize request ended from the host's point of view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InitializeOutcome {
    Ready,
    Failed { reason: String },
    /// The session was reset or re-initialized before the runtime answered.
    Superseded,
}

impl InitializeOutcome {
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }
}

/// In-flight initialize request returned by [`ChatSession::begin_initialize`].
///
/// It owns no reference to the session, so a host can await it on any task and hand the
/// resolution back to the session's owner.
pub struct PendingInitialize {
    generation: SessionGeneration,
    request: InitializeFuture,
}

impl PendingInitialize {
    pub fn generation(&self) -> SessionGeneration {
        self.generation
    }

    pub async fn wait(self) -> InitializeResolution {
        InitializeResolution {
            generation: self.generation,
            result: self.request.await,
        }
    }
}

/// Answer of the runtime to one initialize request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitializeResolution {
    pub generation: SessionGeneration,
    pub result: WidgetResult<()>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WidgetCommand {
    Open,
    Close,
    ShowLauncher,
    HideLauncher,
}

impl WidgetCommand {
    fn name(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Close => "close",
            Self::ShowLauncher => "show-launcher",
            Self::HideLauncher => "hide-launcher",
        }
    }

    fn log_message(self) -> &'static str {
        match self {
            Self::Open => "📱 Opening chat...",
            Self::Close => "🔒 Closing chat...",
            Self::ShowLauncher => "👁️ Showing launcher...",
            Self::HideLauncher => "🙈 Hiding launcher...",
        }
    }

    fn forward(self, handle: &mut dyn WidgetHandle) {
        match self {
            Self::Open => handle.open(),
            Self::Close => handle.close(),
            Self::ShowLauncher => handle.show_launcher(),
            Self::HideLauncher => handle.hide_launcher(),
        }
    }
}

/// Lifecycle controller for one embedded chat widget.
///
/// All methods are meant to be called from a single owning context. Widget callbacks are
/// queued by the handle's delegate and applied by [`Self::process_pending_events`] or
/// [`Self::next_event`], so they never race the owner's own mutations.
///
/// Hosts must poll one of those two, or callbacks only reach the log and the observer when
/// the next widget command, [`Self::complete_initialize`] or [`Self::reset`] drains them.
pub struct ChatSession {
    runtime: Arc<dyn WidgetRuntime>,
    state: SessionState,
    state_tx: watch::Sender<SessionState>,
    generation: SessionGeneration,
    handle: Option<Box<dyn WidgetHandle>>,
    configuration: Option<SessionConfiguration>,
    delegate: Option<Weak<dyn ChatDelegate>>,
    log: EventLog,
    events_tx: RoutedEventSender,
    events_rx: RoutedEventReceiver,
}

impl ChatSession {
    pub fn new(runtime: Arc<dyn WidgetRuntime>) -> Self {
        Self::with_log(runtime, EventLog::new())
    }

    pub fn with_log_capacity(runtime: Arc<dyn WidgetRuntime>, capacity: usize) -> Self {
        Self::with_log(runtime, EventLog::with_capacity(capacity))
    }

    fn with_log(runtime: Arc<dyn WidgetRuntime>, log: EventLog) -> Self {
        let (state_tx, _) = watch::channel(SessionState::Uninitialized);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            runtime,
            state: SessionState::Uninitialized,
            state_tx,
            generation: SessionGeneration::default(),
            handle: None,
            configuration: None,
            delegate: None,
            log,
            events_tx,
            events_rx,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn status_text(&self) -> &'static str {
        self.state.status_text()
    }

    pub fn status_severity(&self) -> Severity {
        self.state.status_severity()
    }

    pub fn failure_reason(&self) -> Option<&str> {
        self.state.failure_reason()
    }

    pub fn generation(&self) -> SessionGeneration {
        self.generation
    }

    pub fn has_widget(&self) -> bool {
        self.handle.is_some()
    }

    pub fn configuration(&self) -> Option<&SessionConfiguration> {
        self.configuration.as_ref()
    }

    pub fn runtime_name(&self) -> &str {
        self.runtime.name()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    /// Registers a host observer without keeping it alive.
    pub fn register_delegate<D>(&mut self, delegate: &Arc<D>)
    where
        D: ChatDelegate + 'static,
    {
        let weak = Arc::downgrade(delegate);
        let weak: Weak<dyn ChatDelegate> = weak;
        self.delegate = Some(weak);
    }

    /// Same as [`Self::register_delegate`] for hosts holding a type-erased observer.
    pub fn register_dyn_delegate(&mut self, delegate: &Arc<dyn ChatDelegate>) {
        self.delegate = Some(Arc::downgrade(delegate));
    }

    pub fn unregister_delegate(&mut self) {
        self.delegate = None;
    }

    pub fn has_delegate(&self) -> bool {
        self.live_delegate().is_some()
    }

    pub fn log(&self) -> &EventLog {
        &self.log
    }

    pub fn log_snapshot(&self) -> Vec<EventLogEntry> {
        self.log.snapshot()
    }

    pub fn append_log(&mut self, message: impl Into<String>, severity: Severity, kind: EventKind) {
        self.log.append(message, severity, kind);
    }

    pub fn clear_log(&mut self) {
        self.log.clear();
    }

    /// Initializes the widget and waits for the runtime's answer.
    ///
    /// Holding `&mut self` across the await keeps the state machine single-writer. Hosts
    /// that must stay responsive while waiting use [`Self::begin_initialize`] and
    /// [`Self::complete_initialize`] instead.
    pub async fn initialize(
        &mut self,
        configuration: SessionConfiguration,
    ) -> SessionResult<InitializeOutcome> {
        let pending = self.begin_initialize(configuration)?;
        let resolution = pending.wait().await;
        Ok(self.complete_initialize(resolution))
    }

    /// Starts initialization: creates the widget handle, installs the session as its
    /// delegate and issues the runtime's initialize request.
    ///
    /// An empty tenant does nothing to the session: no transition, no log entry and no
    /// widget. It is still reported as [`SessionError::InvalidConfiguration`] so the host can
    /// tell the request was dropped. A request that arrives while another is in flight is
    /// rejected as busy.
    pub fn begin_initialize(
        &mut self,
        configuration: SessionConfiguration,
    ) -> SessionResult<PendingInitialize> {
        configuration.validate().context(InvalidConfigurationSnafu {
            stage: "begin-initialize-validate",
        })?;

        let next_state = self
            .state
            .apply(SessionTransition::BeginInitialize)
            .map_err(|rejection| self.begin_rejection(rejection))?;

        self.generation = self.generation.next();
        let generation = self.generation;
        self.set_state(next_state);

        self.log.append(
            "🚀 Starting initialization...",
            Severity::Info,
            EventKind::General,
        );
        self.log.append(
            format!("   Tenant ID: {}", configuration.tenant_id()),
            Severity::Neutral,
            EventKind::General,
        );
        if let Some(profile_id) = configuration.profile_id() {
            self.log.append(
                format!("   Profile ID: {profile_id}"),
                Severity::Neutral,
                EventKind::General,
            );
        }
        self.log.append(
            format!("   Debug Mode: {}", configuration.debug()),
            Severity::Neutral,
            EventKind::General,
        );

        let mut handle = self.runtime.create(&configuration);
        let bridge: Arc<dyn ChatDelegate> =
            Arc::new(DelegateBridge::new(generation, self.events_tx.clone()));
        handle.set_delegate(Some(bridge));
        self.log.append(
            "✅ Chat instance created",
            Severity::Neutral,
            EventKind::General,
        );

        let request = handle.initialize();

        tracing::info!(
            runtime = %self.runtime.name(),
            tenant_id = %configuration.tenant_id(),
            profile_id = ?configuration.profile_id(),
            debug = configuration.debug(),
            generation = %generation,
            "chat widget initialization started"
        );

        self.handle = Some(handle);
        self.configuration = Some(configuration);

        Ok(PendingInitialize {
            generation,
            request,
        })
    }

    /// Applies the runtime's answer to an initialize request.
    ///
    /// Callbacks queued while the request was in flight are applied first so the log keeps
    /// runtime order. A resolution whose generation is no longer current is discarded.
    pub fn complete_initialize(&mut self, resolution: InitializeResolution) -> InitializeOutcome {
        self.process_pending_events();

        let InitializeResolution { generation, result } = resolution;
        if generation != self.generation {
            tracing::debug!(
                resolved = %generation,
                current = %self.generation,
                "discarding initialize resolution from an abandoned widget handle"
            );
            return InitializeOutcome::Superseded;
        }

        let transition = match &result {
            Ok(()) => SessionTransition::InitializeSucceeded,
            Err(error) => SessionTransition::InitializeFailed {
                reason: error.description().to_string(),
            },
        };
        let next_state = match self.state.apply(transition) {
            Ok(next_state) => next_state,
            Err(rejection) => {
                tracing::debug!(
                    ?rejection,
                    generation = %generation,
                    "initialize resolution arrived outside of initialization"
                );
                return InitializeOutcome::Superseded;
            }
        };
        self.set_state(next_state);

        match result {
            Ok(()) => {
                self.log.append(
                    "✅ Chat initialized successfully!",
                    Severity::Success,
                    EventKind::General,
                );
                self.log.append(
                    "💡 You can now open the chat",
                    Severity::Neutral,
                    EventKind::General,
                );
                tracing::info!(generation = %generation, "chat widget ready");
                InitializeOutcome::Ready
            }
            Err(error) => {
                let reason = error.description().to_string();
                // A failed handle is never reused; the next attempt builds a fresh one.
                self.release_handle();
                self.log.append(
                    format!("❌ Initialization failed: {reason}"),
                    Severity::Error,
                    EventKind::General,
                );
                tracing::warn!(
                    generation = %generation,
                    error = %error,
                    "chat widget initialization failed"
                );
                InitializeOutcome::Failed { reason }
            }
        }
    }

    pub fn open(&mut self) {
        self.issue_command(WidgetCommand::Open);
    }

    pub fn close(&mut self) {
        self.issue_command(WidgetCommand::Close);
    }

    pub fn show_launcher(&mut self) {
        self.issue_command(WidgetCommand::ShowLauncher);
    }

    pub fn hide_launcher(&mut self) {
        self.issue_command(WidgetCommand::HideLauncher);
    }

    /// Tears down the widget and returns to `Uninitialized` from any state.
    ///
    /// The event log is kept; hosts that want a clean slate call [`Self::clear_log`].
    pub fn reset(&mut self) {
        // Callbacks the current widget already sent are applied before it is abandoned.
        self.process_pending_events();
        self.log.append(
            "🔄 Resetting session...",
            Severity::Warning,
            EventKind::General,
        );

        let had_widget = self.release_handle();
        self.configuration = None;
        self.delegate = None;
        // Invalidate the abandoned handle's pending result and callbacks.
        self.generation = self.generation.next();
        self.set_state(SessionState::Uninitialized);

        tracing::info!(
            generation = %self.generation,
            had_widget,
            "chat session reset"
        );
    }

    /// Applies every callback that is already queued. Returns how many were applied.
    pub fn process_pending_events(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(routed) = self.events_rx.try_recv() {
            if self.apply_routed(routed).is_some() {
                applied += 1;
            }
        }
        applied
    }

    /// Waits for the next current-generation callback and applies it.
    pub async fn next_event(&mut self) -> Option<DelegateEvent> {
        loop {
            let routed = self.events_rx.recv().await?;
            if let Some(event) = self.apply_routed(routed) {
                return Some(event);
            }
        }
    }

    fn begin_rejection(&self, rejection: SessionTransitionRejection) -> SessionError {
        match rejection {
            SessionTransitionRejection::InitializeInFlight => BusySnafu {
                stage: "begin-initialize-transition",
                generation: self.generation,
            }
            .build(),
            SessionTransitionRejection::AlreadyReady
            | SessionTransitionRejection::NotInitializing => AlreadyInitializedSnafu {
                stage: "begin-initialize-transition",
                tenant_id: self
                    .configuration
                    .as_ref()
                    .map(|configuration| configuration.tenant_id().to_string())
                    .unwrap_or_default(),
            }
            .build(),
        }
    }

    fn issue_command(&mut self, command: WidgetCommand) {
        self.process_pending_events();
        if !self.state.is_ready() {
            tracing::debug!(
                command = command.name(),
                state = ?self.state,
                "ignoring widget command while session is not ready"
            );
            return;
        }
        let Some(handle) = self.handle.as_mut() else {
            tracing::debug!(
                command = command.name(),
                "ignoring widget command without a widget handle"
            );
            return;
        };

        // Issuance is logged up front; acknowledgement arrives later through the delegate.
        self.log
            .append(command.log_message(), Severity::Neutral, EventKind::General);
        command.forward(handle.as_mut());
        tracing::debug!(command = command.name(), "widget command issued");
    }

    fn apply_routed(&mut self, routed: RoutedEvent) -> Option<DelegateEvent> {
        let RoutedEvent { generation, event } = routed;
        if generation != self.generation {
            tracing::debug!(
                event = event.name(),
                from = %generation,
                current = %self.generation,
                "dropping callback from an abandoned widget handle"
            );
            return None;
        }

        self.log_delegate_event(&event);
        self.forward_to_delegate(&event);
        Some(event)
    }

    fn log_delegate_event(&mut self, event: &DelegateEvent) {
        match event {
            DelegateEvent::Loaded => self.log.append(
                "✅ Delegate: Chat loaded",
                Severity::Success,
                EventKind::Loaded,
            ),
            DelegateEvent::Opened => self.log.append(
                "✅ Delegate: Chat opened",
                Severity::Success,
                EventKind::Opened,
            ),
            DelegateEvent::Closed => self.log.append(
                "✅ Delegate: Chat closed",
                Severity::Warning,
                EventKind::Closed,
            ),
            DelegateEvent::Error(error) => {
                // Runtime errors are reported, not fatal; the widget may recover on its own.
                tracing::warn!(
                    error = %error,
                    state = ?self.state,
                    "widget runtime reported an error"
                );
                self.log.append(
                    format!("❌ Delegate: Error - {}", error.description()),
                    Severity::Error,
                    EventKind::Error,
                );
            }
            DelegateEvent::Notification(notification) => self.log.append(
                format!("🔔 Delegate: Notification received - {}", notification.id),
                Severity::Info,
                EventKind::Notification,
            ),
        }
    }

    fn forward_to_delegate(&self, event: &DelegateEvent) {
        let Some(delegate) = self.live_delegate() else {
            return;
        };
        match event {
            DelegateEvent::Loaded => delegate.did_load(),
            DelegateEvent::Opened => delegate.did_open(),
            DelegateEvent::Closed => delegate.did_close(),
            DelegateEvent::Error(error) => delegate.did_receive_error(error),
            DelegateEvent::Notification(notification) => {
                delegate.did_receive_notification(notification)
            }
        }
    }

    fn live_delegate(&self) -> Option<Arc<dyn ChatDelegate>> {
        self.delegate.as_ref().and_then(Weak::upgrade)
    }

    fn release_handle(&mut self) -> bool {
        match self.handle.take() {
            Some(mut handle) => {
                handle.set_delegate(None);
                handle.teardown();
                true
            }
            None => false,
        }
    }

    fn set_state(&mut self, state: SessionState) {
        self.state_tx.send_replace(state.clone());
        self.state = state;
    }
}

impl Drop for ChatSession {
    fn drop(&mut self) {
        if self.release_handle() {
            tracing::debug!(generation = %self.generation, "released widget handle on drop");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use chatlink_widget::{
        ChatNotification, InitializePlan, ScriptedBehavior, ScriptedRuntime, WidgetCall,
        WidgetError,
    };

    use super::*;

    #[derive(Default)]
    struct RecordingDelegate {
        seen: Mutex<Vec<String>>,
    }

    impl RecordingDelegate {
        fn seen(&self) -> Vec<String> {
            self.seen.lock().expect("delegate lock").clone()
        }

        fn record(&self, entry: impl Into<String>) {
            self.seen.lock().expect("delegate lock").push(entry.into());
        }
    }

    impl ChatDelegate for RecordingDelegate {
        fn did_load(&self) {
            self.record("loaded");
        }

        fn did_open(&self) {
            self.record("opened");
        }

        fn did_close(&self) {
            self.record("closed");
        }

        fn did_receive_error(&self, error: &WidgetError) {
            self.record(format!("error:{}", error.description()));
        }

        fn did_receive_notification(&self, notification: &ChatNotification) {
            self.record(format!("notification:{}", notification.id));
        }
    }

    fn session_with(behavior: ScriptedBehavior) -> (ChatSession, ScriptedRuntime) {
        let runtime = ScriptedRuntime::new(behavior);
        let session = ChatSession::new(Arc::new(runtime.clone()));
        (session, runtime)
    }

    fn acme() -> SessionConfiguration {
        SessionConfiguration::new("acme", None, true)
    }

    fn messages(session: &ChatSession) -> Vec<String> {
        session
            .log()
            .iter()
            .map(|entry| entry.message().to_string())
            .collect()
    }

    fn count_containing(session: &ChatSession, needle: &str) -> usize {
        session
            .log()
            .iter()
            .filter(|entry| entry.message().contains(needle))
            .count()
    }

    #[tokio::test]
    async fn open_and_reset_drive_the_widget() {
        let (mut session, runtime) = session_with(ScriptedBehavior::default());
        let probe = runtime.probe();

        let outcome = session.initialize(acme()).await.expect("valid configuration");
        assert_eq!(outcome, InitializeOutcome::Ready);
        assert_eq!(session.state(), &SessionState::Ready);
        assert_eq!(session.status_text(), "Ready");

        session.open();
        assert_eq!(probe.count(WidgetCall::Open), 1);
        assert_eq!(count_containing(&session, "Opening chat"), 1);

        session.reset();
        assert_eq!(session.state(), &SessionState::Uninitialized);
        assert!(!session.has_widget());
        assert!(session.configuration().is_none());
        assert_eq!(probe.count(WidgetCall::Teardown), 1);
    }

    #[tokio::test]
    async fn every_command_reaches_its_own_widget_call() {
        let (mut session, runtime) = session_with(ScriptedBehavior::silent());
        let probe = runtime.probe();
        session.initialize(acme()).await.expect("valid configuration");

        session.open();
        session.close();
        session.show_launcher();
        session.hide_launcher();

        assert_eq!(
            probe.calls()[3..].to_vec(),
            vec![
                WidgetCall::Open,
                WidgetCall::Close,
                WidgetCall::ShowLauncher,
                WidgetCall::HideLauncher,
            ]
        );
        assert_eq!(
            messages(&session)[..4].to_vec(),
            vec![
                "🙈 Hiding launcher...",
                "👁️ Showing launcher...",
                "🔒 Closing chat...",
                "📱 Opening chat...",
            ]
        );
    }

    #[tokio::test]
    async fn queued_callbacks_are_applied_by_the_next_command() {
        let (mut session, runtime) = session_with(ScriptedBehavior::silent());
        let probe = runtime.probe();
        session.initialize(acme()).await.expect("valid configuration");

        assert!(probe.notify(&ChatNotification::new("n-7")));
        session.show_launcher();

        let messages = messages(&session);
        assert_eq!(messages[0], "👁️ Showing launcher...");
        assert_eq!(messages[1], "🔔 Delegate: Notification received - n-7");
        assert_eq!(session.process_pending_events(), 0);
    }

    #[tokio::test]
    async fn reset_applies_callbacks_sent_before_it() {
        let (mut session, runtime) = session_with(ScriptedBehavior::silent());
        let probe = runtime.probe();
        session.initialize(acme()).await.expect("valid configuration");

        assert!(probe.notify(&ChatNotification::new("last-words")));
        session.reset();

        assert_eq!(count_containing(&session, "last-words"), 1);
        assert_eq!(
            session.log().latest().map(EventLogEntry::message),
            Some("🔄 Resetting session...")
        );
        assert_eq!(session.process_pending_events(), 0);
    }

    #[tokio::test]
    async fn type_erased_delegate_can_be_registered() {
        let (mut session, runtime) = session_with(ScriptedBehavior::default());
        let recording = Arc::new(RecordingDelegate::default());
        let host: Arc<dyn ChatDelegate> = recording.clone();
        session.register_dyn_delegate(&host);
        drop(host);
        assert!(session.has_delegate());

        session.initialize(acme()).await.expect("valid configuration");
        runtime.probe().notify(&ChatNotification::new("n-2"));
        session.process_pending_events();

        assert_eq!(recording.seen(), vec!["loaded", "notification:n-2"]);
        drop(recording);
        assert!(!session.has_delegate());
    }

    #[tokio::test]
    async fn empty_tenant_leaves_session_untouched() {
        let (mut session, runtime) = session_with(ScriptedBehavior::default());

        let error = session
            .initialize(SessionConfiguration::new("", None, false))
            .await
            .expect_err("empty tenant is rejected");

        assert!(matches!(error, SessionError::InvalidConfiguration { .. }));
        assert_eq!(session.state(), &SessionState::Uninitialized);
        assert!(session.log().is_empty());
        assert_eq!(runtime.probe().handles_created(), 0);
        assert_eq!(session.generation(), SessionGeneration::default());
    }

    #[test]
    fn commands_are_ignored_before_initialization() {
        let (mut session, runtime) = session_with(ScriptedBehavior::default());

        session.open();
        session.close();
        session.show_launcher();
        session.hide_launcher();

        assert!(runtime.probe().calls().is_empty());
        assert!(session.log().is_empty());
    }

    #[tokio::test]
    async fn initialize_passes_through_initializing_once() {
        let (mut session, runtime) = session_with(ScriptedBehavior::manual());
        let probe = runtime.probe();
        let mut states = session.subscribe_state();

        let pending = session.begin_initialize(acme()).expect("valid configuration");
        assert_eq!(session.state(), &SessionState::Initializing);
        assert_eq!(*states.borrow_and_update(), SessionState::Initializing);
        assert!(session.has_widget());

        // Commands stay gated until the runtime answers.
        session.open();
        assert_eq!(probe.count(WidgetCall::Open), 0);

        assert!(probe.resolve_initialize(Ok(())));
        let outcome = session.complete_initialize(pending.wait().await);

        assert_eq!(outcome, InitializeOutcome::Ready);
        assert_eq!(*states.borrow_and_update(), SessionState::Ready);
        assert_eq!(count_containing(&session, "Starting initialization"), 1);
        assert_eq!(
            probe.calls(),
            vec![
                WidgetCall::Create,
                WidgetCall::AttachDelegate,
                WidgetCall::Initialize,
            ]
        );
    }

    #[tokio::test]
    async fn failed_initialize_releases_the_handle_and_allows_retry() {
        let (mut session, runtime) = session_with(ScriptedBehavior::failing("tenant not found"));
        let probe = runtime.probe();

        let outcome = session.initialize(acme()).await.expect("valid configuration");
        assert_eq!(
            outcome,
            InitializeOutcome::Failed {
                reason: "tenant not found".to_string()
            }
        );
        assert_eq!(session.failure_reason(), Some("tenant not found"));
        assert_eq!(session.status_text(), "Initialization failed");
        assert!(!session.has_widget());
        assert_eq!(probe.count(WidgetCall::Teardown), 1);

        let latest = session.log().latest().expect("failure is logged");
        assert_eq!(latest.severity(), Severity::Error);
        assert_eq!(latest.message(), "❌ Initialization failed: tenant not found");

        session.open();
        assert_eq!(probe.count(WidgetCall::Open), 0);

        probe.set_plan(InitializePlan::Succeed);
        let outcome = session.initialize(acme()).await.expect("retry is allowed");
        assert!(outcome.is_ready());
        assert_eq!(probe.handles_created(), 2);
    }

    #[tokio::test]
    async fn late_resolution_after_reset_is_ignored() {
        let (mut session, runtime) = session_with(ScriptedBehavior::manual());
        let probe = runtime.probe();

        let pending = session.begin_initialize(acme()).expect("valid configuration");
        session.reset();
        assert_eq!(probe.count(WidgetCall::Teardown), 1);

        assert!(probe.resolve_initialize(Ok(())));
        let outcome = session.complete_initialize(pending.wait().await);
        assert_eq!(outcome, InitializeOutcome::Superseded);
        assert_eq!(session.state(), &SessionState::Uninitialized);
        assert_eq!(count_containing(&session, "initialized successfully"), 0);

        probe.set_plan(InitializePlan::Succeed);
        let outcome = session.initialize(acme()).await.expect("fresh initialize");
        assert_eq!(outcome, InitializeOutcome::Ready);
    }

    #[tokio::test]
    async fn second_initialize_while_in_flight_is_busy() {
        let (mut session, runtime) = session_with(ScriptedBehavior::manual());

        let _pending = session.begin_initialize(acme()).expect("first request");
        let generation = session.generation();
        let error = session
            .begin_initialize(acme())
            .err()
            .expect("second request is rejected");

        assert!(matches!(error, SessionError::Busy { generation: busy, .. } if busy == generation));
        assert_eq!(runtime.probe().handles_created(), 1);
        assert_eq!(session.state(), &SessionState::Initializing);
    }

    #[tokio::test]
    async fn initialize_when_ready_is_rejected() {
        let (mut session, _runtime) = session_with(ScriptedBehavior::default());
        session.initialize(acme()).await.expect("first initialize");

        let error = session
            .initialize(acme())
            .await
            .expect_err("already initialized");
        assert!(matches!(
            error,
            SessionError::AlreadyInitialized { ref tenant_id, .. } if tenant_id == "acme"
        ));
    }

    #[tokio::test]
    async fn load_callback_is_logged_before_readiness() {
        let (mut session, _runtime) = session_with(ScriptedBehavior::default());
        session.initialize(acme()).await.expect("valid configuration");

        let messages = messages(&session);
        assert_eq!(messages[0], "💡 You can now open the chat");
        assert_eq!(messages[1], "✅ Chat initialized successfully!");
        assert_eq!(messages[2], "✅ Delegate: Chat loaded");
    }

    #[tokio::test]
    async fn notifications_are_logged_in_any_state() {
        let (mut session, runtime) = session_with(ScriptedBehavior::manual());
        let probe = runtime.probe();

        let pending = session.begin_initialize(acme()).expect("valid configuration");
        let bridge = probe.current_delegate().expect("session installed its delegate");

        bridge.did_receive_notification(&ChatNotification::new("early"));
        assert_eq!(session.process_pending_events(), 1);
        assert_eq!(session.state(), &SessionState::Initializing);

        assert!(probe.resolve_initialize(Err(WidgetError::initialization_rejected("offline"))));
        session.complete_initialize(pending.wait().await);
        assert!(matches!(
            session.state(),
            SessionState::InitializationFailed { .. }
        ));

        let before = session.log().len();
        bridge.did_receive_notification(&ChatNotification::new("late"));
        assert_eq!(session.process_pending_events(), 1);
        assert_eq!(session.log().len(), before + 1);

        let latest = session.log().latest().expect("notification entry");
        assert_eq!(latest.kind(), EventKind::Notification);
        assert_eq!(latest.message(), "🔔 Delegate: Notification received - late");
        assert_eq!(session.failure_reason(), Some("offline"));

        let notifications = session
            .log()
            .iter()
            .filter(|entry| entry.kind() == EventKind::Notification)
            .count();
        assert_eq!(notifications, 2);
    }

    #[tokio::test]
    async fn callbacks_from_abandoned_handle_are_dropped() {
        let (mut session, runtime) = session_with(ScriptedBehavior::silent());
        session.initialize(acme()).await.expect("valid configuration");
        let bridge = runtime.probe().current_delegate().expect("delegate installed");

        session.reset();
        bridge.did_open();
        bridge.did_receive_notification(&ChatNotification::new("stale"));

        assert_eq!(session.process_pending_events(), 0);
        assert_eq!(count_containing(&session, "Delegate:"), 0);
    }

    #[tokio::test]
    async fn runtime_errors_are_logged_without_changing_state() {
        let (mut session, runtime) = session_with(ScriptedBehavior::silent());
        session.initialize(acme()).await.expect("valid configuration");

        assert!(runtime.probe().report_error(&WidgetError::runtime("socket closed")));
        assert_eq!(session.process_pending_events(), 1);

        assert_eq!(session.state(), &SessionState::Ready);
        let latest = session.log().latest().expect("error entry");
        assert_eq!(latest.severity(), Severity::Error);
        assert_eq!(latest.kind(), EventKind::Error);
        assert_eq!(latest.message(), "❌ Delegate: Error - socket closed");
    }

    #[tokio::test]
    async fn host_delegate_receives_forwarded_callbacks_without_being_owned() {
        let (mut session, runtime) = session_with(ScriptedBehavior::default());
        let host = Arc::new(RecordingDelegate::default());
        session.register_delegate(&host);
        assert!(session.has_delegate());

        session.initialize(acme()).await.expect("valid configuration");
        session.open();
        assert_eq!(session.next_event().await, Some(DelegateEvent::Opened));
        runtime.probe().notify(&ChatNotification::new("n-1"));
        session.process_pending_events();

        assert_eq!(host.seen(), vec!["loaded", "opened", "notification:n-1"]);
        assert_eq!(Arc::strong_count(&host), 1);

        drop(host);
        assert!(!session.has_delegate());
        session.close();
        assert_eq!(session.process_pending_events(), 1);
        assert_eq!(count_containing(&session, "Chat closed"), 1);
    }

    #[tokio::test]
    async fn reset_clears_registration_but_keeps_history() {
        let (mut session, _runtime) = session_with(ScriptedBehavior::default());
        let host = Arc::new(RecordingDelegate::default());
        session.register_delegate(&host);
        session.initialize(acme()).await.expect("valid configuration");
        let logged = session.log().len();

        session.reset();

        assert!(!session.has_delegate());
        assert_eq!(session.log().len(), logged + 1);
        assert_eq!(
            session.log().latest().map(EventLogEntry::severity),
            Some(Severity::Warning)
        );

        session.clear_log();
        assert!(session.log_snapshot().is_empty());
    }

    #[tokio::test]
    async fn reset_from_every_state_returns_to_uninitialized() {
        let (mut session, runtime) = session_with(ScriptedBehavior::manual());
        let probe = runtime.probe();

        session.reset();
        assert_eq!(session.state(), &SessionState::Uninitialized);

        let _pending = session.begin_initialize(acme()).expect("valid configuration");
        session.reset();
        assert_eq!(session.state(), &SessionState::Uninitialized);

        probe.set_plan(InitializePlan::Fail("offline".to_string()));
        session.initialize(acme()).await.expect("valid configuration");
        session.reset();
        assert_eq!(session.state(), &SessionState::Uninitialized);

        probe.set_plan(InitializePlan::Succeed);
        session.initialize(acme()).await.expect("valid configuration");
        session.reset();
        assert_eq!(session.state(), &SessionState::Uninitialized);
        assert!(!session.has_widget());

        // One teardown for the abandoned handle, one for the failed one, one for the ready one.
        assert_eq!(probe.count(WidgetCall::Teardown), 3);
    }

    #[test]
    fn dropping_the_session_tears_the_widget_down() {
        let runtime = ScriptedRuntime::new(ScriptedBehavior::manual());
        let probe = runtime.probe();
        let mut session = ChatSession::new(Arc::new(runtime));

        let _pending = session.begin_initialize(acme()).expect("valid configuration");
        drop(session);

        assert_eq!(probe.count(WidgetCall::Teardown), 1);
    }

    #[test]
    fn log_capacity_is_configurable() {
        let runtime = ScriptedRuntime::default();
        let mut session = ChatSession::with_log_capacity(Arc::new(runtime), 2);
        for index in 0..5 {
            session.append_log(format!("host-{index}"), Severity::Info, EventKind::General);
        }
        assert_eq!(messages(&session), vec!["host-4", "host-3"]);
    }
}
