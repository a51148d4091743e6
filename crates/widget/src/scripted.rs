use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::oneshot;

use super::config::SessionConfiguration;
use super::delegate::{ChatDelegate, ChatNotification};
use super::runtime::{InitializeFuture, WidgetError, WidgetHandle, WidgetResult, WidgetRuntime};

pub const SCRIPTED_RUNTIME_NAME: &str = "scripted";

/// Every interaction a [`ScriptedRuntime`] observed, in call order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WidgetCall {
    Create,
    AttachDelegate,
    DetachDelegate,
    Initialize,
    Open,
    Close,
    ShowLauncher,
    HideLauncher,
    Teardown,
}

/// How the next `initialize` request resolves.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum InitializePlan {
    #[default]
    Succeed,
    Fail(String),
    /// Parks the request until [`ScriptedProbe::resolve_initialize`] is called.
    Manual,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptedBehavior {
    pub plan: InitializePlan,
    pub delay: Duration,
    /// Report `did_load` once initialization succeeds.
    pub report_load: bool,
    /// Acknowledge `open`/`close` through the delegate.
    pub echo_visibility: bool,
}

impl Default for ScriptedBehavior {
    fn default() -> Self {
        Self {
            plan: InitializePlan::Succeed,
            delay: Duration::ZERO,
            report_load: true,
            echo_visibility: true,
        }
    }
}

impl ScriptedBehavior {
    pub fn failing(reason: impl Into<String>) -> Self {
        Self {
            plan: InitializePlan::Fail(reason.into()),
            ..Self::default()
        }
    }

    pub fn manual() -> Self {
        Self {
            plan: InitializePlan::Manual,
            ..Self::default()
        }
    }

    /// Plain runtime that never calls back on its own.
    pub fn silent() -> Self {
        Self {
            report_load: false,
            echo_visibility: false,
            ..Self::default()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

type DelegateSlot = Arc<Mutex<Option<Arc<dyn ChatDelegate>>>>;

#[derive(Default)]
struct ProbeState {
    behavior: ScriptedBehavior,
    calls: Vec<WidgetCall>,
    slots: Vec<DelegateSlot>,
    pending: VecDeque<oneshot::Sender<WidgetResult<()>>>,
}

/// Shared view into a [`ScriptedRuntime`] used to inspect calls and inject callbacks.
#[derive(Clone, Default)]
pub struct ScriptedProbe {
    state: Arc<Mutex<ProbeState>>,
}

impl ScriptedProbe {
    fn lock(&self) -> MutexGuard<'_, ProbeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, call: WidgetCall) {
        self.lock().calls.push(call);
    }

    pub fn calls(&self) -> Vec<WidgetCall> {
        self.lock().calls.clone()
    }

    pub fn count(&self, call: WidgetCall) -> usize {
        self.lock().calls.iter().filter(|seen| **seen == call).count()
    }

    pub fn handles_created(&self) -> usize {
        self.lock().slots.len()
    }

    pub fn behavior(&self) -> ScriptedBehavior {
        self.lock().behavior.clone()
    }

    pub fn set_behavior(&self, behavior: ScriptedBehavior) {
        self.lock().behavior = behavior;
    }

    pub fn set_plan(&self, plan: InitializePlan) {
        self.lock().behavior.plan = plan;
    }

    pub fn pending_initializations(&self) -> usize {
        self.lock().pending.len()
    }

    /// Resolves the oldest parked `initialize` request. Returns false if none was waiting
    /// or its requester has gone away.
    pub fn resolve_initialize(&self, result: WidgetResult<()>) -> bool {
        let sender = self.lock().pending.pop_front();
        match sender {
            Some(sender) => sender.send(result).is_ok(),
            None => false,
        }
    }

    /// Delegate registered on the most recently created handle.
    pub fn current_delegate(&self) -> Option<Arc<dyn ChatDelegate>> {
        let slot = self.lock().slots.last().cloned()?;
        let delegate = slot.lock().unwrap_or_else(PoisonError::into_inner).clone();
        delegate
    }

    pub fn notify(&self, notification: &ChatNotification) -> bool {
        match self.current_delegate() {
            Some(delegate) => {
                delegate.did_receive_notification(notification);
                true
            }
            None => false,
        }
    }

    pub fn report_error(&self, error: &WidgetError) -> bool {
        match self.current_delegate() {
            Some(delegate) => {
                delegate.did_receive_error(error);
                true
            }
            None => false,
        }
    }

    fn register_slot(&self) -> DelegateSlot {
        let slot = DelegateSlot::default();
        let mut state = self.lock();
        state.calls.push(WidgetCall::Create);
        state.slots.push(slot.clone());
        slot
    }

    fn park_initialize(&self) -> oneshot::Receiver<WidgetResult<()>> {
        let (sender, receiver) = oneshot::channel();
        self.lock().pending.push_back(sender);
        receiver
    }
}

/// In-memory widget runtime whose behavior is scripted up front.
///
/// It stands in for a real chat engine in tests and in the terminal demo.
#[derive(Clone, Default)]
pub struct ScriptedRuntime {
    probe: ScriptedProbe,
}

impl ScriptedRuntime {
    pub fn new(behavior: ScriptedBehavior) -> Self {
        let probe = ScriptedProbe::default();
        probe.set_behavior(behavior);
        Self { probe }
    }

    pub fn probe(&self) -> ScriptedProbe {
        self.probe.clone()
    }
}

impl WidgetRuntime for ScriptedRuntime {
    fn name(&self) -> &str {
        SCRIPTED_RUNTIME_NAME
    }

    fn create(&self, configuration: &SessionConfiguration) -> Box<dyn WidgetHandle> {
        tracing::debug!(
            tenant_id = %configuration.tenant_id(),
            profile_id = ?configuration.profile_id(),
            debug = configuration.debug(),
            "creating scripted widget handle"
        );
        Box::new(ScriptedHandle {
            probe: self.probe.clone(),
            delegate: self.probe.register_slot(),
        })
    }
}

struct ScriptedHandle {
    probe: ScriptedProbe,
    delegate: DelegateSlot,
}

impl ScriptedHandle {
    fn delegate(&self) -> Option<Arc<dyn ChatDelegate>> {
        self.delegate
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl WidgetHandle for ScriptedHandle {
    fn set_delegate(&mut self, delegate: Option<Arc<dyn ChatDelegate>>) {
        self.probe.record(if delegate.is_some() {
            WidgetCall::AttachDelegate
        } else {
            WidgetCall::DetachDelegate
        });
        *self.delegate.lock().unwrap_or_else(PoisonError::into_inner) = delegate;
    }

    fn initialize(&mut self) -> InitializeFuture {
        self.probe.record(WidgetCall::Initialize);
        let behavior = self.probe.behavior();
        // Snapshot the delegate: a real engine keeps calling whoever it was handed,
        // even if the owner detaches before the request resolves.
        let delegate = self.delegate();
        let parked = matches!(behavior.plan, InitializePlan::Manual)
            .then(|| self.probe.park_initialize());

        Box::pin(async move {
            if !behavior.delay.is_zero() {
                tokio::time::sleep(behavior.delay).await;
            }

            let result = match (behavior.plan, parked) {
                (InitializePlan::Succeed, _) => Ok(()),
                (InitializePlan::Fail(reason), _) => {
                    Err(WidgetError::initialization_rejected(reason))
                }
                (InitializePlan::Manual, Some(receiver)) => receiver.await.unwrap_or_else(|_| {
                    Err(WidgetError::initialization_rejected(
                        "initialize request was abandoned",
                    ))
                }),
                (InitializePlan::Manual, None) => Err(WidgetError::initialization_rejected(
                    "initialize request was never parked",
                )),
            };

            if result.is_ok()
                && behavior.report_load
                && let Some(delegate) = delegate
            {
                delegate.did_load();
            }

            result
        })
    }

    fn open(&mut self) {
        self.probe.record(WidgetCall::Open);
        if self.probe.behavior().echo_visibility
            && let Some(delegate) = self.delegate()
        {
            delegate.did_open();
        }
    }

    fn close(&mut self) {
        self.probe.record(WidgetCall::Close);
        if self.probe.behavior().echo_visibility
            && let Some(delegate) = self.delegate()
        {
            delegate.did_close();
        }
    }

    fn show_launcher(&mut self) {
        self.probe.record(WidgetCall::ShowLauncher);
    }

    fn hide_launcher(&mut self) {
        self.probe.record(WidgetCall::HideLauncher);
    }

    fn teardown(&mut self) {
        self.probe.record(WidgetCall::Teardown);
        *self.delegate.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}
