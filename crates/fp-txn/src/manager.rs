//! The transaction manager: request construction, commit, sessions, and
//! the undo/redo history.
//!
//! The manager owns the document context behind a single async gate. Every
//! operation that writes the document holds the gate for its whole duration:
//!
//! - `commit` / `Session::issue` await the gate, so commits queue in arrival
//!   order instead of interleaving;
//! - `undo` / `redo` are synchronous and refuse with [`TxnError::Busy`]
//!   while a commit holds the gate.
//!
//! Stack bookkeeping lives behind a separate short-lived lock that is never
//! held across an await.

use crate::error::{Result, TxnError};
use crate::history::{History, HistoryConfig};
use crate::registry::{RequestRegistry, RequestSpec};
use crate::request::RequestHandle;
use crate::session::{self, OpenSession, Session, SessionId, SessionOutcome};
use fp_core::{FieldAccess, FieldKey, Value};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Whether a session is currently open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagerState {
    Idle,
    SessionOpen(SessionId),
}

pub(crate) struct KernelState<C> {
    pub(crate) history: History<C>,
    pub(crate) session: Option<OpenSession<C>>,
}

impl<C> KernelState<C> {
    /// Push a committed unit, logging any eviction.
    pub(crate) fn record(&mut self, unit: RequestHandle<C>) {
        log::debug!("history += {} ({})", unit.id(), unit.description());
        if let Some(evicted) = self.history.push(unit) {
            log::trace!("history depth exceeded, evicted {}", evicted.id());
        }
    }
}

/// Orchestrates requests against one document context.
pub struct TransactionManager<C> {
    registry: RequestRegistry<C>,
    config: HistoryConfig,
    pub(crate) gate: tokio::sync::Mutex<C>,
    state: Mutex<KernelState<C>>,
}

impl<C: FieldAccess + Send + 'static> TransactionManager<C> {
    /// A manager whose registry holds only the built-in request types.
    pub fn with_builtins(ctx: C, config: HistoryConfig) -> Self {
        Self::new(ctx, RequestRegistry::with_builtins(), config)
    }
}

impl<C: Send + 'static> TransactionManager<C> {
    /// Tie a manager to a document context.
    pub fn new(ctx: C, registry: RequestRegistry<C>, config: HistoryConfig) -> Self {
        log::debug!(
            "transaction manager ready: {} request types, max depth {}",
            registry.tags().len(),
            config.max_depth
        );
        Self {
            state: Mutex::new(KernelState {
                history: History::new(config.max_depth),
                session: None,
            }),
            gate: tokio::sync::Mutex::new(ctx),
            registry,
            config,
        }
    }

    /// Release history and any open session, handing the context back.
    pub fn dispose(self) -> C {
        let state = self.state.into_inner().unwrap_or_else(PoisonError::into_inner);
        log::debug!(
            "transaction manager disposed: {} undo, {} redo units dropped",
            state.history.undo_len(),
            state.history.redo_len()
        );
        self.gate.into_inner()
    }

    pub(crate) fn kernel(&self) -> MutexGuard<'_, KernelState<C>> {
        // Bookkeeping stays consistent even if a holder panicked.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn config(&self) -> &HistoryConfig {
        &self.config
    }

    pub fn registry(&self) -> &RequestRegistry<C> {
        &self.registry
    }

    /// Plugins register their leaf types here.
    pub fn registry_mut(&mut self) -> &mut RequestRegistry<C> {
        &mut self.registry
    }

    // ─── Construction ─────────────────────────────────────────────────────

    /// Construct a pending request of type `tag` with `args` forwarded verbatim.
    ///
    /// # Errors
    /// `UnknownRequestType` if `tag` is not registered; `InvalidArguments` if
    /// the factory rejects `args`. No state is touched either way.
    pub fn create_request(&self, tag: &str, args: Vec<Value>) -> Result<RequestHandle<C>> {
        self.registry.create(tag, args)
    }

    pub fn create_from_spec(&self, spec: &RequestSpec) -> Result<RequestHandle<C>> {
        self.registry.create_from_spec(spec)
    }

    // ─── Commit ───────────────────────────────────────────────────────────

    /// Commit `request` and record it in history.
    ///
    /// Waits behind any in-flight commit. On success the unit is pushed onto
    /// the undo stack and the redo stack is cleared; on failure the unit is
    /// discarded and neither stack changes.
    ///
    /// # Errors
    /// `SessionInProgress` while a session is open: its entries were applied
    /// first, so a direct unit would land beneath them in history. Issue the
    /// request through the session instead.
    pub async fn commit(&self, mut request: RequestHandle<C>) -> Result<Value> {
        let mut ctx = self.gate.lock().await;
        if let Some(open) = &self.kernel().session {
            return Err(TxnError::SessionInProgress(open.id));
        }
        let value = match request.commit(&mut *ctx).await {
            Ok(value) => value,
            Err(e) => {
                log::debug!("commit of {} ({}) failed: {e}", request.id(), request.request_type());
                return Err(TxnError::Commit(e));
            }
        };
        self.kernel().record(request);
        Ok(value)
    }

    // ─── Sessions ─────────────────────────────────────────────────────────

    /// Open a session. At most one session is open at a time.
    ///
    /// # Errors
    /// `SessionAlreadyOpen` if another session has not been closed yet.
    pub fn start_session(&self) -> Result<Session<'_, C>> {
        self.open_session(None)
    }

    /// Open a session whose history entry carries `label`.
    pub fn start_session_with_label(&self, label: impl Into<String>) -> Result<Session<'_, C>> {
        self.open_session(Some(label.into()))
    }

    fn open_session(&self, label: Option<String>) -> Result<Session<'_, C>> {
        let mut state = self.kernel();
        if let Some(open) = &state.session {
            return Err(TxnError::SessionAlreadyOpen(open.id));
        }
        let id = SessionId::next();
        state.session = Some(OpenSession {
            id,
            label,
            entries: Vec::new(),
        });
        log::debug!("{id} opened");
        Ok(Session::new(self, id))
    }

    /// Close session `id`, pushing its entries to history.
    ///
    /// [`Session::close`] calls this; call it directly only to recover a
    /// session whose handle was dropped while the manager was busy.
    pub async fn close_session(&self, id: SessionId) -> Result<SessionOutcome> {
        let _gate = self.gate.lock().await;
        session::finish(&mut *self.kernel(), id)
    }

    pub fn state(&self) -> ManagerState {
        match &self.kernel().session {
            Some(open) => ManagerState::SessionOpen(open.id),
            None => ManagerState::Idle,
        }
    }

    pub fn session_open(&self) -> bool {
        self.kernel().session.is_some()
    }

    /// Fields `request` would touch that the open session already transacts.
    pub fn overlapping_fields(&self, request: &RequestHandle<C>) -> Vec<FieldKey> {
        match &self.kernel().session {
            Some(open) => session::overlapping_fields(&open.entries, request),
            None => Vec::new(),
        }
    }

    // ─── History ──────────────────────────────────────────────────────────

    /// Undo the most recent unit. `Ok(false)` if there is nothing to undo.
    ///
    /// # Errors
    /// `Busy` while a commit is in flight, `SessionInProgress` while a session
    /// is open, `HistoryFrozen` after an unacknowledged replay failure, and
    /// `UndoReplayFailure` if the unit's undo fails (which freezes history).
    pub fn undo(&self) -> Result<bool> {
        let mut ctx = self.gate.try_lock().map_err(|_| TxnError::Busy)?;
        let mut state = self.kernel();
        Self::check_replayable(&state)?;
        let Some(mut unit) = state.history.pop_undo() else {
            return Ok(false);
        };
        match unit.undo(&mut *ctx) {
            Ok(()) => {
                log::debug!("undo {} ({})", unit.id(), unit.description());
                state.history.push_redo(unit);
                Ok(true)
            }
            Err(e) => {
                log::error!("undo of {} failed, history frozen: {e}", unit.id());
                state.history.freeze();
                Err(TxnError::UndoReplayFailure(e))
            }
        }
    }

    /// Redo the most recently undone unit. `Ok(false)` if there is nothing
    /// to redo. Errors mirror [`TransactionManager::undo`].
    pub fn redo(&self) -> Result<bool> {
        let mut ctx = self.gate.try_lock().map_err(|_| TxnError::Busy)?;
        let mut state = self.kernel();
        Self::check_replayable(&state)?;
        let Some(mut unit) = state.history.pop_redo() else {
            return Ok(false);
        };
        match unit.redo(&mut *ctx) {
            Ok(()) => {
                log::debug!("redo {} ({})", unit.id(), unit.description());
                state.history.push_undo(unit);
                Ok(true)
            }
            Err(e) => {
                log::error!("redo of {} failed, history frozen: {e}", unit.id());
                state.history.freeze();
                Err(TxnError::RedoReplayFailure(e))
            }
        }
    }

    fn check_replayable(state: &KernelState<C>) -> Result<()> {
        if state.history.is_frozen() {
            return Err(TxnError::HistoryFrozen);
        }
        if let Some(open) = &state.session {
            return Err(TxnError::SessionInProgress(open.id));
        }
        Ok(())
    }

    pub fn can_undo(&self) -> bool {
        let state = self.kernel();
        Self::check_replayable(&state).is_ok() && state.history.undo_len() > 0
    }

    pub fn can_redo(&self) -> bool {
        let state = self.kernel();
        Self::check_replayable(&state).is_ok() && state.history.redo_len() > 0
    }

    pub fn undo_len(&self) -> usize {
        self.kernel().history.undo_len()
    }

    pub fn redo_len(&self) -> usize {
        self.kernel().history.redo_len()
    }

    /// Undo-stack labels, most recent first.
    pub fn undo_descriptions(&self) -> Vec<String> {
        self.kernel().history.undo_descriptions()
    }

    /// Redo-stack labels, next-to-redo first.
    pub fn redo_descriptions(&self) -> Vec<String> {
        self.kernel().history.redo_descriptions()
    }

    pub fn is_frozen(&self) -> bool {
        self.kernel().history.is_frozen()
    }

    /// Resume undo/redo after a replay failure, keeping the remaining units.
    pub fn acknowledge_replay_failure(&self) {
        let mut state = self.kernel();
        if state.history.is_frozen() {
            log::warn!("replay failure acknowledged; history resumed");
            state.history.thaw();
        }
    }

    /// Drop every unit from both stacks and resume.
    pub fn reset_history(&self) {
        log::debug!("history reset");
        self.kernel().history.clear();
    }

    // ─── Document access ──────────────────────────────────────────────────

    /// Read the document once no operation holds the gate.
    pub async fn read<R>(&self, f: impl FnOnce(&C) -> R) -> R {
        let ctx = self.gate.lock().await;
        f(&ctx)
    }

    /// Read the document now, or `Busy` if an operation holds the gate.
    pub fn try_read<R>(&self, f: impl FnOnce(&C) -> R) -> Result<R> {
        let ctx = self.gate.try_lock().map_err(|_| TxnError::Busy)?;
        Ok(f(&ctx))
    }
}
