//! The held tree is only swapped for a validated snapshot refetched after a
//! successful call.

use std::{future::Future, sync::Arc};

use client_core::{ClientError, ModelService};
use shared::{
    domain::{NodeId, SessionId},
    protocol::{
        CutDirection, DistillParams, DistillResult, FineTuneParams, FineTuneResult,
        ModelToUse, ModifyResult,
    },
    tree::{DecisionNode, DecisionTree},
};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, error, info, warn};

use crate::{
    error::EditorError,
    events::{EditorEvent, Operation},
    gate::{WorkGate, WorkGuard},
    layout::{layout_tree, Diagram, LayoutError, LayoutOptions},
};

const EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Selected(NodeId),
    Working,
}

#[derive(Default)]
struct EditState {
    tree: Option<Arc<DecisionTree>>,
    selection: Option<NodeId>,
    pending_fine_tune: Option<FineTuneResult>,
}

impl EditState {
    fn phase(&self) -> Phase {
        match self.selection {
            Some(node_id) => Phase::Selected(node_id),
            None => Phase::Idle,
        }
    }
}

enum PendingUpdate {
    Keep,
    Set(FineTuneResult),
    Clear,
}

struct Settled<T> {
    value: T,
    tree: Option<DecisionTree>,
    pending: PendingUpdate,
}

pub struct EditController {
    service: Arc<dyn ModelService>,
    session_id: SessionId,
    layout: LayoutOptions,
    gate: WorkGate,
    inner: Mutex<EditState>,
    events: broadcast::Sender<EditorEvent>,
}

impl EditController {
    pub fn new(
        service: Arc<dyn ModelService>,
        session_id: SessionId,
        layout: LayoutOptions,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let gate = WorkGate::new(events.clone());
        Self::with_parts(service, session_id, layout, gate, events)
    }

    pub(crate) fn with_parts(
        service: Arc<dyn ModelService>,
        session_id: SessionId,
        layout: LayoutOptions,
        gate: WorkGate,
        events: broadcast::Sender<EditorEvent>,
    ) -> Self {
        Self {
            service,
            session_id,
            layout,
            gate,
            inner: Mutex::new(EditState::default()),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EditorEvent> {
        self.events.subscribe()
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn is_working(&self) -> bool {
        self.gate.is_busy()
    }

    pub async fn phase(&self) -> Phase {
        if self.gate.is_busy() {
            return Phase::Working;
        }
        self.inner.lock().await.phase()
    }

    pub async fn tree(&self) -> Option<Arc<DecisionTree>> {
        self.inner.lock().await.tree.clone()
    }

    pub async fn selection(&self) -> Option<NodeId> {
        self.inner.lock().await.selection
    }

    pub async fn selected_node(&self) -> Option<DecisionNode> {
        let state = self.inner.lock().await;
        let node_id = state.selection?;
        state.tree.as_ref()?.find(node_id).cloned()
    }

    pub async fn pending_fine_tune(&self) -> Option<FineTuneResult> {
        self.inner.lock().await.pending_fine_tune
    }

    pub async fn diagram(&self) -> Result<Option<Diagram>, LayoutError> {
        let (tree, selection) = {
            let state = self.inner.lock().await;
            (state.tree.clone(), state.selection)
        };
        tree.map(|tree| layout_tree(&tree, &self.layout, selection))
            .transpose()
    }

    /// Toggles selection of a node. Leaves and unknown ids are ignored.
    pub async fn click_node(&self, node_id: NodeId) -> Phase {
        self.apply_click(node_id, true).await
    }

    pub async fn select(&self, node_id: NodeId) -> Phase {
        self.apply_click(node_id, false).await
    }

    pub async fn click_background(&self) -> Phase {
        if self.gate.is_busy() {
            return Phase::Working;
        }
        let mut state = self.inner.lock().await;
        self.set_selection(&mut state, None)
    }

    pub async fn deselect(&self) -> Phase {
        self.click_background().await
    }

    async fn apply_click(&self, node_id: NodeId, toggle: bool) -> Phase {
        if self.gate.is_busy() {
            debug!(node_id = node_id.0, "ignoring node click while working");
            return Phase::Working;
        }

        let mut state = self.inner.lock().await;
        let Some(tree) = state.tree.clone() else {
            return state.phase();
        };
        let Some(node) = tree.find(node_id) else {
            warn!(node_id = node_id.0, "clicked node is not part of the current tree");
            return state.phase();
        };
        if node.is_leaf() {
            debug!(node_id = node_id.0, "leaf clicked; nothing to select");
            return state.phase();
        }

        let next = if toggle && state.selection == Some(node_id) {
            None
        } else {
            Some(node_id)
        };
        self.set_selection(&mut state, next)
    }

    fn set_selection(&self, state: &mut EditState, next: Option<NodeId>) -> Phase {
        if state.selection != next {
            state.selection = next;
            debug!(selection = ?next.map(|id| id.0), "selection changed");
            let _ = self.events.send(EditorEvent::SelectionChanged(next));
        }
        state.phase()
    }

    pub async fn replace_tree(&self, tree: DecisionTree) -> Result<(), EditorError> {
        tree.validate()?;
        let node_count = tree.node_count();
        let had_selection = {
            let mut state = self.inner.lock().await;
            state.tree = Some(Arc::new(tree));
            state.selection.take().is_some()
        };
        info!(node_count, "tree replaced");
        let _ = self.events.send(EditorEvent::TreeReplaced { node_count });
        if had_selection {
            let _ = self.events.send(EditorEvent::SelectionChanged(None));
        }
        Ok(())
    }

    pub async fn cut(&self, direction: CutDirection) -> Result<ModifyResult, EditorError> {
        let (guard, node_id) = self.begin_on_selection(Operation::Cut).await?;
        info!(node_id = node_id.0, ?direction, "cutting node");
        let outcome = self
            .modify_then_refetch(
                Operation::Cut,
                self.service.cut(&self.session_id, node_id, direction),
            )
            .await;
        self.settle(Operation::Cut, guard, outcome).await
    }

    pub async fn retrain(&self) -> Result<ModifyResult, EditorError> {
        let (guard, node_id) = self.begin_on_selection(Operation::Retrain).await?;
        info!(node_id = node_id.0, "retraining subtree");
        let outcome = self
            .modify_then_refetch(
                Operation::Retrain,
                self.service.retrain(&self.session_id, node_id),
            )
            .await;
        self.settle(Operation::Retrain, guard, outcome).await
    }

    /// Fine-tunes the network against the edited tree. The visible tree is
    /// left alone until [`Self::confirm`] or [`Self::revert`].
    pub async fn fine_tune(&self, params: &FineTuneParams) -> Result<FineTuneResult, EditorError> {
        let guard = self.begin(Operation::FineTune).await?;
        info!(epoch = params.epoch, batch_size = params.batch_size, "fine-tuning network");
        let outcome = self
            .service
            .fine_tune(&self.session_id, params)
            .await
            .map(|result| Settled {
                value: result,
                tree: None,
                pending: PendingUpdate::Set(result),
            })
            .map_err(EditorError::from);
        self.settle(Operation::FineTune, guard, outcome).await
    }

    pub async fn distill(&self, params: &DistillParams) -> Result<DistillResult, EditorError> {
        self.distill_as(Operation::Distill, params).await
    }

    pub async fn confirm(&self, params: &DistillParams) -> Result<DistillResult, EditorError> {
        let params = params.with_model(ModelToUse::Latest);
        self.distill_as(Operation::Confirm, &params).await
    }

    pub async fn revert(&self, params: &DistillParams) -> Result<DistillResult, EditorError> {
        let params = params.with_model(ModelToUse::Original);
        self.distill_as(Operation::Revert, &params).await
    }

    async fn distill_as(
        &self,
        operation: Operation,
        params: &DistillParams,
    ) -> Result<DistillResult, EditorError> {
        let guard = self.begin(operation).await?;
        info!(
            %operation,
            model_to_use = ?params.model_to_use,
            max_depth = params.max_depth,
            "distilling tree"
        );
        let outcome = self.distill_then_refetch(operation, params).await;
        self.settle(operation, guard, outcome).await
    }

    async fn distill_then_refetch(
        &self,
        operation: Operation,
        params: &DistillParams,
    ) -> Result<Settled<DistillResult>, EditorError> {
        let value = self.service.distill(&self.session_id, params).await?;
        let tree = self.fetch_replacement(operation).await?;
        Ok(Settled {
            value,
            tree: Some(tree),
            pending: PendingUpdate::Clear,
        })
    }

    async fn begin(&self, operation: Operation) -> Result<WorkGuard, EditorError> {
        if self.gate.is_busy() {
            return Err(EditorError::Busy);
        }
        let state = self.inner.lock().await;
        let awaiting_decision = state.pending_fine_tune.is_some();
        match operation {
            Operation::Cut | Operation::Retrain | Operation::FineTune if awaiting_decision => {
                return Err(EditorError::Precondition(
                    "fine-tuned network awaits confirm or revert",
                ));
            }
            Operation::FineTune if state.tree.is_none() => {
                return Err(EditorError::Precondition("no tree to fine-tune against"));
            }
            Operation::Confirm | Operation::Revert if !awaiting_decision => {
                return Err(EditorError::Precondition(
                    "no fine-tune result awaits a decision",
                ));
            }
            _ => {}
        }
        self.gate.try_begin(operation)
    }

    async fn begin_on_selection(
        &self,
        operation: Operation,
    ) -> Result<(WorkGuard, NodeId), EditorError> {
        let node_id = self
            .inner
            .lock()
            .await
            .selection
            .ok_or(EditorError::Precondition("no node selected"))?;
        let guard = self.begin(operation).await?;
        Ok((guard, node_id))
    }

    async fn modify_then_refetch(
        &self,
        operation: Operation,
        request: impl Future<Output = Result<ModifyResult, ClientError>>,
    ) -> Result<Settled<ModifyResult>, EditorError> {
        let value = request.await?;
        let tree = self.fetch_replacement(operation).await?;
        Ok(Settled {
            value,
            tree: Some(tree),
            pending: PendingUpdate::Keep,
        })
    }

    async fn fetch_replacement(&self, operation: Operation) -> Result<DecisionTree, EditorError> {
        let tree = self
            .service
            .fetch_tree(&self.session_id)
            .await?
            .ok_or(EditorError::MissingTree(operation))?;
        tree.validate()?;
        Ok(tree)
    }

    async fn settle<T>(
        &self,
        operation: Operation,
        guard: WorkGuard,
        outcome: Result<Settled<T>, EditorError>,
    ) -> Result<T, EditorError> {
        let mut state = self.inner.lock().await;
        let had_selection = state.selection.take().is_some();

        let result = match outcome {
            Ok(settled) => {
                if let Some(tree) = settled.tree {
                    let node_count = tree.node_count();
                    state.tree = Some(Arc::new(tree));
                    info!(%operation, node_count, "tree replaced");
                    let _ = self.events.send(EditorEvent::TreeReplaced { node_count });
                }
                match settled.pending {
                    PendingUpdate::Keep => {}
                    PendingUpdate::Set(result) => {
                        state.pending_fine_tune = Some(result);
                        let _ = self.events.send(EditorEvent::FineTuneReady(result));
                    }
                    PendingUpdate::Clear => state.pending_fine_tune = None,
                }
                Ok(settled.value)
            }
            Err(err) => {
                self.report(operation, &err);
                Err(err)
            }
        };
        drop(state);

        if had_selection {
            let _ = self.events.send(EditorEvent::SelectionChanged(None));
        }
        drop(guard);
        result
    }

    pub(crate) fn report(&self, operation: Operation, err: &EditorError) {
        let Some(notification) = err.notification(operation) else {
            return;
        };
        if notification.is_contract_violation() {
            error!(%operation, error = %err, "model service broke the tree contract");
        } else {
            warn!(%operation, error = %err, "operation failed");
        }
        let _ = self.events.send(EditorEvent::Notification(notification));
    }
}

#[cfg(test)]
#[path = "tests/controller_tests.rs"]
mod tests;
