use std::{future::Future, sync::Arc};

use client_core::{ClientError, LogUpload, ModelService};
use shared::{
    domain::SessionId,
    protocol::{DistillParams, DistillResult, TrainParams, TrainResult, UploadSummary},
};
use tokio::sync::{broadcast, Mutex};
use tracing::{info, warn};

use crate::{
    controller::EditController,
    error::EditorError,
    events::{EditorEvent, Operation},
    gate::WorkGate,
    layout::LayoutOptions,
    workflow::{Stage, StageMachine},
};

const EVENT_CAPACITY: usize = 256;

pub struct EditorSession {
    session_id: SessionId,
    service: Arc<dyn ModelService>,
    gate: WorkGate,
    stages: Mutex<StageMachine>,
    controller: EditController,
    events: broadcast::Sender<EditorEvent>,
}

impl EditorSession {
    pub fn new(
        service: Arc<dyn ModelService>,
        session_id: SessionId,
        layout: LayoutOptions,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let gate = WorkGate::new(events.clone());
        let controller = EditController::with_parts(
            service.clone(),
            session_id.clone(),
            layout,
            gate.clone(),
            events.clone(),
        );
        Self {
            session_id,
            service,
            gate,
            stages: Mutex::new(StageMachine::new()),
            controller,
            events,
        }
    }

    pub async fn open(
        service: Arc<dyn ModelService>,
        session_id: SessionId,
        layout: LayoutOptions,
    ) -> Result<Self, EditorError> {
        let session = Self::new(service, session_id, layout);
        session.resume().await?;
        Ok(session)
    }

    /// Fetches the current tree. With one, the session jumps straight to
    /// interactive editing; without one, or when the snapshot cannot be read,
    /// it starts over at upload.
    pub async fn resume(&self) -> Result<Stage, EditorError> {
        let outcome = match self
            .guarded(Operation::Open, self.service.fetch_tree(&self.session_id))
            .await
        {
            Ok(outcome) => outcome,
            Err(EditorError::Service(err)) => {
                warn!(session_id = %self.session_id, error = %err, "no usable tree; starting over");
                None
            }
            Err(err) => return Err(err),
        };

        let has_tree = match outcome {
            Some(tree) => match self.controller.replace_tree(tree).await {
                Ok(()) => true,
                Err(err) => {
                    self.controller.report(Operation::Open, &err);
                    false
                }
            },
            None => false,
        };

        let stage = {
            let mut stages = self.stages.lock().await;
            *stages = StageMachine::resume(has_tree);
            stages.current()
        };
        info!(session_id = %self.session_id, has_tree, stage = %stage, "session resumed");
        self.announce(stage);
        Ok(stage)
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn controller(&self) -> &EditController {
        &self.controller
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EditorEvent> {
        self.events.subscribe()
    }

    pub fn is_working(&self) -> bool {
        self.gate.is_busy()
    }

    pub async fn stage(&self) -> Stage {
        self.stages.lock().await.current()
    }

    pub async fn stages(&self) -> StageMachine {
        self.stages.lock().await.clone()
    }

    pub async fn select_stage(&self, stage: Stage) -> Result<(), EditorError> {
        self.stages.lock().await.select(stage)?;
        self.announce(stage);
        Ok(())
    }

    pub async fn next_stage(&self) -> Result<Stage, EditorError> {
        let stage = self.stages.lock().await.advance()?;
        self.announce(stage);
        Ok(stage)
    }

    pub async fn upload(&self, upload: LogUpload) -> Result<UploadSummary, EditorError> {
        info!(filename = %upload.filename, bytes = upload.bytes.len(), "uploading event log");
        let summary = self
            .guarded(
                Operation::Upload,
                self.service.upload_log(&self.session_id, upload),
            )
            .await?;
        let stage = self.stages.lock().await.record_upload(summary.clone());
        self.announce(stage);
        Ok(summary)
    }

    pub async fn train(&self, params: &TrainParams) -> Result<TrainResult, EditorError> {
        info!(
            epochs = params.epochs,
            prefix_length = params.prefix_length,
            "training network"
        );
        let result = self
            .guarded(Operation::Train, self.service.train(&self.session_id, params))
            .await?;
        let stage = self.stages.lock().await.record_train(result);
        self.announce(stage);
        Ok(result)
    }

    pub async fn distill(&self, params: &DistillParams) -> Result<DistillResult, EditorError> {
        let result = self.controller.distill(params).await?;
        let stage = self.stages.lock().await.record_distill(result);
        self.announce(stage);
        Ok(result)
    }

    async fn guarded<T>(
        &self,
        operation: Operation,
        request: impl Future<Output = Result<T, ClientError>>,
    ) -> Result<T, EditorError> {
        let _guard = self.gate.try_begin(operation)?;
        request.await.map_err(|err| {
            let err = EditorError::from(err);
            self.controller.report(operation, &err);
            err
        })
    }

    fn announce(&self, stage: Stage) {
        let _ = self.events.send(EditorEvent::StageChanged(stage));
    }
}

#[cfg(test)]
#[path = "tests/session_tests.rs"]
mod tests;
