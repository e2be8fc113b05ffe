use std::time::Duration;

use async_trait::async_trait;
use reqwest::{
    multipart::{Form, Part},
    Client, Response, StatusCode,
};
use serde::{de::DeserializeOwned, Serialize};
use shared::{
    domain::{NodeId, SessionId},
    error::ServiceErrorBody,
    protocol::{
        CutDirection, CutNodeParams, DistillParams, DistillResult, FineTuneParams,
        FineTuneResult, LoadTreeParams, LoadTreeResponse, ModifyResult, RetrainNodeParams,
        SessionRequest, TrainParams, TrainResult, UploadSummary,
    },
    tree::DecisionTree,
};
use tracing::{debug, info, warn};
use url::Url;

pub mod error;
pub mod session_store;

pub use error::ClientError;
pub use session_store::{SessionStore, SessionStoreError};

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(600);

#[derive(Debug, Clone)]
pub struct LogUpload {
    pub filename: String,
    pub bytes: Vec<u8>,
}

#[async_trait]
pub trait ModelService: Send + Sync {
    /// `Ok(None)` is the "no tree yet" sentinel.
    async fn fetch_tree(&self, session_id: &SessionId)
        -> Result<Option<DecisionTree>, ClientError>;
    async fn upload_log(
        &self,
        session_id: &SessionId,
        upload: LogUpload,
    ) -> Result<UploadSummary, ClientError>;
    async fn train(
        &self,
        session_id: &SessionId,
        params: &TrainParams,
    ) -> Result<TrainResult, ClientError>;
    async fn distill(
        &self,
        session_id: &SessionId,
        params: &DistillParams,
    ) -> Result<DistillResult, ClientError>;
    async fn cut(
        &self,
        session_id: &SessionId,
        node_id: NodeId,
        direction: CutDirection,
    ) -> Result<ModifyResult, ClientError>;
    async fn retrain(
        &self,
        session_id: &SessionId,
        node_id: NodeId,
    ) -> Result<ModifyResult, ClientError>;
    async fn fine_tune(
        &self,
        session_id: &SessionId,
        params: &FineTuneParams,
    ) -> Result<FineTuneResult, ClientError>;
}

pub struct HttpModelService {
    http: Client,
    base_url: Url,
}

impl HttpModelService {
    pub fn new(base_url: &str) -> Result<Self, ClientError> {
        Self::with_timeout(base_url, DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self, ClientError> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: normalize_base_url(base_url)?,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, action: &str) -> Result<Url, ClientError> {
        Ok(self.base_url.join(&format!("api/{action}"))?)
    }

    async fn post_action<P, R>(
        &self,
        session_id: &SessionId,
        action: &str,
        params: P,
    ) -> Result<R, ClientError>
    where
        P: Serialize + Send,
        R: DeserializeOwned,
    {
        let url = self.endpoint(action)?;
        debug!(action, %session_id, "model service request");
        let response = self
            .http
            .post(url)
            .json(&SessionRequest::new(session_id, params))
            .send()
            .await?;
        decode_response(action, response).await
    }
}

fn normalize_base_url(raw: &str) -> Result<Url, ClientError> {
    let trimmed = raw.trim();
    if trimmed.ends_with('/') {
        Ok(Url::parse(trimmed)?)
    } else {
        Ok(Url::parse(&format!("{trimmed}/"))?)
    }
}

async fn decode_response<R: DeserializeOwned>(
    action: &str,
    response: Response,
) -> Result<R, ClientError> {
    let status = response.status();
    let body = response.bytes().await?;

    if !status.is_success() {
        let message = serde_json::from_slice::<ServiceErrorBody>(&body)
            .ok()
            .and_then(|body| body.message().map(str::to_owned))
            .unwrap_or_else(|| {
                status
                    .canonical_reason()
                    .unwrap_or("request failed")
                    .to_string()
            });
        warn!(action, status = status.as_u16(), %message, "model service rejected request");
        return Err(ClientError::Server {
            status: status.as_u16(),
            message,
        });
    }

    serde_json::from_slice(&body).map_err(|err| ClientError::Decode(format!("{action}: {err}")))
}

#[async_trait]
impl ModelService for HttpModelService {
    async fn fetch_tree(
        &self,
        session_id: &SessionId,
    ) -> Result<Option<DecisionTree>, ClientError> {
        let url = self.endpoint("load_tree")?;
        let response = self
            .http
            .post(url)
            .json(&SessionRequest::new(session_id, LoadTreeParams {}))
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            info!(%session_id, "model service holds no tree for session");
            return Ok(None);
        }

        let loaded: LoadTreeResponse = decode_response("load_tree", response).await?;
        Ok(loaded.into_tree())
    }

    async fn upload_log(
        &self,
        session_id: &SessionId,
        upload: LogUpload,
    ) -> Result<UploadSummary, ClientError> {
        let url = self.endpoint("load_xes")?;
        let size_bytes = upload.bytes.len();
        let form = Form::new()
            .part("file", Part::bytes(upload.bytes).file_name(upload.filename.clone()))
            .text("folder_name", session_id.to_string());
        info!(%session_id, filename = %upload.filename, size_bytes, "uploading event log");
        let response = self.http.post(url).multipart(form).send().await?;
        decode_response("load_xes", response).await
    }

    async fn train(
        &self,
        session_id: &SessionId,
        params: &TrainParams,
    ) -> Result<TrainResult, ClientError> {
        self.post_action(session_id, "process_and_train", params)
            .await
    }

    async fn distill(
        &self,
        session_id: &SessionId,
        params: &DistillParams,
    ) -> Result<DistillResult, ClientError> {
        self.post_action(session_id, "distill_tree", params).await
    }

    async fn cut(
        &self,
        session_id: &SessionId,
        node_id: NodeId,
        direction: CutDirection,
    ) -> Result<ModifyResult, ClientError> {
        self.post_action(
            session_id,
            "modify_cut",
            CutNodeParams { node_id, direction },
        )
        .await
    }

    async fn retrain(
        &self,
        session_id: &SessionId,
        node_id: NodeId,
    ) -> Result<ModifyResult, ClientError> {
        self.post_action(session_id, "modify_retrain", RetrainNodeParams { node_id })
            .await
    }

    async fn fine_tune(
        &self,
        session_id: &SessionId,
        params: &FineTuneParams,
    ) -> Result<FineTuneResult, ClientError> {
        self.post_action(session_id, "finetune", params).await
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
