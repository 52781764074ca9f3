use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use super::session::Session;
use crate::errors::StoreError;
use crate::models::{NewTask, Task, TaskId, TaskPatch, TaskStatus};

/// The persistence calls the board depends on.
#[async_trait]
pub trait TaskStore: Send + Sync + 'static {
    /// All tasks, undecoded. The board decides which ones fit a lane.
    async fn list_tasks(&self) -> Result<Vec<serde_json::Value>, StoreError>;

    /// Create a task. The store sets id, creator and the initial status.
    async fn create_task(&self, new: &NewTask) -> Result<Task, StoreError>;

    /// Overwrite the fields present in `patch`.
    async fn update_task(&self, id: &TaskId, patch: &TaskPatch) -> Result<Task, StoreError>;

    async fn delete_task(&self, id: &TaskId) -> Result<(), StoreError>;
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

/// `TaskStore` over the REST API.
#[derive(Clone)]
pub struct HttpTaskStore {
    client: Client,
    base_url: String,
    session: Session,
}

impl HttpTaskStore {
    /// `base_url` is the API root, e.g. `http://127.0.0.1:5000/api`.
    pub fn new(base_url: &str, session: Session) -> Result<Self, StoreError> {
        Self::with_timeout(base_url, session, None)
    }

    pub fn with_timeout(
        base_url: &str,
        session: Session,
        timeout: Option<Duration>,
    ) -> Result<Self, StoreError> {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            client: builder.build()?,
            base_url: base_url.trim_end_matches('/').to_string(),
            session,
        })
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Status-only update (`PATCH /tasks/:id/status`).
    pub async fn update_status(&self, id: &TaskId, status: TaskStatus) -> Result<Task, StoreError> {
        let req = self
            .authed(self.client.patch(self.url(&format!("/tasks/{}/status", id))))
            .json(&serde_json::json!({ "status": status }));
        decode(send(req).await?).await
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authed(&self, req: RequestBuilder) -> RequestBuilder {
        req.bearer_auth(self.session.token())
    }
}

#[async_trait]
impl TaskStore for HttpTaskStore {
    async fn list_tasks(&self) -> Result<Vec<serde_json::Value>, StoreError> {
        let req = self.authed(self.client.get(self.url("/tasks")));
        decode(send(req).await?).await
    }

    async fn create_task(&self, new: &NewTask) -> Result<Task, StoreError> {
        let req = self.authed(self.client.post(self.url("/tasks"))).json(new);
        decode(send(req).await?).await
    }

    async fn update_task(&self, id: &TaskId, patch: &TaskPatch) -> Result<Task, StoreError> {
        let req = self
            .authed(self.client.put(self.url(&format!("/tasks/{}", id))))
            .json(patch);
        decode(send(req).await?).await
    }

    async fn delete_task(&self, id: &TaskId) -> Result<(), StoreError> {
        let req = self.authed(self.client.delete(self.url(&format!("/tasks/{}", id))));
        send(req).await?;
        Ok(())
    }
}

/// Send and turn non-2xx responses into the matching `StoreError`.
pub(crate) async fn send(req: RequestBuilder) -> Result<Response, StoreError> {
    let resp = req.send().await?;
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&body)
        .map(|b| b.error)
        .unwrap_or_else(|_| {
            if body.is_empty() {
                status.to_string()
            } else {
                body
            }
        });
    debug!(status = status.as_u16(), "task store call rejected: {}", message);
    Err(StoreError::from_status(status.as_u16(), message))
}

pub(crate) async fn decode<T: DeserializeOwned>(resp: Response) -> Result<T, StoreError> {
    resp.json::<T>()
        .await
        .map_err(|e| StoreError::Network(format!("Failed to decode response: {}", e)))
}
