use std::future::Future;
use std::time::Duration;

use anyhow::Context;
use sprig_shared::{ErrorBody, TodoDto};
use tracing::{debug, instrument, warn};

use crate::error::GatewayError;
use crate::task::{Task, TaskDraft};

/// Backend boundary. Calls are made once; callers decide what a failure
/// means for local state.
pub trait SyncGateway {
    fn fetch_all(&self) -> impl Future<Output = Result<Vec<Task>, GatewayError>>;

    /// Creates the task server-side and returns it with its assigned id.
    fn create(&self, draft: &TaskDraft) -> impl Future<Output = Result<Task, GatewayError>>;
}

#[derive(Debug, Clone)]
pub struct HttpGateway {
    client: reqwest::Client,
    base_url: String,
}

impl HttpGateway {
    pub fn new(base_url: &str) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("failed building HTTP client for task server")?;
        Ok(Self {
            client,
            base_url: base_url.trim().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn todos_url(&self) -> String {
        format!("{}/todos", self.base_url)
    }
}

impl SyncGateway for HttpGateway {
    #[instrument(skip(self), fields(base_url = %self.base_url))]
    async fn fetch_all(&self) -> Result<Vec<Task>, GatewayError> {
        let url = self.todos_url();
        let response = self
            .client
            .get(&url)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|err| transport(&url, &err))?;
        let response = ensure_success(response).await?;

        let records: Vec<TodoDto> = response
            .json()
            .await
            .map_err(|err| GatewayError::Decode(err.to_string()))?;
        debug!(count = records.len(), "fetched todos");

        records.into_iter().map(Task::try_from).collect()
    }

    #[instrument(skip(self, draft), fields(base_url = %self.base_url, text_len = draft.text.len()))]
    async fn create(&self, draft: &TaskDraft) -> Result<Task, GatewayError> {
        let url = self.todos_url();
        let response = self
            .client
            .post(&url)
            .json(&draft.to_request())
            .send()
            .await
            .map_err(|err| transport(&url, &err))?;
        let response = ensure_success(response).await?;

        let record: TodoDto = response
            .json()
            .await
            .map_err(|err| GatewayError::Decode(err.to_string()))?;
        debug!(id = %record.id, "server created todo");
        Task::try_from(record)
    }
}

fn transport(url: &str, err: &reqwest::Error) -> GatewayError {
    warn!(url, error = %err, "request to task server failed");
    GatewayError::Transport {
        url: url.to_string(),
        message: err.to_string(),
    }
}

async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, GatewayError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&body)
        .map(|parsed| parsed.error)
        .unwrap_or_else(|_| {
            let trimmed = body.trim();
            if trimmed.is_empty() {
                status.canonical_reason().unwrap_or("unknown error").to_string()
            } else {
                trimmed.to_string()
            }
        });
    warn!(status = status.as_u16(), message = %message, "task server rejected request");
    Err(GatewayError::Status {
        status: status.as_u16(),
        message,
    })
}

#[cfg(test)]
mod tests {
    use super::HttpGateway;

    #[test]
    fn base_url_is_normalized() {
        let gateway = HttpGateway::new(" http://localhost:5001/ ").expect("client");
        assert_eq!(gateway.base_url(), "http://localhost:5001");
        assert_eq!(gateway.todos_url(), "http://localhost:5001/todos");
    }

    #[tokio::test]
    async fn unreachable_server_is_a_transport_error() {
        use super::SyncGateway;
        use crate::error::GatewayError;

        let gateway = HttpGateway::new("http://127.0.0.1:9").expect("client");
        let result = gateway.fetch_all().await;
        assert!(matches!(result, Err(GatewayError::Transport { .. })));
    }
}
