//! HTTP dispatcher handing generation tasks to the worker.

use std::time::Duration;

use async_trait::async_trait;
use storyloop_core::dispatch::{GenerationDispatcher, GenerationTask};
use storyloop_core::error::DomainError;
use tracing::{debug, instrument};

use crate::error::AppError;

/// Posts task envelopes to `{base_url}/v1/tasks`.
#[derive(Debug, Clone)]
pub struct HttpGenerationDispatcher {
    client: reqwest::Client,
    tasks_url: String,
}

impl HttpGenerationDispatcher {
    /// Creates a dispatcher with a bounded request timeout.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the HTTP client cannot be built.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Config(format!("cannot build dispatch client: {e}")))?;
        Ok(Self {
            client,
            tasks_url: format!("{}/v1/tasks", base_url.trim_end_matches('/')),
        })
    }

    #[instrument(skip_all, fields(task_id = %task.task_id, prompt_type = %task.prompt_type))]
    async fn post(&self, task: &GenerationTask) -> Result<(), DomainError> {
        let response = self
            .client
            .post(&self.tasks_url)
            .json(task)
            .send()
            .await
            .map_err(|e| DomainError::Dispatch(format!("worker unreachable: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            return Err(DomainError::Dispatch(format!(
                "worker rejected task with status {status}"
            )));
        }
        debug!(%status, "worker accepted task");
        Ok(())
    }
}

#[async_trait]
impl GenerationDispatcher for HttpGenerationDispatcher {
    async fn dispatch_generation(&self, task: &GenerationTask) -> Result<(), DomainError> {
        self.post(task).await
    }

    async fn dispatch_ending(&self, task: &GenerationTask) -> Result<(), DomainError> {
        self.post(task).await
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, BTreeSet};
    use std::sync::{Arc, Mutex};

    use axum::extract::State;
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::{Value, json};
    use storyloop_core::dispatch::{GenerationInput, PromptType};
    use tokio::net::TcpListener;
    use uuid::Uuid;

    use super::*;

    type Received = Arc<Mutex<Vec<Value>>>;

    fn task() -> GenerationTask {
        GenerationTask {
            task_id: Uuid::new_v4(),
            player_id: Uuid::new_v4(),
            story_id: Uuid::new_v4(),
            game_state_id: Uuid::new_v4(),
            prompt_type: PromptType::ContinueScene,
            state_hash: "abc".into(),
            language: "en".into(),
            input: GenerationInput {
                story_config: json!({}),
                story_setup: json!({}),
                core_stats: BTreeMap::from([("tension".to_owned(), 7)]),
                story_variables: BTreeMap::new(),
                global_flags: BTreeSet::new(),
                encountered_characters: Vec::new(),
                last_story_summary: None,
                last_future_direction: None,
                last_var_impact_summary: None,
                made_choices: Vec::new(),
                termination: None,
            },
        }
    }

    /// Starts a fake worker answering every task with `status`.
    async fn fake_worker(status: StatusCode) -> (String, Received) {
        let received: Received = Arc::default();
        let app = Router::new()
            .route(
                "/v1/tasks",
                post(move |State(received): State<Received>, Json(body): Json<Value>| async move {
                    received.lock().unwrap().push(body);
                    status
                }),
            )
            .with_state(Arc::clone(&received));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}"), received)
    }

    #[tokio::test]
    async fn test_accepted_task_is_posted_as_json() {
        // Arrange
        let (url, received) = fake_worker(StatusCode::ACCEPTED).await;
        let dispatcher = HttpGenerationDispatcher::new(&url, Duration::from_secs(5)).unwrap();
        let task = task();

        // Act
        dispatcher.dispatch_generation(&task).await.unwrap();

        // Assert
        let bodies = received.lock().unwrap().clone();
        assert_eq!(bodies.len(), 1);
        assert_eq!(bodies[0]["task_id"], task.task_id.to_string());
        assert_eq!(bodies[0]["prompt_type"], "continue_scene");
        assert_eq!(bodies[0]["input"]["core_stats"]["tension"], 7);
    }

    #[tokio::test]
    async fn test_rejected_task_is_a_dispatch_error() {
        let (url, _) = fake_worker(StatusCode::SERVICE_UNAVAILABLE).await;
        let dispatcher = HttpGenerationDispatcher::new(&url, Duration::from_secs(5)).unwrap();

        let result = dispatcher.dispatch_ending(&task()).await;

        assert!(matches!(result, Err(DomainError::Dispatch(_))));
    }

    #[tokio::test]
    async fn test_unreachable_worker_is_a_dispatch_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let dispatcher =
            HttpGenerationDispatcher::new(&format!("http://{addr}/"), Duration::from_secs(1))
                .unwrap();

        let result = dispatcher.dispatch_generation(&task()).await;

        assert!(matches!(result, Err(DomainError::Dispatch(_))));
    }
}
