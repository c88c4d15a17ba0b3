//! HTTP client for the remote profile store.
//!
//! `POST {base}/survey/steps` with `{stage, stage_number, payload}` and
//! `POST {base}/survey/profile` with the consolidated record.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;

use crate::error::{ProfileError, SyncError};
use crate::survey::collaborators::RemoteProfileStore;
use crate::survey::stage::SurveyStageId;

#[derive(Serialize)]
struct StepBody<'a> {
    stage: SurveyStageId,
    stage_number: u32,
    payload: &'a serde_json::Value,
}

pub struct HttpProfileStore {
    client: reqwest::Client,
    base_url: String,
    token: Option<SecretString>,
}

impl HttpProfileStore {
    pub fn new(base_url: impl Into<String>, token: Option<SecretString>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        let req = self.client.post(self.url(path));
        match &self.token {
            Some(token) => req.bearer_auth(token.expose_secret()),
            None => req,
        }
    }
}

#[async_trait]
impl RemoteProfileStore for HttpProfileStore {
    async fn save_step(
        &self,
        stage: SurveyStageId,
        stage_number: u32,
        payload: &serde_json::Value,
    ) -> Result<(), SyncError> {
        let resp = self
            .post("survey/steps")
            .json(&StepBody {
                stage,
                stage_number,
                payload,
            })
            .send()
            .await
            .map_err(|e| SyncError::Transport(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(SyncError::Rejected {
                stage,
                reason: format!("HTTP {status}: {body}"),
            });
        }
        Ok(())
    }

    async fn save_final_profile(&self, record: &serde_json::Value) -> Result<(), ProfileError> {
        let resp = self
            .post("survey/profile")
            .json(record)
            .send()
            .await
            .map_err(|e| ProfileError::RequestFailed(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(ProfileError::Status { status, body });
        }
        tracing::info!("Final survey profile saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use axum::extract::State;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use axum::{Json, Router};
    use tokio::net::TcpListener;

    use super::*;

    #[derive(Clone, Default)]
    struct Received {
        steps: Arc<Mutex<Vec<serde_json::Value>>>,
        auth: Arc<Mutex<Option<String>>>,
    }

    async fn steps(
        State(r): State<Received>,
        headers: HeaderMap,
        Json(body): Json<serde_json::Value>,
    ) -> StatusCode {
        *r.auth.lock().unwrap() = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(String::from);
        r.steps.lock().unwrap().push(body);
        StatusCode::NO_CONTENT
    }

    async fn profile() -> (StatusCode, &'static str) {
        (StatusCode::SERVICE_UNAVAILABLE, "maintenance")
    }

    async fn start_remote() -> (String, Received) {
        let received = Received::default();
        let app = Router::new()
            .route("/survey/steps", post(steps))
            .route("/survey/profile", post(profile))
            .with_state(received.clone());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://127.0.0.1:{port}/"), received)
    }

    #[tokio::test]
    async fn save_step_posts_json_with_bearer_token() {
        let (base, received) = start_remote().await;
        let store = HttpProfileStore::new(base, Some(SecretString::from("tok-123")));

        store
            .save_step(SurveyStageId::Interests, 17, &serde_json::json!(["music"]))
            .await
            .unwrap();

        let steps = received.steps.lock().unwrap().clone();
        assert_eq!(
            steps,
            vec![serde_json::json!({"stage": "interests", "stage_number": 17, "payload": ["music"]})]
        );
        assert_eq!(
            received.auth.lock().unwrap().as_deref(),
            Some("Bearer tok-123")
        );
    }

    #[tokio::test]
    async fn non_success_status_is_an_error() {
        let (base, _received) = start_remote().await;
        let store = HttpProfileStore::new(base, None);

        let err = store
            .save_final_profile(&serde_json::json!({"answers": {}}))
            .await
            .unwrap_err();
        assert!(matches!(err, ProfileError::Status { status: 503, .. }));
    }

    #[tokio::test]
    async fn unreachable_remote_is_transport_error() {
        // Nothing listens on port 9 locally.
        let store = HttpProfileStore::new("http://127.0.0.1:9", None);
        let err = store
            .save_step(SurveyStageId::Age, 1, &serde_json::json!("18-24"))
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Transport(_)));
    }
}
