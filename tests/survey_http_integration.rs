//! Integration tests for the survey REST + WebSocket surface.
//!
//! Each test spins up the survey server (and a mock remote profile store)
//! on random ports and drives the real HTTP contract with reqwest and
//! tokio-tungstenite.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use survey_flow::config::SurveyConfig;
use survey_flow::remote::HttpProfileStore;
use survey_flow::store::{LibSqlStateStore, MemoryStateStore, StateStore};
use survey_flow::survey::{
    Destination, RecordingNavigator, SessionSnapshot, StaticSession, SurveyDeps,
    SurveyRouteState, SurveySequencer, SurveyStageId, TrackingPresenter, survey_routes,
};

/// Maximum time any test is allowed to run before we consider it hung.
const TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// What the mock profile store received.
#[derive(Clone, Default)]
struct RemoteLog {
    steps: Arc<Mutex<Vec<Value>>>,
    profiles: Arc<Mutex<Vec<Value>>>,
}

async fn record_step(State(log): State<RemoteLog>, Json(body): Json<Value>) -> StatusCode {
    log.steps.lock().unwrap().push(body);
    StatusCode::NO_CONTENT
}

async fn record_profile(State(log): State<RemoteLog>, Json(body): Json<Value>) -> StatusCode {
    log.profiles.lock().unwrap().push(body);
    StatusCode::CREATED
}

async fn serve(app: Router) -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    port
}

/// Start a mock remote profile store, return (base url, log).
async fn start_remote() -> (String, RemoteLog) {
    let log = RemoteLog::default();
    let app = Router::new()
        .route("/survey/steps", post(record_step))
        .route("/survey/profile", post(record_profile))
        .with_state(log.clone());
    let port = serve(app).await;
    (format!("http://127.0.0.1:{port}"), log)
}

struct Server {
    base: String,
    port: u16,
    remote: RemoteLog,
    navigator: Arc<RecordingNavigator>,
}

/// Start the survey server on a random port over the given store.
async fn start_server(store: Arc<dyn StateStore>) -> Server {
    let (remote_url, remote) = start_remote().await;
    let navigator = RecordingNavigator::new();
    let deps = SurveyDeps {
        store,
        remote: Arc::new(HttpProfileStore::new(remote_url, None)),
        session: Arc::new(StaticSession::new(SessionSnapshot::standard_online())),
        presenter: TrackingPresenter::new(),
        navigator: navigator.clone(),
    };
    let config = SurveyConfig {
        resume_settle_delay: Duration::ZERO,
        ..SurveyConfig::default()
    };
    let sequencer = SurveySequencer::new(config, deps);
    let port = serve(survey_routes(SurveyRouteState { sequencer })).await;

    // Give the server a moment to start accepting connections.
    tokio::time::sleep(Duration::from_millis(50)).await;

    Server {
        base: format!("http://127.0.0.1:{port}"),
        port,
        remote,
        navigator,
    }
}

async fn post_json(base: &str, path: &str, body: Value) -> (u16, Value) {
    let resp = reqwest::Client::new()
        .post(format!("{base}{path}"))
        .json(&body)
        .send()
        .await
        .unwrap();
    let status = resp.status().as_u16();
    let body = resp.json::<Value>().await.unwrap_or(Value::Null);
    (status, body)
}

async fn get_json(base: &str, path: &str) -> Value {
    reqwest::get(format!("{base}{path}"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap()
}

fn payload_for(stage: SurveyStageId) -> Value {
    match stage {
        SurveyStageId::Age => json!("4-17"),
        SurveyStageId::EnglishLevel => json!({"level": "Upper-Intermediate"}),
        SurveyStageId::LearningPurpose => json!(["School"]),
        SurveyStageId::Vocabulary => json!(["cat", "dog"]),
        SurveyStageId::IntermediateVocabulary => json!(["although"]),
        _ => json!({"answer": stage.as_str()}),
    }
}

/// Wait until `check` holds, polling the shared log.
async fn eventually(check: impl Fn() -> bool) {
    while !check() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn health_reports_ok() {
    timeout(TEST_TIMEOUT, async {
        let server = start_server(Arc::new(MemoryStateStore::new())).await;
        let body = get_json(&server.base, "/health").await;
        assert_eq!(body["status"], "ok");
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn full_walkthrough_syncs_every_step_and_routes_once() {
    timeout(TEST_TIMEOUT, async {
        let server = start_server(Arc::new(MemoryStateStore::new())).await;

        let (status, body) = post_json(&server.base, "/api/survey/show", json!({})).await;
        assert_eq!(status, 200);
        assert_eq!(body["stage"], "age");

        let mut stage = SurveyStageId::FIRST;
        while !stage.is_terminal() {
            let (status, body) = post_json(
                &server.base,
                &format!("/api/survey/stages/{}/advance", stage.as_str()),
                payload_for(stage),
            )
            .await;
            assert_eq!(status, 200, "advance {stage} failed: {body}");
            stage = stage.next().unwrap();
            assert_eq!(body["to"], stage.as_str());
        }

        let status = get_json(&server.base, "/api/survey/status").await;
        assert_eq!(status["active_stage"], "personalization");
        assert_eq!(status["stage_number"], 18);

        let (code, report) = post_json(
            &server.base,
            "/api/survey/complete",
            json!({"nickname": "sam"}),
        )
        .await;
        assert_eq!(code, 200);
        // Legacy kids bucket with an upper-intermediate level.
        assert_eq!(report["destination"], "kids_teen");
        assert_eq!(report["path"], "/kids/teen");
        assert_eq!(report["profile_saved"], true);
        assert_eq!(server.navigator.calls(), vec![Destination::KidsTeen]);

        // Every stage but the last is synced on its own.
        let steps = Arc::clone(&server.remote.steps);
        eventually(|| steps.lock().unwrap().len() == 17).await;
        let profiles = server.remote.profiles.lock().unwrap().clone();
        assert_eq!(profiles.len(), 1);
        assert_eq!(profiles[0]["answers"]["personalization"]["nickname"], "sam");

        // Finished sessions reject further transitions.
        let (code, _) = post_json(&server.base, "/api/survey/complete", json!({})).await;
        assert_eq!(code, 409);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn illegal_transitions_are_rejected() {
    timeout(TEST_TIMEOUT, async {
        let server = start_server(Arc::new(MemoryStateStore::new())).await;

        let (code, _) = post_json(&server.base, "/api/survey/stages/age/advance", json!("18-24")).await;
        assert_eq!(code, 409, "nothing is open yet");

        post_json(&server.base, "/api/survey/show", json!({})).await;
        let (code, _) = post_json(&server.base, "/api/survey/show", json!({})).await;
        assert_eq!(code, 409, "a stage is already open");

        let (code, _) = post_json(&server.base, "/api/survey/stages/age/back", json!({})).await;
        assert_eq!(code, 409, "first stage has no predecessor");

        let (code, _) = post_json(&server.base, "/api/survey/stages/nope/back", json!({})).await;
        assert_eq!(code, 400);

        let (code, _) = post_json(&server.base, "/api/survey/complete", json!({})).await;
        assert_eq!(code, 409);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn skip_closes_survey_without_routing() {
    timeout(TEST_TIMEOUT, async {
        let server = start_server(Arc::new(MemoryStateStore::new())).await;
        post_json(&server.base, "/api/survey/show", json!({})).await;
        post_json(&server.base, "/api/survey/stages/age/advance", json!("18-24")).await;

        let (code, body) = post_json(&server.base, "/api/survey/skip", json!({})).await;
        assert_eq!(code, 200);
        assert_eq!(body["closed"], "native_language");

        let status = get_json(&server.base, "/api/survey/status").await;
        assert_eq!(status["in_progress"], false);
        assert!(status["active_stage"].is_null());
        assert!(server.navigator.calls().is_empty());

        let (_, body) = post_json(&server.base, "/api/survey/resume", json!({})).await;
        assert!(body["stage"].is_null());
    })
    .await
    .expect("test timed out");
}

async fn file_store(path: &Path) -> Arc<dyn StateStore> {
    Arc::new(LibSqlStateStore::new_local(path).await.unwrap())
}

#[tokio::test]
async fn resume_after_restart_reopens_stage_with_answers() {
    timeout(TEST_TIMEOUT, async {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("survey.db");

        let first = start_server(file_store(&db_path).await).await;
        post_json(&first.base, "/api/survey/show", json!({})).await;
        for stage in [
            SurveyStageId::Age,
            SurveyStageId::NativeLanguage,
            SurveyStageId::EnglishLevel,
        ] {
            let (code, _) = post_json(
                &first.base,
                &format!("/api/survey/stages/{}/advance", stage.as_str()),
                payload_for(stage),
            )
            .await;
            assert_eq!(code, 200);
        }

        // A fresh process over the same database.
        let second = start_server(file_store(&db_path).await).await;
        let (code, body) = post_json(&second.base, "/api/survey/resume", json!({})).await;
        assert_eq!(code, 200);
        assert_eq!(body["stage"], "learning_purpose");

        let status = get_json(&second.base, "/api/survey/status").await;
        assert_eq!(status["active_stage"], "learning_purpose");
        assert_eq!(status["answers"]["age"], "4-17");
        assert_eq!(status["answers"]["english_level"]["level"], "Upper-Intermediate");
    })
    .await
    .expect("test timed out");
}

/// Read the next text frame as JSON.
async fn next_json<S>(ws: &mut S) -> Value
where
    S: StreamExt<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    loop {
        match ws.next().await.expect("stream ended").unwrap() {
            Message::Text(text) => return serde_json::from_str(&text).unwrap(),
            _ => continue,
        }
    }
}

#[tokio::test]
async fn websocket_streams_status_and_sync_outcomes() {
    timeout(TEST_TIMEOUT, async {
        let server = start_server(Arc::new(MemoryStateStore::new())).await;
        let (mut ws, _) = connect_async(format!("ws://127.0.0.1:{}/api/survey/ws", server.port))
            .await
            .unwrap();

        let hello = next_json(&mut ws).await;
        assert_eq!(hello["type"], "status");
        assert_eq!(hello["status"]["phase"], "idle");

        post_json(&server.base, "/api/survey/show", json!({})).await;
        post_json(&server.base, "/api/survey/stages/age/advance", json!("25-34")).await;

        let event = next_json(&mut ws).await;
        assert_eq!(event["type"], "sync");
        assert_eq!(event["stage"], "age");
        assert_eq!(event["stage_number"], 1);
        assert_eq!(event["outcome"], "saved");
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn websocket_client_actions_drive_the_survey() {
    timeout(TEST_TIMEOUT, async {
        let server = start_server(Arc::new(MemoryStateStore::new())).await;
        let (mut ws, _) = connect_async(format!("ws://127.0.0.1:{}/api/survey/ws", server.port))
            .await
            .unwrap();
        let hello = next_json(&mut ws).await;
        assert!(hello["status"]["active_stage"].is_null());

        ws.send(Message::Text(json!({"action": "show"}).to_string().into()))
            .await
            .unwrap();
        let shown = next_json(&mut ws).await;
        assert_eq!(shown["type"], "status");
        assert_eq!(shown["status"]["active_stage"], "age");

        ws.send(Message::Text(
            json!({"action": "advance", "stage": "age", "payload": "25-34"})
                .to_string()
                .into(),
        ))
        .await
        .unwrap();

        // The refreshed status and the step's sync outcome race each other.
        let mut status = None;
        let mut sync = None;
        for _ in 0..2 {
            let frame = next_json(&mut ws).await;
            match frame["type"].as_str() {
                Some("status") => status = Some(frame),
                Some("sync") => sync = Some(frame),
                other => panic!("unexpected frame type {other:?}"),
            }
        }
        let status = status.expect("no status frame");
        assert_eq!(status["status"]["active_stage"], "native_language");
        assert_eq!(status["status"]["answers"]["age"], "25-34");
        let sync = sync.expect("no sync frame");
        assert_eq!(sync["stage"], "age");
        assert_eq!(sync["outcome"], "saved");

        ws.send(Message::Text(json!({"action": "skip"}).to_string().into()))
            .await
            .unwrap();
        let skipped = next_json(&mut ws).await;
        assert_eq!(skipped["type"], "status");
        assert_eq!(skipped["status"]["in_progress"], false);
        assert!(skipped["status"]["active_stage"].is_null());
        assert!(server.navigator.calls().is_empty());
    })
    .await
    .expect("test timed out");
}
