use std::sync::Arc;

use tower_http::cors::CorsLayer;

use survey_flow::config::ServerConfig;
use survey_flow::remote::HttpProfileStore;
use survey_flow::store::{LibSqlStateStore, StateStore};
use survey_flow::survey::{
    DisabledProfileStore, RecordingNavigator, RemoteProfileStore, StaticSession, SurveyDeps,
    SurveyRouteState, SurveySequencer, TrackingPresenter, survey_routes,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = ServerConfig::from_env()?;

    eprintln!("📋 Survey Flow v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Survey API: http://0.0.0.0:{}/api/survey/status", config.port);
    eprintln!("   Survey WS: ws://0.0.0.0:{}/api/survey/ws", config.port);
    match &config.profile_url {
        Some(url) => eprintln!("   Profile store: {}", url),
        None => eprintln!("   Profile store: disabled"),
    }

    // ── Survey state storage ─────────────────────────────────────────────
    let store: Arc<dyn StateStore> = match &config.db_path {
        Some(path) => Arc::new(LibSqlStateStore::new_local(path).await?),
        None => Arc::new(LibSqlStateStore::new_memory().await?),
    };

    let remote: Arc<dyn RemoteProfileStore> = match &config.profile_url {
        Some(url) => Arc::new(HttpProfileStore::new(url.clone(), config.profile_token.clone())),
        None => Arc::new(DisabledProfileStore),
    };

    let navigator = RecordingNavigator::new();
    let deps = SurveyDeps {
        store,
        remote,
        session: Arc::new(StaticSession::new(config.session.clone())),
        presenter: TrackingPresenter::new(),
        navigator: navigator.clone(),
    };
    let sequencer = SurveySequencer::new(config.survey.clone(), deps);

    // Resume after the server is up so clients see the reopened stage.
    {
        let sequencer = Arc::clone(&sequencer);
        tokio::spawn(async move {
            match sequencer.resume().await {
                Some(stage) => tracing::info!(%stage, "Resumed in-progress survey"),
                None => tracing::debug!("No survey to resume"),
            }
        });
    }

    let app = survey_routes(SurveyRouteState { sequencer }).layer(CorsLayer::permissive());
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?;
    tracing::info!(port = config.port, "Survey server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("Shutting down");
        })
        .await?;

    if let Some(destination) = navigator.last() {
        tracing::info!(%destination, "Last navigation this run");
    }
    Ok(())
}
