use std::sync::Arc;

use cad_ai::{GeminiClient, ScriptGenerator};
use cad_artifacts::ArtifactStore;
use cad_pipeline::Pipeline;
use cad_server::{AppState, Config, app};
use http::HeaderValue;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    let model = GeminiClient::new(config.gemini.clone())?;
    let pipeline = Pipeline::new(
        ScriptGenerator::new(Arc::new(model)),
        ArtifactStore::new(&config.artifact_dir),
        config.mesh_converter(),
    );

    let mut state = AppState::new(pipeline);
    if let Some(origin) = &config.frontend_origin {
        state = state.with_allowed_origin(HeaderValue::from_str(origin)?);
    }

    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    tracing::info!(
        address = %config.bind_address,
        artifacts = %config.artifact_dir.display(),
        model = %config.gemini.model,
        "cad server listening"
    );
    axum::serve(listener, app(state)).await?;
    Ok(())
}
