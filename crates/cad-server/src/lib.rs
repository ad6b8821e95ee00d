pub mod config;
pub mod error;

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use cad_ai::ParameterValue;
use cad_artifacts::ArtifactId;
use cad_pipeline::{ModelArtifacts, Pipeline, ScriptArtifact};
use http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use http::{HeaderMap, HeaderValue, Method};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use config::{Config, ConfigError};
pub use error::ApiError;

const MESH_CONTENT_TYPE: &str = "model/stl";

#[derive(Clone)]
pub struct AppState {
    pipeline: Arc<Pipeline>,
    allowed_origin: Option<HeaderValue>,
}

impl AppState {
    pub fn new(pipeline: Pipeline) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            allowed_origin: None,
        }
    }

    /// Restricts CORS to a single frontend origin.
    pub fn with_allowed_origin(mut self, origin: HeaderValue) -> Self {
        self.allowed_origin = Some(origin);
        self
    }
}

pub fn app(state: AppState) -> Router {
    let cors = cors_layer(state.allowed_origin.clone());
    Router::new()
        .route("/", get(health))
        .route("/health", get(health))
        .route("/generate", post(generate))
        .route("/generate-models", post(generate_models))
        .route("/convert", post(convert))
        .route("/render-model", get(render_model))
        .route("/artifacts/{id}/model.stl", get(artifact_mesh))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

fn cors_layer(origin: Option<HeaderValue>) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);
    match origin {
        Some(origin) => layer.allow_origin(origin),
        None => layer.allow_origin(Any),
    }
}

#[derive(Debug, Default, Deserialize)]
struct GenerateRequest {
    size: Option<ParameterValue>,
    fillet: Option<ParameterValue>,
}

#[derive(Debug, Deserialize)]
struct GenerateModelsRequest {
    #[serde(default)]
    prompt: String,
}

#[derive(Debug, Deserialize)]
struct ConvertRequest {
    #[serde(default)]
    code: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct HealthResponse {
    status: String,
    message: String,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        message: "Text-to-CAD backend running!".to_string(),
    })
}

async fn generate(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<ScriptArtifact>, ApiError> {
    // Both fields are optional, so an empty body means "use the defaults".
    let request: GenerateRequest = if body.is_empty() {
        GenerateRequest::default()
    } else {
        parse_json(&body)?
    };
    let artifact = state
        .pipeline
        .generate_script(request.size, request.fillet)
        .await?;
    Ok(Json(artifact))
}

async fn generate_models(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<ModelArtifacts>, ApiError> {
    let request: GenerateModelsRequest = parse_json(&body)?;
    let artifacts = state.pipeline.generate_models(&request.prompt).await?;
    Ok(Json(artifacts))
}

/// Accepts `{"code": ...}` as JSON, or the OpenSCAD source as the raw body.
async fn convert(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let code = if is_json(&headers) {
        parse_json::<ConvertRequest>(&body)?.code
    } else {
        String::from_utf8(body.to_vec())
            .map_err(|_| ApiError::bad_request("request body must be UTF-8 text"))?
    };

    let mesh = state.pipeline.convert(&code).await?;
    Ok(mesh_response(mesh.bytes, &format!("{}.stl", mesh.id)))
}

async fn render_model(State(state): State<AppState>) -> Result<Response, ApiError> {
    match state.pipeline.latest_mesh().await? {
        Some(bytes) => Ok(mesh_response(bytes, "model.stl")),
        None => Err(ApiError::not_found("STL file not found")),
    }
}

async fn artifact_mesh(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let id: ArtifactId = id
        .parse()
        .map_err(|_| ApiError::not_found("STL file not found"))?;
    match state.pipeline.mesh(id).await? {
        Some(bytes) => Ok(mesh_response(bytes, "model.stl")),
        None => Err(ApiError::not_found("STL file not found")),
    }
}

fn mesh_response(bytes: Vec<u8>, file_name: &str) -> Response {
    (
        [
            (CONTENT_TYPE, MESH_CONTENT_TYPE.to_string()),
            (
                CONTENT_DISPOSITION,
                format!("attachment; filename=\"{file_name}\""),
            ),
        ],
        bytes,
    )
        .into_response()
}

fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("application/json"))
}

fn parse_json<T: DeserializeOwned>(body: &Bytes) -> Result<T, ApiError> {
    if body.is_empty() {
        return Err(ApiError::bad_request("request body is required"));
    }

    serde_json::from_slice(body)
        .map_err(|err| ApiError::bad_request(format!("invalid JSON body: {err}")))
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::path::Path;
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use axum::Router;
    use axum::body::Body;
    use axum::response::Response;
    use cad_ai::{LanguageModel, ModelError, ModelRequest, ScriptGenerator};
    use cad_artifacts::{ArtifactStore, MeshConverter};
    use cad_pipeline::Pipeline;
    use futures::future::join_all;
    use http::header::{CONTENT_TYPE, ORIGIN};
    use http::{HeaderValue, Method, Request, StatusCode};
    use http_body_util::BodyExt;
    use serde_json::json;
    use tower::ServiceExt;

    use super::{AppState, app};

    #[derive(Default)]
    struct ScriptedModel {
        replies: Mutex<VecDeque<String>>,
        calls: Mutex<usize>,
    }

    impl ScriptedModel {
        fn call_count(&self) -> usize {
            *self.calls.lock().expect("calls lock should not be poisoned")
        }
    }

    #[async_trait]
    impl LanguageModel for ScriptedModel {
        async fn complete(&self, _request: ModelRequest<'_>) -> Result<String, ModelError> {
            *self.calls.lock().expect("calls lock should not be poisoned") += 1;
            self.replies
                .lock()
                .expect("replies lock should not be poisoned")
                .pop_front()
                .ok_or_else(|| ModelError::Unavailable("upstream offline".to_string()))
        }
    }

    /// Stands in for openscad: copies the source to the mesh path, or fails
    /// with a partial mesh when the source mentions `fail`.
    const FAKE_COMPILER: &str = r#"
if grep -q fail "$3"; then
  printf partial > "$2"
  echo "ERROR: Parser error in line 1" >&2
  exit 1
fi
cp "$3" "$2"
"#;

    struct TestApp {
        router: Router,
        model: Arc<ScriptedModel>,
        _dir: tempfile::TempDir,
    }

    impl TestApp {
        fn root(&self) -> &Path {
            self._dir.path()
        }
    }

    fn test_app(replies: &[&str]) -> TestApp {
        let dir = tempfile::tempdir().expect("temp dir should be created");
        let model = Arc::new(ScriptedModel {
            replies: Mutex::new(replies.iter().map(|reply| reply.to_string()).collect()),
            calls: Mutex::new(0),
        });
        let pipeline = Pipeline::new(
            ScriptGenerator::new(model.clone()),
            ArtifactStore::new(dir.path()),
            MeshConverter::new("sh").with_args(["-c", FAKE_COMPILER, "compiler"]),
        );
        TestApp {
            router: app(AppState::new(pipeline)),
            model,
            _dir: dir,
        }
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let test = test_app(&[]);
        for uri in ["/", "/health"] {
            let response = send(test.router.clone(), Method::GET, uri, Body::empty(), None).await;
            assert_eq!(response.status(), StatusCode::OK);
            let body = parse_json_value(response).await;
            assert_eq!(body["status"], "ok");
        }
    }

    #[tokio::test]
    async fn generate_returns_cube_script() {
        let test = test_app(&["```\nSub CATMain()\nEnd Sub\n```"]);
        let response = send_json(
            test.router.clone(),
            "/generate",
            json!({"size": 30, "fillet": "4"}),
        )
        .await;

        assert_eq!(response.status(), StatusCode::OK);
        let body = parse_json_value(response).await;
        assert_eq!(body["script"], "Sub CATMain()\nEnd Sub");
        assert!(
            body["catscript_path"]
                .as_str()
                .is_some_and(|path| path.ends_with("model.CATScript"))
        );
    }

    #[tokio::test]
    async fn generate_with_empty_body_uses_default_cube() {
        let test = test_app(&["Sub CATMain()\nEnd Sub"]);
        let response = send(
            test.router.clone(),
            Method::POST,
            "/generate",
            Body::empty(),
            None,
        )
        .await;

        assert_eq!(response.status(), StatusCode::OK);
        let body = parse_json_value(response).await;
        assert_eq!(body["script"], "Sub CATMain()\nEnd Sub");
        assert_eq!(test.model.call_count(), 1);
    }

    #[tokio::test]
    async fn generate_model_failure_returns_500() {
        let test = test_app(&[]);
        let response = send_json(test.router.clone(), "/generate", json!({})).await;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = parse_json_value(response).await;
        assert!(
            body["error"]
                .as_str()
                .unwrap_or_default()
                .contains("upstream offline")
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn generate_models_returns_artifact_paths_and_code() {
        let test = test_app(&["SCAD:\nfoo\n\nCATScript:\nbar"]);
        let response = send_json(
            test.router.clone(),
            "/generate-models",
            json!({"prompt": "a cube"}),
        )
        .await;

        assert_eq!(response.status(), StatusCode::OK);
        let body = parse_json_value(response).await;
        assert_eq!(body["scad_code"], "foo");
        assert_eq!(body["catscript_code"], "bar");
        for key in ["scad_path", "stl_path", "catscript_path"] {
            let path = body[key].as_str().expect("path should be a string");
            assert!(Path::new(path).exists(), "{key} should exist at {path}");
        }
    }

    #[tokio::test]
    async fn generate_models_blank_prompt_returns_400_without_model_call() {
        let test = test_app(&["SCAD:\nfoo\nCATScript:\nbar"]);
        let response = send_json(
            test.router.clone(),
            "/generate-models",
            json!({"prompt": "   "}),
        )
        .await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = parse_json_value(response).await;
        assert_eq!(body["error"], "prompt is required");
        assert_eq!(test.model.call_count(), 0);
    }

    #[tokio::test]
    async fn generate_models_empty_body_returns_400() {
        let test = test_app(&[]);
        let response = send(
            test.router.clone(),
            Method::POST,
            "/generate-models",
            Body::empty(),
            None,
        )
        .await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = parse_json_value(response).await;
        assert!(
            body["error"]
                .as_str()
                .unwrap_or_default()
                .contains("request body")
        );
    }

    #[tokio::test]
    async fn generate_models_unparsable_reply_returns_500() {
        let test = test_app(&["Here is your OpenSCAD code: cube(10);"]);
        let response = send_json(
            test.router.clone(),
            "/generate-models",
            json!({"prompt": "a cube"}),
        )
        .await;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = parse_json_value(response).await;
        assert!(body["error"].as_str().unwrap_or_default().contains("SCAD:"));
        assert!(body.get("diagnostics").is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn convert_raw_text_returns_stl_download() {
        let test = test_app(&[]);
        let response = send(
            test.router.clone(),
            Method::POST,
            "/convert",
            Body::from("cube(10);"),
            Some("text/plain"),
        )
        .await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(CONTENT_TYPE),
            Some(&HeaderValue::from_static("model/stl"))
        );
        let disposition = response
            .headers()
            .get("content-disposition")
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string();
        assert!(disposition.starts_with("attachment; filename=\""));
        assert!(disposition.ends_with(".stl\""));
        assert_eq!(read_body_bytes(response).await.as_ref(), b"cube(10);");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn convert_json_failure_returns_diagnostics_and_cleans_up() {
        let test = test_app(&[]);
        let response = send_json(test.router.clone(), "/convert", json!({"code": "fail();"})).await;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = parse_json_value(response).await;
        assert!(
            body["error"]
                .as_str()
                .unwrap_or_default()
                .contains("mesh conversion failed")
        );
        assert!(
            body["diagnostics"]
                .as_str()
                .unwrap_or_default()
                .contains("Parser error")
        );

        let leftovers = std::fs::read_dir(test.root())
            .expect("root should be listable")
            .count();
        assert_eq!(leftovers, 0);
    }

    #[tokio::test]
    async fn convert_blank_code_returns_400() {
        let test = test_app(&[]);
        let response = send_json(test.router.clone(), "/convert", json!({"code": ""})).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn render_model_before_generation_returns_404() {
        let test = test_app(&[]);
        let response = send(
            test.router.clone(),
            Method::GET,
            "/render-model",
            Body::empty(),
            None,
        )
        .await;

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = parse_json_value(response).await;
        assert_eq!(body["error"], "STL file not found");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn render_model_and_artifact_route_serve_generated_mesh() {
        let test = test_app(&["SCAD:\ncube(5);\nCATScript:\nbar"]);
        let response = send_json(
            test.router.clone(),
            "/generate-models",
            json!({"prompt": "a small cube"}),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let id = parse_json_value(response).await["id"]
            .as_str()
            .expect("id should be a string")
            .to_string();

        for uri in ["/render-model".to_string(), format!("/artifacts/{id}/model.stl")] {
            let response =
                send(test.router.clone(), Method::GET, &uri, Body::empty(), None).await;
            assert_eq!(response.status(), StatusCode::OK, "GET {uri}");
            assert_eq!(read_body_bytes(response).await.as_ref(), b"cube(5);");
        }
    }

    #[tokio::test]
    async fn artifact_route_rejects_non_id_segments() {
        let test = test_app(&[]);
        let response = send(
            test.router.clone(),
            Method::GET,
            "/artifacts/..%2F..%2Fetc/model.stl",
            Body::empty(),
            None,
        )
        .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn concurrent_generations_never_share_artifacts() {
        let replies = (0..8)
            .map(|index| format!("SCAD:\ncube({index});\nCATScript:\nbar"))
            .collect::<Vec<_>>();
        let replies = replies.iter().map(String::as_str).collect::<Vec<_>>();
        let test = test_app(&replies);

        let futures = (0..8).map(|_| {
            send_json(
                test.router.clone(),
                "/generate-models",
                json!({"prompt": "a cube"}),
            )
        });
        let responses = join_all(futures).await;

        let mut meshes = Vec::new();
        for response in responses {
            assert_eq!(response.status(), StatusCode::OK);
            let body = parse_json_value(response).await;
            let scad = body["scad_code"].as_str().unwrap_or_default().to_string();
            let stl = std::fs::read_to_string(body["stl_path"].as_str().unwrap_or_default())
                .expect("mesh should exist");
            assert_eq!(stl, scad, "mesh must come from the same request's script");
            meshes.push(stl);
        }
        meshes.sort();
        meshes.dedup();
        assert_eq!(meshes.len(), 8);
    }

    #[tokio::test]
    async fn cors_is_permissive_by_default() {
        let test = test_app(&[]);
        let response = send(
            test.router.clone(),
            Method::GET,
            "/health",
            Body::empty(),
            None,
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(allow_origin(&response), "*");
    }

    #[tokio::test]
    async fn cors_can_be_restricted_to_the_frontend() {
        let dir = tempfile::tempdir().expect("temp dir should be created");
        let pipeline = Pipeline::new(
            ScriptGenerator::new(Arc::new(ScriptedModel::default())),
            ArtifactStore::new(dir.path()),
            MeshConverter::default(),
        );
        let router = app(AppState::new(pipeline)
            .with_allowed_origin(HeaderValue::from_static("http://localhost:5173")));

        let response = send(router, Method::GET, "/health", Body::empty(), None).await;
        assert_eq!(allow_origin(&response), "http://localhost:5173");
    }

    fn allow_origin(response: &Response) -> String {
        response
            .headers()
            .get("access-control-allow-origin")
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string()
    }

    async fn send_json(router: Router, uri: &str, value: serde_json::Value) -> Response {
        let body = serde_json::to_vec(&value).expect("json encoding should succeed");
        send(
            router,
            Method::POST,
            uri,
            Body::from(body),
            Some("application/json"),
        )
        .await
    }

    async fn send(
        router: Router,
        method: Method,
        uri: &str,
        body: Body,
        content_type: Option<&str>,
    ) -> Response {
        let mut request = Request::builder()
            .method(method)
            .uri(uri)
            .header(ORIGIN, "http://localhost:5173");
        if let Some(content_type) = content_type {
            request = request.header(CONTENT_TYPE, content_type);
        }
        let request = request.body(body).expect("request should build");

        router
            .oneshot(request)
            .await
            .expect("request should complete")
    }

    async fn parse_json_value(response: Response) -> serde_json::Value {
        let bytes = read_body_bytes(response).await;
        serde_json::from_slice(&bytes).expect("response should decode as JSON")
    }

    async fn read_body_bytes(response: Response) -> axum::body::Bytes {
        response
            .into_body()
            .collect()
            .await
            .expect("response body should collect")
            .to_bytes()
    }
}
