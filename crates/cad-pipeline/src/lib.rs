//! Generation-to-artifact pipeline: model → scripts on disk → mesh.

use std::path::{Path, PathBuf};

use cad_ai::{
    Dialect, GeneratedScripts, GenerationError, GenerationRequest, ModelError, ParameterValue,
    ParseError, PromptError, ScriptGenerator,
};
use cad_artifacts::{ArtifactId, ArtifactStore, ConversionError, MeshConverter, StoreError};
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("{0}")]
    MissingInput(String),
    #[error("model unavailable: {0}")]
    ModelUnavailable(#[source] ModelError),
    #[error("unparsable model response: {0}")]
    UnparsableResponse(#[source] ParseError),
    #[error(transparent)]
    Filesystem(#[from] StoreError),
    #[error("mesh conversion failed: {0}")]
    ConversionFailed(#[from] ConversionError),
}

impl PipelineError {
    /// Compiler output attached to a conversion failure.
    pub fn diagnostics(&self) -> Option<&str> {
        match self {
            PipelineError::ConversionFailed(err) => err.diagnostics(),
            _ => None,
        }
    }
}

impl From<GenerationError> for PipelineError {
    fn from(value: GenerationError) -> Self {
        match value {
            GenerationError::MissingInput(PromptError::MissingInput { field }) => {
                Self::MissingInput(format!("{field} is required"))
            }
            GenerationError::Model(err) => Self::ModelUnavailable(err),
            GenerationError::Unparsable(err) => Self::UnparsableResponse(err),
        }
    }
}

/// Result of a cube-parameter request: one CATScript.
#[derive(Debug, Clone, Serialize)]
pub struct ScriptArtifact {
    pub id: ArtifactId,
    pub script: String,
    pub catscript_path: PathBuf,
}

/// Result of a prompt request: both scripts plus the converted mesh.
#[derive(Debug, Clone, Serialize)]
pub struct ModelArtifacts {
    pub id: ArtifactId,
    pub scad_path: PathBuf,
    pub stl_path: PathBuf,
    pub catscript_path: PathBuf,
    pub scad_code: String,
    pub catscript_code: String,
}

/// Result of a direct conversion.
#[derive(Debug, Clone)]
pub struct ConvertedMesh {
    pub id: ArtifactId,
    pub bytes: Vec<u8>,
}

#[derive(Clone)]
pub struct Pipeline {
    generator: ScriptGenerator,
    store: ArtifactStore,
    converter: MeshConverter,
}

impl Pipeline {
    pub fn new(generator: ScriptGenerator, store: ArtifactStore, converter: MeshConverter) -> Self {
        Self {
            generator,
            store,
            converter,
        }
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    /// Generates a filleted-cube CATScript and stores it under a fresh id.
    pub async fn generate_script(
        &self,
        size: Option<ParameterValue>,
        fillet: Option<ParameterValue>,
    ) -> Result<ScriptArtifact, PipelineError> {
        let request = GenerationRequest::parameters(size, fillet);
        let scripts = self.generator.generate(&request).await?;
        let script = required_code(&scripts, Dialect::CatScript)?;

        let id = ArtifactId::new();
        let paths = self.store.generation_paths(id);
        self.store.write(&paths.catscript, &script).await?;
        tracing::info!(%id, "cube script generated");

        Ok(ScriptArtifact {
            id,
            script,
            catscript_path: paths.catscript,
        })
    }

    /// Generates OpenSCAD and CATScript for `prompt`, stores both and meshes the OpenSCAD one.
    ///
    /// On conversion failure the scripts stay on disk for inspection; only a
    /// partial mesh is removed and the latest-mesh pointer is left untouched.
    pub async fn generate_models(&self, prompt: &str) -> Result<ModelArtifacts, PipelineError> {
        let request = GenerationRequest::prompt(prompt);
        let scripts = self.generator.generate(&request).await?;
        let scad_code = required_code(&scripts, Dialect::OpenScad)?;
        let catscript_code = required_code(&scripts, Dialect::CatScript)?;

        let id = ArtifactId::new();
        let paths = self.store.generation_paths(id);
        self.store.write(&paths.scad, &scad_code).await?;
        self.store.write(&paths.catscript, &catscript_code).await?;

        if let Err(err) = self.converter.convert(&paths.scad, &paths.stl).await {
            tracing::warn!(%id, error = %err, "generated model did not convert");
            self.discard(&[paths.stl.as_path()]).await;
            return Err(err.into());
        }
        self.store.publish_latest(&paths.stl).await?;
        tracing::info!(%id, "models generated");

        Ok(ModelArtifacts {
            id,
            scad_path: paths.scad,
            stl_path: paths.stl,
            catscript_path: paths.catscript,
            scad_code,
            catscript_code,
        })
    }

    /// Converts caller-supplied OpenSCAD source into a mesh.
    ///
    /// Both files are deleted when the compiler fails.
    pub async fn convert(&self, code: &str) -> Result<ConvertedMesh, PipelineError> {
        if code.trim().is_empty() {
            return Err(PipelineError::MissingInput("code is required".to_string()));
        }

        let id = ArtifactId::new();
        let paths = self.store.conversion_paths(id);
        self.store.write(&paths.source, code).await?;

        if let Err(err) = self.converter.convert(&paths.source, &paths.mesh).await {
            tracing::warn!(%id, error = %err, "direct conversion failed");
            self.discard(&[paths.source.as_path(), paths.mesh.as_path()])
                .await;
            return Err(err.into());
        }

        let bytes = match self.store.read(&paths.mesh).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                tracing::warn!(%id, "compiler reported success but wrote no mesh");
                self.discard(&[paths.source.as_path(), paths.mesh.as_path()])
                    .await;
                return Err(StoreError {
                    path: paths.mesh,
                    source: std::io::ErrorKind::NotFound.into(),
                }
                .into());
            }
            Err(err) => {
                self.discard(&[paths.source.as_path(), paths.mesh.as_path()])
                    .await;
                return Err(err.into());
            }
        };
        tracing::info!(%id, bytes = bytes.len(), "script converted");
        Ok(ConvertedMesh { id, bytes })
    }

    /// Most recent successfully generated mesh, if any.
    pub async fn latest_mesh(&self) -> Result<Option<Vec<u8>>, PipelineError> {
        Ok(self.store.read(&self.store.latest_mesh_path()).await?)
    }

    /// Mesh of one earlier prompt generation, if it exists.
    pub async fn mesh(&self, id: ArtifactId) -> Result<Option<Vec<u8>>, PipelineError> {
        Ok(self.store.read(&self.store.generation_paths(id).stl).await?)
    }

    async fn discard(&self, paths: &[&Path]) {
        for path in paths {
            if let Err(err) = self.store.remove(path).await {
                tracing::warn!(error = %err, "cleanup failed");
            }
        }
    }
}

fn required_code(scripts: &GeneratedScripts, dialect: Dialect) -> Result<String, PipelineError> {
    scripts
        .code(dialect)
        .map(str::to_string)
        .ok_or_else(|| {
            PipelineError::UnparsableResponse(ParseError::MissingMarker {
                marker: dialect.marker(),
                searched_from: 0,
                reply_len: 0,
            })
        })
}
