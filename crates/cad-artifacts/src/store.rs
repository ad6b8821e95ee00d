use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const SCAD_FILE_NAME: &str = "model.scad";
pub const STL_FILE_NAME: &str = "model.stl";
pub const CATSCRIPT_FILE_NAME: &str = "model.CATScript";

/// Identifier of one generation or conversion; doubles as a path segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtifactId(Uuid);

impl ArtifactId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ArtifactId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ArtifactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.as_hyphenated())
    }
}

impl FromStr for ArtifactId {
    type Err = uuid::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(value).map(Self)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("filesystem error at {}: {source}", .path.display())]
pub struct StoreError {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}

impl StoreError {
    fn at(path: &Path, source: std::io::Error) -> Self {
        Self {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// File locations of one prompt generation, all inside `<root>/<id>/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationPaths {
    pub dir: PathBuf,
    pub scad: PathBuf,
    pub stl: PathBuf,
    pub catscript: PathBuf,
}

/// Source/destination pair of one direct conversion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionPaths {
    pub source: PathBuf,
    pub mesh: PathBuf,
}

/// Plain-file artifact storage under a single working directory.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn generation_paths(&self, id: ArtifactId) -> GenerationPaths {
        let dir = self.root.join(id.to_string());
        GenerationPaths {
            scad: dir.join(SCAD_FILE_NAME),
            stl: dir.join(STL_FILE_NAME),
            catscript: dir.join(CATSCRIPT_FILE_NAME),
            dir,
        }
    }

    pub fn conversion_paths(&self, id: ArtifactId) -> ConversionPaths {
        ConversionPaths {
            source: self.root.join(format!("{id}.scad")),
            mesh: self.root.join(format!("{id}.stl")),
        }
    }

    /// Well-known path that always holds the most recent successful mesh.
    pub fn latest_mesh_path(&self) -> PathBuf {
        self.root.join(STL_FILE_NAME)
    }

    /// Creates missing parent directories, then overwrites `path` with `content`.
    pub async fn write(&self, path: &Path, content: &str) -> Result<(), StoreError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|err| StoreError::at(parent, err))?;
        }
        tokio::fs::write(path, content)
            .await
            .map_err(|err| StoreError::at(path, err))?;
        tracing::debug!(path = %path.display(), bytes = content.len(), "artifact written");
        Ok(())
    }

    /// Reads a whole artifact; a missing file is `Ok(None)`.
    pub async fn read(&self, path: &Path) -> Result<Option<Vec<u8>>, StoreError> {
        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(StoreError::at(path, err)),
        }
    }

    /// Deletes `path`; a file that is already gone is not an error.
    pub async fn remove(&self, path: &Path) -> Result<(), StoreError> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => {
                tracing::debug!(path = %path.display(), "artifact removed");
                Ok(())
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(StoreError::at(path, err)),
        }
    }

    /// Points the latest-mesh path at a copy of `mesh` via copy-then-rename.
    pub async fn publish_latest(&self, mesh: &Path) -> Result<(), StoreError> {
        let latest = self.latest_mesh_path();
        let staging = self.root.join(format!(".{STL_FILE_NAME}.{}.tmp", ArtifactId::new()));
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|err| StoreError::at(&self.root, err))?;
        if let Err(err) = tokio::fs::copy(mesh, &staging).await {
            let _ = tokio::fs::remove_file(&staging).await;
            return Err(StoreError::at(mesh, err));
        }
        if let Err(err) = tokio::fs::rename(&staging, &latest).await {
            let _ = tokio::fs::remove_file(&staging).await;
            return Err(StoreError::at(&latest, err));
        }
        tracing::debug!(source = %mesh.display(), "latest mesh updated");
        Ok(())
    }
}
