//! On-disk artifacts: generated scripts, converted meshes, and the compiler that links them.

pub mod converter;
pub mod store;

pub use converter::{ConversionError, DEFAULT_COMPILER, DEFAULT_CONVERSION_TIMEOUT, MeshConverter};
pub use store::{
    ArtifactId, ArtifactStore, CATSCRIPT_FILE_NAME, ConversionPaths, GenerationPaths,
    SCAD_FILE_NAME, STL_FILE_NAME, StoreError,
};
