//! Turns object descriptions into OpenSCAD and CATScript source with a generative model.

pub mod dialect;
pub mod gemini;
pub mod generator;
pub mod model;
pub mod prompt;
pub mod response;

pub use dialect::{DUAL_DIALECT_MARKERS, Dialect};
pub use gemini::{DEFAULT_GEMINI_BASE_URL, DEFAULT_GEMINI_MODEL, GeminiClient, GeminiConfig};
pub use generator::{GeneratedScripts, GenerationError, ScriptGenerator};
pub use model::{LanguageModel, ModelError, ModelRequest};
pub use prompt::{
    GenerationRequest, OutputContract, ParameterValue, PromptError, PromptPlan, build_prompt,
};
pub use response::{CodeSection, ParseError, parse_sections, strip_code_fences};
