use serde::Deserialize;

use crate::dialect::{DUAL_DIALECT_MARKERS, Dialect};

pub const DEFAULT_CUBE_SIZE_MM: &str = "20";
pub const DEFAULT_FILLET_MM: &str = "5";

const DUAL_DIALECT_INSTRUCTION_HEADER: &str = r#"You are a CAD code generator. Given a description of a 3D object, write two scripts that build the same solid:
1. An OpenSCAD script that can be rendered to STL with the openscad command line tool.
2. A CATScript macro (VBScript for CATIA V5) that builds the part inside a new CATPart document.
"#;

const DUAL_DIALECT_CONSTRAINTS: &str = r#"Constraints:
- All dimensions are in millimeters.
- Output only code below each marker line; no markdown, no code fences, no explanations.
- Do not add any text before the first marker or after the last script.
- Keep the OpenSCAD script self-contained (no include/use of external files).
"#;

/// Free text or numeric field sent by clients for the cube parameters.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ParameterValue {
    Number(serde_json::Number),
    Text(String),
}

impl ParameterValue {
    fn render(&self) -> String {
        match self {
            ParameterValue::Number(number) => number.to_string(),
            ParameterValue::Text(text) => text.trim().to_string(),
        }
    }
}

/// One inbound generation call.
#[derive(Debug, Clone, PartialEq)]
pub enum GenerationRequest {
    /// Filleted cube described by its edge length and fillet radius, in mm.
    Parameters {
        size: Option<ParameterValue>,
        fillet: Option<ParameterValue>,
    },
    /// Free-text description of the object.
    Prompt { prompt: String },
}

impl GenerationRequest {
    pub fn prompt(prompt: impl Into<String>) -> Self {
        Self::Prompt {
            prompt: prompt.into(),
        }
    }

    pub fn parameters(size: Option<ParameterValue>, fillet: Option<ParameterValue>) -> Self {
        Self::Parameters { size, fillet }
    }
}

/// How the model's reply is split into code sections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputContract {
    /// The whole reply is one script in the given dialect.
    Single(Dialect),
    /// Marker lines introduce each dialect, in this order.
    Marked(&'static [Dialect]),
}

impl OutputContract {
    pub fn dialects(&self) -> &[Dialect] {
        match self {
            OutputContract::Single(dialect) => std::slice::from_ref(dialect),
            OutputContract::Marked(dialects) => dialects,
        }
    }
}

/// Instruction plus content blocks ready for a [`crate::LanguageModel`].
#[derive(Debug, Clone, PartialEq)]
pub struct PromptPlan {
    pub instruction: String,
    pub content: Vec<String>,
    pub contract: OutputContract,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PromptError {
    #[error("{field} is required")]
    MissingInput { field: &'static str },
}

pub fn build_prompt(request: &GenerationRequest) -> Result<PromptPlan, PromptError> {
    match request {
        GenerationRequest::Parameters { size, fillet } => {
            let size = resolve_parameter(size.as_ref(), "size", DEFAULT_CUBE_SIZE_MM)?;
            let fillet = resolve_parameter(fillet.as_ref(), "fillet", DEFAULT_FILLET_MM)?;
            Ok(PromptPlan {
                instruction: filleted_cube_instruction(&size, &fillet),
                content: Vec::new(),
                contract: OutputContract::Single(Dialect::CatScript),
            })
        }
        GenerationRequest::Prompt { prompt } => {
            let description = prompt.trim();
            if description.is_empty() {
                return Err(PromptError::MissingInput { field: "prompt" });
            }
            Ok(PromptPlan {
                instruction: dual_dialect_instruction(),
                content: vec![format!("Object description: {description}")],
                contract: OutputContract::Marked(&DUAL_DIALECT_MARKERS),
            })
        }
    }
}

fn resolve_parameter(
    value: Option<&ParameterValue>,
    field: &'static str,
    default: &str,
) -> Result<String, PromptError> {
    let Some(value) = value else {
        return Ok(default.to_string());
    };
    let rendered = value.render();
    if rendered.is_empty() {
        return Err(PromptError::MissingInput { field });
    }
    Ok(rendered)
}

fn filleted_cube_instruction(size: &str, fillet: &str) -> String {
    format!(
        "Generate a CATScript (VBScript used in CATIA) that:
- Creates a 3D cube of size {size} mm
- Applies a {fillet} mm fillet to its edges
- Runs fully in CATIA's macro editor
- Output only the code (no markdown, no explanations)
- Keep code clean, no extra comments
"
    )
}

/// Builds the dual-dialect instruction from [`DUAL_DIALECT_MARKERS`].
pub fn dual_dialect_instruction() -> String {
    let mut instruction = String::from(DUAL_DIALECT_INSTRUCTION_HEADER);
    instruction.push_str("\nOutput format (follow exactly):\n");
    for dialect in DUAL_DIALECT_MARKERS {
        instruction.push_str(dialect.marker());
        instruction.push('\n');
        instruction.push_str(&format!("<{} code>\n", dialect.display_name()));
    }
    instruction.push('\n');
    instruction.push_str(DUAL_DIALECT_CONSTRAINTS);
    instruction
}
