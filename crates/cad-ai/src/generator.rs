use std::sync::Arc;

use crate::dialect::Dialect;
use crate::model::{LanguageModel, ModelError, ModelRequest};
use crate::prompt::{GenerationRequest, OutputContract, PromptError, build_prompt};
use crate::response::{CodeSection, ParseError, parse_sections, single_section, strip_code_fences};

/// Sanitized code sections produced for one request, in contract order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedScripts {
    pub sections: Vec<CodeSection>,
}

impl GeneratedScripts {
    pub fn code(&self, dialect: Dialect) -> Option<&str> {
        self.sections
            .iter()
            .find(|section| section.dialect == dialect)
            .map(|section| section.body.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error(transparent)]
    MissingInput(#[from] PromptError),
    #[error("model request failed: {0}")]
    Model(#[from] ModelError),
    #[error("unparsable model reply: {0}")]
    Unparsable(#[from] ParseError),
}

/// Prompt → model → parse → sanitize, with no side effects beyond the model call.
#[derive(Clone)]
pub struct ScriptGenerator {
    model: Arc<dyn LanguageModel>,
}

impl ScriptGenerator {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self { model }
    }

    pub async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GeneratedScripts, GenerationError> {
        let plan = build_prompt(request)?;
        let reply = self
            .model
            .complete(ModelRequest {
                instruction: &plan.instruction,
                content: &plan.content,
            })
            .await?;
        tracing::debug!(chars = reply.len(), "model reply received");

        let sections = match plan.contract {
            OutputContract::Single(dialect) => vec![single_section(&reply, dialect)?],
            OutputContract::Marked(dialects) => parse_sections(&reply, dialects)?,
        };

        let sections = sections
            .into_iter()
            .map(|section| CodeSection {
                body: strip_code_fences(&section.body),
                dialect: section.dialect,
            })
            .collect();
        Ok(GeneratedScripts { sections })
    }
}
