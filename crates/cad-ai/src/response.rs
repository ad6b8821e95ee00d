use crate::dialect::Dialect;

/// Token that opens and closes a markdown code fence.
pub const CODE_FENCE: &str = "```";

/// A dialect tag paired with the code the model wrote for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeSection {
    pub dialect: Dialect,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("model reply is missing marker `{marker}` (searched from byte {searched_from} of {reply_len})")]
    MissingMarker {
        marker: &'static str,
        searched_from: usize,
        reply_len: usize,
    },
    #[error("model reply is empty")]
    EmptyReply,
}

/// Splits `text` into one section per dialect using each dialect's marker.
///
/// Markers are searched strictly in the given order: marker `i + 1` must occur
/// after marker `i`. A body runs from the end of its marker to the start of the
/// next marker, or to the end of the text for the last one, and is trimmed.
/// Either every section is returned or none.
pub fn parse_sections(text: &str, dialects: &[Dialect]) -> Result<Vec<CodeSection>, ParseError> {
    let mut sections = Vec::with_capacity(dialects.len());
    let Some(first) = dialects.first() else {
        return Ok(sections);
    };
    let mut body_start = find_marker(text, first.marker(), 0)?;

    for (index, dialect) in dialects.iter().enumerate() {
        let (body_end, next_body_start) = match dialects.get(index + 1) {
            Some(next) => {
                let next_body_start = find_marker(text, next.marker(), body_start)?;
                (next_body_start - next.marker().len(), next_body_start)
            }
            None => (text.len(), text.len()),
        };

        sections.push(CodeSection {
            dialect: *dialect,
            body: text[body_start..body_end].trim().to_string(),
        });
        body_start = next_body_start;
    }

    Ok(sections)
}

/// Treats the whole reply as a single section.
pub fn single_section(text: &str, dialect: Dialect) -> Result<CodeSection, ParseError> {
    let body = text.trim();
    if body.is_empty() {
        return Err(ParseError::EmptyReply);
    }
    Ok(CodeSection {
        dialect,
        body: body.to_string(),
    })
}

/// Returns the byte offset just past `marker`, searching from `from`.
fn find_marker(text: &str, marker: &'static str, from: usize) -> Result<usize, ParseError> {
    text[from..]
        .find(marker)
        .map(|offset| from + offset + marker.len())
        .ok_or(ParseError::MissingMarker {
            marker,
            searched_from: from,
            reply_len: text.len(),
        })
}

/// Removes a leading and a trailing fence line, if present.
///
/// Only the first and last lines are inspected; fences elsewhere are kept.
pub fn strip_code_fences(code: &str) -> String {
    let lines = code.lines().collect::<Vec<_>>();
    let mut start = 0usize;
    let mut end = lines.len();

    if lines.first().is_some_and(|line| line.starts_with(CODE_FENCE)) {
        start = 1;
    }
    if end > start && lines[end - 1].starts_with(CODE_FENCE) {
        end -= 1;
    }

    if start == 0 && end == lines.len() {
        return code.to_string();
    }
    lines[start..end].join("\n")
}

/// Joins sections back into marker-delimited text.
pub fn render_sections(sections: &[CodeSection]) -> String {
    sections
        .iter()
        .map(|section| format!("{}\n{}", section.dialect.marker(), section.body))
        .collect::<Vec<_>>()
        .join("\n\n")
}
