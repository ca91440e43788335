//! Pulls source code out of free-form model replies.

/// Language tag the generated scripts are fenced with.
pub const TARGET_LANGUAGE: &str = "python";

const FENCE: &str = "```";

/// Tokens that mark a fence-free reply as code rather than prose.
const SIGNATURE_TOKENS: &[&str] = &["import ", "def ", "class ", "print(", "if __name__"];

/// Extracts code from a model reply.
///
/// Tries, in order: the first block fenced with [`TARGET_LANGUAGE`], the first
/// generically fenced block, and finally the whole trimmed reply if it contains
/// a language signature token. Returns an empty string when nothing qualifies.
///
/// A reply containing a fence that never closes yields an empty string: a
/// truncated block is not returned as if it had been extracted.
pub fn extract_code(response: &str) -> String {
    let tagged = format!("{}{}", FENCE, TARGET_LANGUAGE);
    if let Some(code) = fenced_block(response, &tagged) {
        return code.to_string();
    }

    if let Some(code) = fenced_block(response, FENCE) {
        return code.to_string();
    }

    if response.contains(FENCE) {
        tracing::debug!("reply has an unterminated fence, refusing to extract");
        return String::new();
    }

    let trimmed = response.trim();
    if SIGNATURE_TOKENS.iter().any(|token| trimmed.contains(token)) {
        return trimmed.to_string();
    }

    String::new()
}

/// Returns the trimmed interior of the first block opened by `opener`.
///
/// The interior starts on the line after the opener and ends at the next fence.
fn fenced_block<'a>(text: &'a str, opener: &str) -> Option<&'a str> {
    let start = text.find(opener)?;
    let body_start = start + text[start..].find('\n')? + 1;
    let body_len = text[body_start..].find(FENCE)?;
    Some(text[body_start..body_start + body_len].trim())
}
