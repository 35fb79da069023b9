/// Input sanitizer applied to user messages before routing.
pub struct Sanitizer {
    max_message_length: usize,
}

impl Default for Sanitizer {
    fn default() -> Self {
        Self {
            max_message_length: 100_000,
        }
    }
}

impl Sanitizer {
    /// Create a sanitizer rejecting inputs longer than `max_message_length` bytes.
    pub fn new(max_message_length: usize) -> Self {
        Self { max_message_length }
    }

    /// Sanitize a string: strip control characters, enforce length limits.
    pub fn sanitize(&self, input: &str) -> SanitizeResult {
        if input.len() > self.max_message_length {
            return SanitizeResult::Rejected("Input exceeds maximum length".to_string());
        }

        let cleaned: String = input
            .chars()
            .filter(|c| !c.is_control() || *c == '\n' || *c == '\t' || *c == '\r')
            .collect();

        if cleaned.is_empty() && !input.is_empty() {
            return SanitizeResult::Rejected("Input contains only control characters".to_string());
        }

        if cleaned != input {
            SanitizeResult::Cleaned(cleaned)
        } else {
            SanitizeResult::Clean(cleaned)
        }
    }

    /// Normalized form used for keyword matching: control characters removed,
    /// lowercased, runs of whitespace collapsed to a single space.
    ///
    /// Returns `None` when the input is rejected.
    pub fn normalize(&self, input: &str) -> Option<String> {
        let cleaned = self.sanitize(input).into_string()?;
        Some(
            cleaned
                .to_lowercase()
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" "),
        )
    }
}

/// Outcome of [`Sanitizer::sanitize`].
#[derive(Debug, PartialEq)]
pub enum SanitizeResult {
    /// Input was already clean.
    Clean(String),
    /// Input was cleaned (control characters removed).
    Cleaned(String),
    /// Input was rejected entirely.
    Rejected(String),
}

impl SanitizeResult {
    /// Whether the input was rejected.
    pub fn is_rejected(&self) -> bool {
        matches!(self, SanitizeResult::Rejected(_))
    }

    /// The usable string, if not rejected.
    pub fn into_string(self) -> Option<String> {
        match self {
            SanitizeResult::Clean(s) | SanitizeResult::Cleaned(s) => Some(s),
            SanitizeResult::Rejected(_) => None,
        }
    }
}
