//! Keystroke history decoding.
//!
//! The gateway sends the whole history as one string joined by `*`
//! (`"1*5551234567*4321"`). Only the newest token drives dispatch; earlier
//! tokens were already folded into the session when they arrived.

/// Separator the gateway places between keystroke submissions.
pub const DELIMITER: char = '*';

/// Decoded keystroke history for one callback.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct KeystrokeHistory {
    tokens: Vec<String>,
}

impl KeystrokeHistory {
    /// Split `text` on the delimiter and drop empty tokens.
    ///
    /// A `*` typed by the caller ("home") is itself joined with delimiters,
    /// so it shows up as two consecutive empty segments (`"1**"`,
    /// `"2***1"`). Each such pair decodes to one `"*"` token; an unpaired
    /// empty segment (stray trailing delimiter) is dropped.
    pub fn decode(text: &str) -> Self {
        let mut tokens: Vec<String> = Vec::new();
        let trimmed = text.trim();
        let mut empties = 0usize;
        for part in trimmed.split(DELIMITER) {
            if part.is_empty() {
                empties += 1;
                if empties == 2 {
                    tokens.push(DELIMITER.to_string());
                    empties = 0;
                }
                continue;
            }
            empties = 0;
            tokens.push(part.trim().to_string());
        }
        KeystrokeHistory { tokens }
    }

    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// The newest token, or `""` on first contact.
    pub fn current(&self) -> &str {
        self.tokens.last().map(String::as_str).unwrap_or("")
    }
}
