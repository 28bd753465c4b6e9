//! Gateway reply encoding.
//!
//! The transport understands exactly two shapes: `CON <text>` keeps the
//! session open for another keystroke, `END <text>` closes it. There is no
//! channel for structured errors, so anything that goes wrong upstream is
//! turned into an `END` apology here rather than leaking to the gateway.

pub const CONTINUE_MARKER: &str = "CON";
pub const TERMINATE_MARKER: &str = "END";

/// Caller-facing text for unrecoverable failures.
pub const APOLOGY: &str = "Sorry, something went wrong. Please try again later.";

/// Caller-facing text when a backing service is slow or down.
pub const SERVICE_UNAVAILABLE: &str = "Unable to complete your request right now. Please try again later.";

/// Handler output before encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
    pub terminal: bool,
}

impl Reply {
    /// More input expected.
    pub fn con(text: impl Into<String>) -> Self {
        Reply {
            text: text.into(),
            terminal: false,
        }
    }

    /// Session over.
    pub fn end(text: impl Into<String>) -> Self {
        Reply {
            text: text.into(),
            terminal: true,
        }
    }

    /// Prepend an inline error line, keeping the session open.
    pub fn with_error(mut self, error: impl std::fmt::Display) -> Self {
        self.text = format!("{}\n{}", error, self.text);
        self
    }

    /// Prepend an informational line (e.g. "Bet cancelled.").
    pub fn with_notice(self, notice: impl std::fmt::Display) -> Self {
        self.with_error(notice)
    }

    pub fn encode(&self) -> String {
        encode(self)
    }
}

/// Wrap a reply in its protocol marker.
pub fn encode(reply: &Reply) -> String {
    let marker = if reply.terminal {
        TERMINATE_MARKER
    } else {
        CONTINUE_MARKER
    };
    format!("{} {}", marker, reply.text.trim_end())
}

/// The only thing the boundary may emit when a request fails outright.
pub fn apology() -> String {
    encode(&Reply::end(APOLOGY))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn markers_are_prefixed() {
        assert_eq!(Reply::con("Menu\n1. A").encode(), "CON Menu\n1. A");
        assert_eq!(Reply::end("Bye").encode(), "END Bye");
    }

    #[test]
    fn error_line_is_prepended() {
        let r = Reply::con("Enter PIN:").with_error("PIN must be exactly 4 digits.");
        assert_eq!(r.text, "PIN must be exactly 4 digits.\nEnter PIN:");
        assert!(!r.terminal);
    }

    #[test]
    fn apology_terminates() {
        assert!(apology().starts_with("END "));
    }
}
