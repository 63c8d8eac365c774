//! Template evaluation errors.
//!
//! Fatal errors abort the whole render.  Query parse failures share the same
//! type but are stored in the session and only surface through `$error`.

/// What went wrong, for callers that need to branch on the failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// `$name` where `name` is neither a builtin nor a defined macro.
    UnknownFunction,
    /// `$` followed by a character that starts no directive.
    BadEscape,
    /// Argument count outside the directive's `[min, max]`.
    ArityError,
    /// `{` with no matching `}`.
    UnterminatedBrace,
    /// A template include could not be read.
    IoFailure,
    /// The query grammar rejected the query text.
    QueryParseFailure,
    /// Directive or macro expansion nested too deeply.
    RecursionLimit,
}

/// An error raised while evaluating a template.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct TemplateError {
    kind: ErrorKind,
    message: String,
}

impl TemplateError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }

    pub fn unknown_function(name: &str) -> Self {
        Self::new(ErrorKind::UnknownFunction, format!("Unknown function `{name}'"))
    }

    pub fn bad_escape(rest: &str) -> Self {
        Self::new(ErrorKind::BadEscape, format!("Unknown $ code in: ${rest}"))
    }

    pub fn too_few_args(name: &str) -> Self {
        Self::new(ErrorKind::ArityError, format!("too few arguments to ${name}"))
    }

    pub fn too_many_args(name: &str) -> Self {
        Self::new(ErrorKind::ArityError, format!("too many arguments to ${name}"))
    }

    pub fn unterminated(snippet: &str) -> Self {
        Self::new(ErrorKind::UnterminatedBrace, format!("missing }} in {snippet}"))
    }

    pub fn include_failed(name: &str, reason: &str) -> Self {
        Self::new(
            ErrorKind::IoFailure,
            format!("Couldn't read format template `{name}' ({reason})"),
        )
    }

    pub fn query_parse(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::QueryParseFailure, message)
    }

    pub fn recursion_limit(limit: usize) -> Self {
        Self::new(
            ErrorKind::RecursionLimit,
            format!("template nesting exceeds {limit} levels"),
        )
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_is_message() {
        let e = TemplateError::unknown_function("frob");
        assert_eq!(e.to_string(), "Unknown function `frob'");
        assert_eq!(e.kind(), ErrorKind::UnknownFunction);
    }

    #[test]
    fn unterminated_brace_message() {
        let e = TemplateError::unterminated("$if{x");
        assert_eq!(e.message(), "missing } in $if{x");
        assert_eq!(e.kind(), ErrorKind::UnterminatedBrace);
    }
}
