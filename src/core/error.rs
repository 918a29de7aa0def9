//! Canonical error type for the project data engine.
//!
//! Every fallible operation in this crate returns `Result<T, CyberismoError>`.
//! Variants map 1:1 onto the error kinds the CLI needs to distinguish: input validation,
//! schema validation, not-found, conflict, permission-denied, invariant
//! violation, filesystem, and solver errors. The CLI layer (`src/cli.rs`)
//! maps each kind to an exit code; nothing here leaks a language-specific
//! stack trace to a caller.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CyberismoError {
    /// Missing or malformed argument, identifier fails its regex, name not fully qualified.
    #[error("invalid input: {0}")]
    InputValidation(String),

    /// JSON or resource structure violates its schema.
    #[error("schema validation failed: {0}")]
    SchemaValidation(String),

    /// Card key, resource name, template, module, workflow state, or transition does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Resource already exists, duplicate attachment/link, duplicate module prefix.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Action guard denied the mutation, or it targets a module resource / calculated field.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Parent-child cycle, workflow state category rule, link-type allowlist violation.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// Underlying I/O failure. Always carries the failing path.
    #[error("filesystem error at {path}: {source}")]
    FilesystemError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Clingo parse error, unsatisfiable program, or stable-model parse failure.
    #[error("solver error: {0}")]
    SolverError(String),
}

impl CyberismoError {
    pub fn filesystem(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CyberismoError::FilesystemError {
            path: path.into(),
            source,
        }
    }

    /// CLI exit-code family: 0 success, 1 user error, 2 internal error.
    pub fn exit_code(&self) -> i32 {
        match self {
            CyberismoError::InputValidation(_)
            | CyberismoError::SchemaValidation(_)
            | CyberismoError::NotFound(_)
            | CyberismoError::Conflict(_)
            | CyberismoError::PermissionDenied(_)
            | CyberismoError::InvariantViolation(_) => 1,
            CyberismoError::FilesystemError { .. } | CyberismoError::SolverError(_) => 2,
        }
    }
}

impl From<std::io::Error> for CyberismoError {
    fn from(err: std::io::Error) -> Self {
        CyberismoError::FilesystemError {
            path: PathBuf::new(),
            source: err,
        }
    }
}

impl From<serde_json::Error> for CyberismoError {
    fn from(err: serde_json::Error) -> Self {
        CyberismoError::SchemaValidation(err.to_string())
    }
}

impl From<handlebars::RenderError> for CyberismoError {
    fn from(err: handlebars::RenderError) -> Self {
        CyberismoError::SolverError(format!("template render failed: {err}"))
    }
}

impl From<handlebars::TemplateError> for CyberismoError {
    fn from(err: handlebars::TemplateError) -> Self {
        CyberismoError::SolverError(format!("template parse failed: {err}"))
    }
}

impl From<csv::Error> for CyberismoError {
    fn from(err: csv::Error) -> Self {
        CyberismoError::InputValidation(format!("csv error: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_display() {
        let err = CyberismoError::NotFound("card dec_abc123".to_string());
        assert_eq!(format!("{err}"), "not found: card dec_abc123");
    }

    #[test]
    fn exit_code_families() {
        assert_eq!(CyberismoError::Conflict("x".into()).exit_code(), 1);
        assert_eq!(CyberismoError::PermissionDenied("x".into()).exit_code(), 1);
        assert_eq!(CyberismoError::SolverError("x".into()).exit_code(), 2);
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        assert_eq!(
            CyberismoError::filesystem("/tmp/x", io).exit_code(),
            2
        );
    }
}
