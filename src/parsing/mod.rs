//! Compiler for the procedure DSL

use std::path::Path;
use tracing::debug;

use crate::language::{LoadingError, Procedure};

pub mod parser;
pub mod scanner;
mod scope;

pub use parser::{Outcome, Parser, ParsingError};
pub use scanner::{classify, LineKind};

/// Read a procedure document and return an owned String. Ownership passes
/// back to the caller so the Procedure built by compile() below can
/// outlive the parser.
pub fn load(filename: &Path) -> Result<String, LoadingError<'_>> {
    match std::fs::read_to_string(filename) {
        Ok(content) => Ok(content),
        Err(error) => {
            debug!(?error);
            Err(LoadingError::from_io(error, filename))
        }
    }
}

/// Compile a document into steps plus the seeded variable registry, or
/// fail on the first structural error. Recoverable authoring mistakes are
/// logged and degraded inside the parser instead of surfacing here.
pub fn compile(content: &str) -> Result<Procedure, ParsingError> {
    let parser = Parser::new(content);
    let procedure = parser.into_procedure()?;

    let steps = procedure
        .steps
        .len();
    let variables = procedure
        .registry
        .len();
    debug!(
        "compiled {} step{}, {} variable{}",
        steps,
        if steps == 1 { "" } else { "s" },
        variables,
        if variables == 1 { "" } else { "s" },
    );

    Ok(procedure)
}
