//! Stepwise compiles a small textual DSL describing multi-step interactive
//! procedures — narrative text, questions, inline code that computes
//! variables, show-if sections, styled callouts, and step-repeat loops —
//! into a tree of typed content blocks plus a variable registry. A
//! separate renderer turns those into UI; this crate contains no rendering
//! of its own.
//!
//! Compilation is one pass: [`parsing::compile`] produces an immutable
//! [`language::Procedure`]. Interaction happens through
//! [`runtime::Session`], which re-runs code blocks, refreshes
//! interpolations, and re-evaluates conditional visibility whenever the
//! registry changes — without ever re-parsing.

/// Compile a regular expression once, on first use, and reuse the
/// compiled form on every call after that.
#[macro_export]
macro_rules! regex {
    ($pattern:expr) => {{
        use std::sync::OnceLock;
        static REGEX: OnceLock<regex::Regex> = OnceLock::new();
        REGEX.get_or_init(|| regex::Regex::new($pattern).unwrap_or_else(|e| panic!("{}", e)))
    }};
}

pub mod evaluating;
pub mod language;
pub mod parsing;
pub mod problem;
pub mod runtime;
