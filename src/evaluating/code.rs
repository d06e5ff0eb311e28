//! Declaration extraction and execution for embedded code blocks.
//!
//! A code block's dialect is deliberately tiny: `var`/`let`/`const`
//! declarations and plain assignments, one per line. The extractor runs at
//! compile time, seeding the registry with initial values and rewriting
//! declarations into assignments so the block can be re-executed safely
//! whenever the registry changes.

use tracing::{debug, warn};

use crate::evaluating::expression;
use crate::language::{Registry, Value};

/// Rewrite a code block's declarations into plain assignments, recording
/// each declared variable in the registry with its initial value. The
/// initial value is coerced textually (quote stripping, then float
/// parsing); it is not evaluated. Returns the normalized source, which
/// contains only assignments, comments, and whatever lines the dialect
/// does not claim.
pub fn extract_declarations(source: &str, registry: &mut Registry) -> String {
    let declaration =
        regex!(r"^(?:var|let|const)\s+([A-Za-z_$][A-Za-z0-9_$]*)(?:\s*=\s*([^;]+?))?\s*;?\s*$");

    let mut lines = Vec::new();

    for line in source.lines() {
        let trimmed = line.trim_start();

        if let Some(captures) = declaration.captures(trimmed) {
            let name = &captures[1];
            match captures.get(2) {
                Some(initializer) => {
                    let initializer = initializer
                        .as_str()
                        .trim();
                    registry.set(name, Value::from_declaration(initializer));
                    lines.push(format!("{} = {};", name, initializer));
                }
                None => {
                    registry.set(name, Value::Empty);
                    lines.push(format!("{} = undefined;", name));
                }
            }
            continue;
        }

        if !trimmed.is_empty() {
            lines.push(trimmed.to_string());
        }
    }

    lines.join("\n")
}

/// Execute a normalized code block against the registry. Each line is a
/// `name = expression;` assignment; comments and brace lines are skipped.
/// Failures are logged and have no effect, so re-running a block is always
/// safe.
pub fn run_code(source: &str, registry: &mut Registry) {
    let assignment = regex!(r"^([A-Za-z_$][A-Za-z0-9_$]*)\s*=\s*([^=].*?)\s*;?\s*$");

    for line in source.lines() {
        let trimmed = line.trim();

        if trimmed.is_empty()
            || trimmed == "{"
            || trimmed == "}"
            || trimmed == "{}"
            || trimmed.starts_with("//")
        {
            continue;
        }

        let Some(captures) = assignment.captures(trimmed) else {
            warn!("unsupported statement in code block: {}", trimmed);
            continue;
        };

        let name = &captures[1];
        let expression_source = &captures[2];

        match expression::evaluate(expression_source, registry) {
            Ok(value) => {
                debug!("code block set {} = {:?}", name, value);
                registry.set(name, value);
            }
            Err(error) => {
                warn!("code block assignment to '{}' failed: {}", name, error);
            }
        }
    }
}
