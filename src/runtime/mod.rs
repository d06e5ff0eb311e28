//! Interaction-time re-evaluation over a compiled procedure.
//!
//! Nothing here re-parses. The block tree stays immutable; the session
//! keys its visibility and rendered-text state on block ids, mutates the
//! registry, and re-runs the evaluator and code executor as the user works
//! through the steps.

use std::collections::HashMap;

use tracing::debug;

use crate::evaluating::code;
use crate::evaluating::expression;
use crate::language::{Block, BlockId, BlockKind, Procedure, Registry, Value};

/// Live state for one run of a compiled procedure.
///
/// Callers must complete a [`refresh`] before processing the next user
/// action. The refresh performs three phases in a fixed order — code
/// blocks, then interpolation, then conditional visibility — because code
/// blocks may set variables the other two depend on.
///
/// [`refresh`]: Session::refresh
pub struct Session {
    procedure: Procedure,
    visibility: HashMap<BlockId, bool>,
    rendered: HashMap<BlockId, String>,
}

impl Session {
    pub fn new(procedure: Procedure) -> Session {
        Session {
            procedure,
            visibility: HashMap::new(),
            rendered: HashMap::new(),
        }
    }

    pub fn procedure(&self) -> &Procedure {
        &self.procedure
    }

    pub fn registry(&self) -> &Registry {
        &self.procedure.registry
    }

    /// Record a user's answer. Only known variables are written; an
    /// answer bound to nothing is dropped, mirroring the rule that a
    /// question is never rendered for an unknown variable.
    pub fn answer(&mut self, name: &str, value: Value) -> bool {
        if !self
            .procedure
            .registry
            .contains(name)
        {
            debug!("ignoring answer for unknown variable '{}'", name);
            return false;
        }
        self.procedure
            .registry
            .set(name, value);
        true
    }

    /// Re-evaluate after the registry may have changed, with `step` as the
    /// newly active scope. Phase order is a contract:
    /// 1. run the active step's code blocks (idempotently; failures are
    ///    logged and have no effect),
    /// 2. refresh interpolation placeholders from each text block's
    ///    original content, so repeated substitution never compounds,
    /// 3. re-evaluate conditional visibility, descending only into
    ///    children whose ancestor chain is visible.
    pub fn refresh(&mut self, step: usize) {
        self.run_code_blocks(step);
        self.refresh_text();
        self.evaluate_conditionals();
    }

    /// Whether the step may advance: true when it has no repeat directive,
    /// or when its until-condition is satisfied. An unknown dependency
    /// keeps the loop repeating.
    pub fn repeat_satisfied(&self, step: usize) -> bool {
        let Some(step) = self
            .procedure
            .steps
            .get(step)
        else {
            return true;
        };

        match &step.repeat_until {
            Some(condition) => {
                expression::evaluate_until(condition, &self.procedure.registry)
            }
            None => true,
        }
    }

    /// Whether the step currently shows an end marker, through its chain
    /// of visible conditionals. A terminal step suppresses the default
    /// advance affordance.
    pub fn step_is_terminal(&self, step: usize) -> bool {
        self.procedure
            .steps
            .get(step)
            .map(|step| self.has_visible_end(&step.blocks))
            .unwrap_or(false)
    }

    /// Current visibility of a block. Blocks that are not conditionals,
    /// and conditionals not yet evaluated, are visible.
    pub fn is_visible(&self, id: BlockId) -> bool {
        self.visibility
            .get(&id)
            .copied()
            .unwrap_or(true)
    }

    /// The interpolated form of a text or styled block, as of the last
    /// refresh.
    pub fn rendered_text(&self, id: BlockId) -> Option<&str> {
        self.rendered
            .get(&id)
            .map(String::as_str)
    }

    fn run_code_blocks(&mut self, step: usize) {
        let Procedure {
            ref steps,
            ref mut registry,
        } = self.procedure;

        let Some(step) = steps.get(step) else {
            return;
        };

        fn run(blocks: &[Block], registry: &mut Registry) {
            for block in blocks {
                match &block.kind {
                    BlockKind::Code { source } => code::run_code(source, registry),
                    BlockKind::Conditional { children, .. } => run(children, registry),
                    _ => {}
                }
            }
        }

        run(&step.blocks, registry);
    }

    fn refresh_text(&mut self) {
        fn walk(
            blocks: &[Block],
            registry: &Registry,
            rendered: &mut HashMap<BlockId, String>,
        ) {
            for block in blocks {
                match &block.kind {
                    BlockKind::Text { content } | BlockKind::Styled { content, .. } => {
                        rendered.insert(block.id, interpolate(content, registry));
                    }
                    BlockKind::Conditional { children, .. } => {
                        walk(children, registry, rendered);
                    }
                    _ => {}
                }
            }
        }

        for step in &self
            .procedure
            .steps
        {
            walk(&step.blocks, &self.procedure.registry, &mut self.rendered);
        }
    }

    fn evaluate_conditionals(&mut self) {
        fn walk(
            blocks: &[Block],
            registry: &Registry,
            visibility: &mut HashMap<BlockId, bool>,
        ) {
            for block in blocks {
                if let BlockKind::Conditional {
                    expression: condition,
                    children,
                    ..
                } = &block.kind
                {
                    let visible = expression::evaluate_visibility(condition, registry);
                    visibility.insert(block.id, visible);

                    // a hidden section's descendants keep their previous
                    // state; they are unreachable until the ancestor shows
                    if visible {
                        walk(children, registry, visibility);
                    }
                }
            }
        }

        for step in &self
            .procedure
            .steps
        {
            walk(&step.blocks, &self.procedure.registry, &mut self.visibility);
        }
    }

    fn has_visible_end(&self, blocks: &[Block]) -> bool {
        for block in blocks {
            match &block.kind {
                BlockKind::End => return true,
                BlockKind::Conditional { children, .. } => {
                    if self.is_visible(block.id) && self.has_visible_end(children) {
                        return true;
                    }
                }
                _ => {}
            }
        }
        false
    }
}

/// Substitute `{name}` placeholders from the registry. Unknown names stay
/// as literal text; declared-but-empty variables substitute to nothing.
/// Always applied to the original template, never to its own output.
pub fn interpolate(template: &str, registry: &Registry) -> String {
    regex!(r"\{\s*([A-Za-z_$][A-Za-z0-9_$]*)\s*\}")
        .replace_all(template, |captures: &regex::Captures| {
            let name = &captures[1];
            match registry.get(name) {
                Some(value) => value.to_string(),
                None => captures[0].to_string(),
            }
        })
        .to_string()
}
