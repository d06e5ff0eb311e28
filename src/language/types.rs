//! Types representing the compiled form of a procedure document

use serde::Serialize;
use std::collections::BTreeMap;

use crate::language::Registry;

/// Stable identifier assigned to every block at compile time. The runtime
/// session keys its visibility and rendered-text maps on this, so the block
/// tree itself can stay immutable after compilation.
pub type BlockId = u32;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Block {
    pub id: BlockId,
    pub kind: BlockKind,
}

/// One node of a step's content tree, in source order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum BlockKind {
    /// Narrative text. `content` is the original template: it may still
    /// contain `{name}` interpolation placeholders, which the runtime
    /// resolves on every refresh without mutating this field.
    Text { content: String },

    Question(Question),

    /// An embedded code block, already normalized by the declaration
    /// extractor to plain `name = expression;` assignments.
    Code { source: String },

    /// A show-if section. `terminal` is set when the procedure's end
    /// marker was reached while parsing this section's body.
    Conditional {
        expression: String,
        children: Vec<Block>,
        terminal: bool,
    },

    Styled { style: StyleKey, content: String },

    /// A step boundary. Appears nested when a `---` splits a conditional
    /// into siblings; top-level occurrences are consumed by step assembly.
    Separator,

    /// Terminates the procedure. When visible, the advance affordance must
    /// be replaced by a terminal one.
    End,

    /// A `{RepeatStep Until …}` header. Rendered nowhere; step assembly
    /// hoists top-level occurrences onto the owning step.
    Repeat { expression: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Question {
    pub prompt: String,
    pub variable: String,
    pub kind: QuestionKind,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum QuestionKind {
    /// Free-form entry with a renderer-facing type hint ("text" when the
    /// author gave none).
    Input { type_hint: String },
    /// "One of: a, b, c" multiple choice, options in source order.
    Choice { options: Vec<String> },
}

/// The fixed callout vocabulary.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
pub enum StyleKey {
    Warning,
    Error,
    Info,
    Success,
}

impl StyleKey {
    pub fn from_key(key: &str) -> Option<StyleKey> {
        match key
            .to_ascii_lowercase()
            .as_str()
        {
            "warning_style" => Some(StyleKey::Warning),
            "error_style" => Some(StyleKey::Error),
            "info_style" => Some(StyleKey::Info),
            "success_style" => Some(StyleKey::Success),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StyleKey::Warning => "warning_style",
            StyleKey::Error => "error_style",
            StyleKey::Info => "info_style",
            StyleKey::Success => "success_style",
        }
    }
}

/// One navigable page of the procedure.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Step {
    pub blocks: Vec<Block>,
    /// The step repeats until this expression is satisfied.
    pub repeat_until: Option<String>,
}

/// The compiled document: an ordered block tree per step plus the live
/// variable registry. Immutable apart from the registry, which the runtime
/// session mutates as the user works through the procedure.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Procedure {
    pub steps: Vec<Step>,
    pub registry: Registry,
}

impl Procedure {
    /// Map from step index to its repeat-until expression, for steps that
    /// carry one.
    pub fn repeat_conditions(&self) -> BTreeMap<usize, &str> {
        self.steps
            .iter()
            .enumerate()
            .filter_map(|(index, step)| {
                step.repeat_until
                    .as_deref()
                    .map(|expression| (index, expression))
            })
            .collect()
    }
}
