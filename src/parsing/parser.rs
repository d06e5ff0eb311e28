//! Recursive descent parser turning a procedure document into a block tree

use indexmap::IndexMap;
use tracing::{debug, warn};

use crate::evaluating::code;
use crate::evaluating::expression::normalize_repeat_expression;
use crate::language::{
    Block, BlockId, BlockKind, Procedure, Question, QuestionKind, Registry, Step, StyleKey,
};
use crate::parsing::scanner::{classify, LineKind};
use crate::parsing::scope;

/// Fatal compile failures. Everything recoverable is logged and degraded
/// instead; only a structurally broken document aborts compilation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsingError {
    UnmatchedBrace(usize),
    UnterminatedConditional(usize),
}

impl ParsingError {
    /// Zero-based line the failure was detected on.
    pub fn line(&self) -> usize {
        match self {
            ParsingError::UnmatchedBrace(line) => *line,
            ParsingError::UnterminatedConditional(line) => *line,
        }
    }

    pub fn message(&self) -> String {
        match self {
            ParsingError::UnmatchedBrace(_) => {
                "unmatched closing brace '}' not found".to_string()
            }
            ParsingError::UnterminatedConditional(_) => {
                "conditional block is never closed".to_string()
            }
        }
    }
}

/// How a parse invocation stopped: it either consumed its region up to the
/// returned line, or it reached the end marker, which stops every level of
/// the parse at once.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Outcome {
    Continue(usize),
    Halted,
}

#[derive(Debug)]
pub struct Parser<'i> {
    lines: Vec<&'i str>,
    constants: IndexMap<String, String>,
    registry: Registry,
    next_id: BlockId,
}

impl<'i> Parser<'i> {
    /// Set up a parser for the given document. The variable and constant
    /// pre-scans run here, so the registry already holds every trailing
    /// `[name]` declaration before any line is parsed.
    pub fn new(content: &'i str) -> Parser<'i> {
        let registry = scan_variables(content);
        let constants = scan_constants(content);

        debug!(
            "pre-scan found {} variable{} and {} constant{}",
            registry.len(),
            if registry.len() == 1 { "" } else { "s" },
            constants.len(),
            if constants.len() == 1 { "" } else { "s" },
        );

        Parser {
            lines: content
                .lines()
                .collect(),
            constants,
            registry,
            next_id: 0,
        }
    }

    /// Parse the whole document into its top-level block list. Separators
    /// stay in the list; step assembly happens in [`into_procedure`].
    ///
    /// [`into_procedure`]: Parser::into_procedure
    pub fn parse_document(&mut self) -> Result<Vec<Block>, ParsingError> {
        let (blocks, _) = self.parse_section(0)?;
        Ok(blocks)
    }

    /// Parse and assemble the final compiled form.
    pub fn into_procedure(mut self) -> Result<Procedure, ParsingError> {
        let blocks = self.parse_document()?;
        let steps = assemble_steps(blocks);
        Ok(Procedure {
            steps,
            registry: self.registry,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    fn block(&mut self, kind: BlockKind) -> Block {
        let id = self.next_id;
        self.next_id += 1;
        Block { id, kind }
    }

    /// Top-level scan of the document. Text lines accumulate in a pending
    /// buffer that is flushed whenever a non-text line or a paragraph
    /// break is encountered; a bare closing brace is consumed without
    /// flushing, since it only has meaning relative to the scope matcher.
    fn parse_section(&mut self, start: usize) -> Result<(Vec<Block>, Outcome), ParsingError> {
        let mut blocks = Vec::new();
        let mut pending: Vec<String> = Vec::new();
        let mut i = start;

        while i < self
            .lines
            .len()
        {
            let line = self.lines[i];

            match classify(line) {
                LineKind::PlainText => {
                    if line
                        .trim()
                        .is_empty()
                    {
                        self.flush_text(&mut pending, &mut blocks);
                    } else {
                        let text = self.substitute_constants(line.trim());
                        pending.push(text);
                    }
                    i += 1;
                }
                LineKind::Question => {
                    self.flush_text(&mut pending, &mut blocks);
                    if let Some(question) = self.parse_question(line) {
                        let block = self.block(BlockKind::Question(question));
                        blocks.push(block);
                    }
                    i += 1;
                }
                LineKind::CodeStart => {
                    self.flush_text(&mut pending, &mut blocks);
                    let end = scope::find_block_end(&self.lines, i)?;
                    let body = self.lines[i + 1..end].join("\n");
                    let source = code::extract_declarations(&body, &mut self.registry);
                    let block = self.block(BlockKind::Code { source });
                    blocks.push(block);
                    i = end + 1;
                }
                LineKind::ShowIfStart => {
                    self.flush_text(&mut pending, &mut blocks);
                    let (siblings, outcome) = self.parse_conditional(i)?;
                    blocks.extend(siblings);
                    match outcome {
                        Outcome::Continue(next) => i = next,
                        Outcome::Halted => return Ok((blocks, Outcome::Halted)),
                    }
                }
                LineKind::RepeatHeader => {
                    self.flush_text(&mut pending, &mut blocks);
                    if let Some(expression) = parse_repeat_header(line) {
                        let block = self.block(BlockKind::Repeat { expression });
                        blocks.push(block);
                    }
                    i += 1;
                }
                LineKind::End => {
                    self.flush_text(&mut pending, &mut blocks);
                    let block = self.block(BlockKind::End);
                    blocks.push(block);
                    return Ok((blocks, Outcome::Halted));
                }
                LineKind::Separator => {
                    self.flush_text(&mut pending, &mut blocks);
                    let block = self.block(BlockKind::Separator);
                    blocks.push(block);
                    i += 1;
                }
                LineKind::BlockEnd => {
                    i += 1;
                }
                LineKind::StyledText => {
                    self.flush_text(&mut pending, &mut blocks);
                    let block = self.parse_styled(line);
                    blocks.push(block);
                    i += 1;
                }
            }
        }

        self.flush_text(&mut pending, &mut blocks);
        Ok((blocks, Outcome::Continue(i)))
    }

    /// Parse a show-if section starting at its header line. Returns the
    /// sibling blocks the section produced: normally a single Conditional,
    /// but a `---` inside the body closes the current conditional, emits a
    /// Separator at the parent level, and opens a new sibling carrying the
    /// same expression. That split is a long-standing quirk of the format
    /// and is preserved deliberately, at every nesting depth.
    fn parse_conditional(
        &mut self,
        header: usize,
    ) -> Result<(Vec<Block>, Outcome), ParsingError> {
        let expression = extract_condition(self.lines[header]);

        let mut siblings = Vec::new();
        let mut children = Vec::new();
        let mut pending: Vec<String> = Vec::new();
        let mut i = header + 1;

        while i < self
            .lines
            .len()
        {
            let line = self.lines[i];

            match classify(line) {
                LineKind::BlockEnd => {
                    self.flush_text(&mut pending, &mut children);
                    let closed = self.close_conditional(&expression, children, false);
                    siblings.push(closed);
                    return Ok((siblings, Outcome::Continue(i + 1)));
                }
                LineKind::Separator => {
                    self.flush_text(&mut pending, &mut children);
                    let closed =
                        self.close_conditional(&expression, std::mem::take(&mut children), false);
                    siblings.push(closed);
                    let separator = self.block(BlockKind::Separator);
                    siblings.push(separator);
                    i += 1;
                }
                LineKind::End => {
                    self.flush_text(&mut pending, &mut children);
                    let end = self.block(BlockKind::End);
                    children.push(end);
                    let closed = self.close_conditional(&expression, children, true);
                    siblings.push(closed);
                    return Ok((siblings, Outcome::Halted));
                }
                LineKind::ShowIfStart => {
                    self.flush_text(&mut pending, &mut children);
                    let (nested, outcome) = self.parse_conditional(i)?;
                    children.extend(nested);
                    match outcome {
                        Outcome::Continue(next) => i = next,
                        Outcome::Halted => {
                            let closed = self.close_conditional(&expression, children, true);
                            siblings.push(closed);
                            return Ok((siblings, Outcome::Halted));
                        }
                    }
                }
                LineKind::Question => {
                    self.flush_text(&mut pending, &mut children);
                    if let Some(question) = self.parse_question(line) {
                        let block = self.block(BlockKind::Question(question));
                        children.push(block);
                    }
                    i += 1;
                }
                LineKind::CodeStart => {
                    self.flush_text(&mut pending, &mut children);
                    let end = scope::find_block_end(&self.lines, i)?;
                    let body = self.lines[i + 1..end].join("\n");
                    let source = code::extract_declarations(&body, &mut self.registry);
                    let block = self.block(BlockKind::Code { source });
                    children.push(block);
                    i = end + 1;
                }
                LineKind::RepeatHeader => {
                    self.flush_text(&mut pending, &mut children);
                    if let Some(condition) = parse_repeat_header(line) {
                        let block = self.block(BlockKind::Repeat {
                            expression: condition,
                        });
                        children.push(block);
                    }
                    i += 1;
                }
                LineKind::StyledText => {
                    self.flush_text(&mut pending, &mut children);
                    let block = self.parse_styled(line);
                    children.push(block);
                    i += 1;
                }
                LineKind::PlainText => {
                    if line
                        .trim()
                        .is_empty()
                    {
                        self.flush_text(&mut pending, &mut children);
                    } else {
                        let text = self.substitute_constants(line.trim());
                        pending.push(text);
                    }
                    i += 1;
                }
            }
        }

        Err(ParsingError::UnterminatedConditional(header))
    }

    fn close_conditional(
        &mut self,
        expression: &str,
        children: Vec<Block>,
        terminal: bool,
    ) -> Block {
        self.block(BlockKind::Conditional {
            expression: expression.to_string(),
            children,
            terminal,
        })
    }

    fn flush_text(&mut self, pending: &mut Vec<String>, blocks: &mut Vec<Block>) {
        if pending.is_empty() {
            return;
        }

        let content = pending
            .join("\n")
            .trim()
            .to_string();
        pending.clear();

        if !content.is_empty() {
            let block = self.block(BlockKind::Text { content });
            blocks.push(block);
        }
    }

    /// Parse a `Q:` line into one of the two question shapes. A question
    /// whose variable was never declared produces nothing: rendering an
    /// answer field with nowhere to store the answer helps nobody.
    fn parse_question(&self, line: &str) -> Option<Question> {
        let content = line
            .trim()
            .strip_prefix("Q:")?
            .trim();

        let multiple_choice = regex!(r"^(.*?)\[(\w+)\]\s*\(\s*One of:\s*([\w\s,]+)\)$");
        if multiple_choice.is_match(content) {
            let captures = regex!(r"^(.*)\[(.*?)\]\s*\(\s*One of:\s*(.*?)\)$").captures(content)?;

            let variable = captures[2].to_string();
            if !self
                .registry
                .contains(&variable)
            {
                debug!("dropping question for undeclared variable '{}'", variable);
                return None;
            }

            let options = captures[3]
                .split(',')
                .map(|option| {
                    option
                        .trim()
                        .to_string()
                })
                .collect();

            return Some(Question {
                prompt: captures[1]
                    .trim()
                    .to_string(),
                variable,
                kind: QuestionKind::Choice { options },
            });
        }

        let captures = match regex!(r"^(.*?)\[(.*?)\]\s*(?:\(([^)]+)\))?$").captures(content) {
            Some(captures) => captures,
            None => {
                warn!("malformed question line: {}", content);
                return None;
            }
        };

        let variable = captures[2].to_string();
        if !self
            .registry
            .contains(&variable)
        {
            debug!("dropping question for undeclared variable '{}'", variable);
            return None;
        }

        let type_hint = captures
            .get(3)
            .map(|hint| {
                hint.as_str()
                    .trim()
            })
            .unwrap_or("text")
            .to_string();

        Some(Question {
            prompt: captures[1]
                .trim()
                .to_string(),
            variable,
            kind: QuestionKind::Input { type_hint },
        })
    }

    fn parse_styled(&mut self, line: &str) -> Block {
        let trimmed = line.trim();

        if let Some(captures) = regex!(r"^\[([A-Za-z_]+)\]\s*(.*)$").captures(trimmed) {
            if let Some(style) = StyleKey::from_key(&captures[1]) {
                let content = self.substitute_constants(&captures[2]);
                return self.block(BlockKind::Styled { style, content });
            }
            warn!("unknown style key: {}", &captures[1]);
        }

        // best effort: keep the author's line as visible text
        self.block(BlockKind::Text {
            content: trimmed.to_string(),
        })
    }

    /// Replace `{const name}` macro references. An unresolved reference is
    /// left in place as literal text so the author can see what is broken.
    fn substitute_constants(&self, text: &str) -> String {
        regex!(r"(?i)\{const\s+([a-z_][a-z0-9_]*)\}")
            .replace_all(text, |captures: &regex::Captures| {
                let name = &captures[1];
                match self
                    .constants
                    .get(name)
                {
                    Some(value) => value.clone(),
                    None => {
                        warn!("no constant defined for {{const {}}}", name);
                        captures[0].to_string()
                    }
                }
            })
            .to_string()
    }
}

/// Strip `showif` and any braces from a conditional header, leaving the
/// trimmed expression text exactly as written.
fn extract_condition(line: &str) -> String {
    regex!(r"showif|\{|\}")
        .replace_all(line, "")
        .trim()
        .to_string()
}

/// Pull the loop condition out of a `{RepeatStep Until …}` header. The
/// `until` keyword is matched case-insensitively; the trailing expression
/// gets the single-`=` tolerance rewrite.
fn parse_repeat_header(line: &str) -> Option<String> {
    match regex!(r"(?i)^\{\s*repeatstep\s+until\s+(.+?)\s*\}?\s*$").captures(line.trim()) {
        Some(captures) => Some(normalize_repeat_expression(&captures[1])),
        None => {
            warn!("repeat header has no 'until' condition: {}", line.trim());
            None
        }
    }
}

/// Seed the registry from trailing `[name]` declarations, which is how
/// question lines (and standalone mentions) introduce their variables
/// before any evaluation happens.
pub fn scan_variables(content: &str) -> Registry {
    let declaration = regex!(r"(?i)\[([a-z_][a-z0-9_]*)\]\s*(\([^)]*\))?\s*$");

    let mut registry = Registry::new();
    for line in content.lines() {
        if let Some(captures) = declaration.captures(line) {
            registry.declare(&captures[1]);
        }
    }
    registry
}

/// Collect `[name] const: value` definitions from anywhere in the source.
pub fn scan_constants(content: &str) -> IndexMap<String, String> {
    let definition = regex!(r"(?i)^\[([a-z_][a-z0-9_]*)\]\s+const:\s*(.+)$");

    let mut constants = IndexMap::new();
    for line in content.lines() {
        if let Some(captures) = definition.captures(line) {
            constants.insert(
                captures[1].to_string(),
                captures[2]
                    .trim()
                    .to_string(),
            );
        }
    }
    constants
}

/// Group the top-level block list into steps at Separator blocks, hoisting
/// each step's first repeat directive onto the step itself. Steps with no
/// content at all are dropped.
fn assemble_steps(blocks: Vec<Block>) -> Vec<Step> {
    let mut steps = Vec::new();
    let mut current: Vec<Block> = Vec::new();
    let mut repeat_until: Option<String> = None;

    let mut flush = |current: &mut Vec<Block>, repeat_until: &mut Option<String>| {
        if !current.is_empty() || repeat_until.is_some() {
            steps.push(Step {
                blocks: std::mem::take(current),
                repeat_until: repeat_until.take(),
            });
        }
    };

    for block in blocks {
        match block.kind {
            BlockKind::Separator => flush(&mut current, &mut repeat_until),
            BlockKind::Repeat { expression } => {
                if repeat_until.is_none() {
                    repeat_until = Some(expression);
                } else {
                    warn!("step already has a repeat condition, ignoring another");
                }
            }
            _ => current.push(block),
        }
    }
    flush(&mut current, &mut repeat_until);

    steps
}
