//! The restricted expression language used by show-if conditions,
//! repeat-until headers, and code-block assignments.
//!
//! Expressions are parsed into a small AST and interpreted directly
//! against the registry. There is no dynamic code execution: the dialect
//! is identifiers, string and number literals, `undefined`/`true`/`false`,
//! arithmetic, comparisons, and logical operators. Arithmetic is loose in
//! the manner of the documents this grammar grew up with: text that looks
//! like a number coerces, anything else becomes NaN rather than an error.

use std::fmt;

use tracing::{debug, warn};

use crate::language::{Registry, Value};

/// Hard ceiling on expression source length; anything longer is rejected
/// before parsing.
pub const MAX_EXPRESSION_LENGTH: usize = 4096;

const MAX_DEPTH: u32 = 64;

#[derive(Debug, Clone, PartialEq)]
pub enum EvalError {
    /// Reference to an identifier that is not a registry key. Callers
    /// apply the fail-open policy for this class and only this class.
    UnknownIdentifier(String),
    Malformed(String),
    TooComplex,
}

impl EvalError {
    pub fn is_unknown_identifier(&self) -> bool {
        matches!(self, EvalError::UnknownIdentifier(_))
    }
}

impl fmt::Display for EvalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvalError::UnknownIdentifier(name) => {
                write!(f, "unknown identifier '{}'", name)
            }
            EvalError::Malformed(details) => write!(f, "malformed expression: {}", details),
            EvalError::TooComplex => write!(f, "expression too long or too deeply nested"),
        }
    }
}

/// Evaluate an expression against the current registry.
pub fn evaluate(source: &str, registry: &Registry) -> Result<Value, EvalError> {
    if source.len() > MAX_EXPRESSION_LENGTH {
        return Err(EvalError::TooComplex);
    }

    let tokens = tokenize(source)?;
    if tokens.is_empty() {
        return Err(EvalError::Malformed("empty expression".to_string()));
    }

    let mut parser = ExprParser {
        tokens: &tokens,
        position: 0,
        depth: 0,
    };
    let expression = parser.parse_or()?;
    parser.expect_end()?;

    eval(&expression, registry)
}

/// Visibility context: an unknown-dependency conditional defaults to
/// shown; any other failure hides the section. An empty expression is
/// left shown, untouched.
pub fn evaluate_visibility(source: &str, registry: &Registry) -> bool {
    if source
        .trim()
        .is_empty()
    {
        return true;
    }

    match evaluate(source, registry) {
        Ok(value) => value.is_truthy(),
        Err(error) if error.is_unknown_identifier() => {
            debug!("conditional '{}' has {}, shown by default", source, error);
            true
        }
        Err(error) => {
            warn!("conditional '{}' failed to evaluate: {}", source, error);
            false
        }
    }
}

/// Repeat-until context: an unknown-dependency loop condition is NOT
/// satisfied, so the step keeps repeating.
pub fn evaluate_until(source: &str, registry: &Registry) -> bool {
    if source
        .trim()
        .is_empty()
    {
        return false;
    }

    match evaluate(source, registry) {
        Ok(value) => value.is_truthy(),
        Err(error) if error.is_unknown_identifier() => {
            debug!("repeat condition '{}' has {}, keeps repeating", source, error);
            false
        }
        Err(error) => {
            warn!("repeat condition '{}' failed to evaluate: {}", source, error);
            false
        }
    }
}

/// Tolerate the common authoring mistake of a single `=` in a repeat
/// header. The check looks only at the raw text: if no comparison
/// operator is present and the expression contains exactly one literal
/// `=`, it is rewritten to an equality comparison.
pub fn normalize_repeat_expression(raw: &str) -> String {
    let trimmed = raw.trim();

    let has_comparison = ["==", "!=", "<=", ">=", "<", ">"]
        .iter()
        .any(|operator| trimmed.contains(operator));

    if !has_comparison
        && trimmed
            .matches('=')
            .count()
            == 1
    {
        return trimmed.replacen('=', "==", 1);
    }

    trimmed.to_string()
}

// ---------------------------------------------------------------------
// Tokens
// ---------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Identifier(String),
    Number(f64),
    Text(String),
    Operator(Operator),
    OpenParen,
    CloseParen,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Operator {
    Or,
    And,
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    Add,
    Subtract,
    Multiply,
    Divide,
    Remainder,
    Not,
}

fn tokenize(source: &str) -> Result<Vec<Token>, EvalError> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if c.is_whitespace() {
            i += 1;
            continue;
        }

        if c.is_ascii_digit() {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                i += 1;
            }
            let text: String = chars[start..i]
                .iter()
                .collect();
            let number = text
                .parse::<f64>()
                .map_err(|_| EvalError::Malformed(format!("bad number '{}'", text)))?;
            tokens.push(Token::Number(number));
            continue;
        }

        if c.is_alphabetic() || c == '_' || c == '$' {
            let start = i;
            while i < chars.len()
                && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '$')
            {
                i += 1;
            }
            tokens.push(Token::Identifier(
                chars[start..i]
                    .iter()
                    .collect(),
            ));
            continue;
        }

        if c == '"' || c == '\'' {
            let quote = c;
            i += 1;
            let mut text = String::new();
            loop {
                if i >= chars.len() {
                    return Err(EvalError::Malformed("unterminated string".to_string()));
                }
                match chars[i] {
                    '\\' if i + 1 < chars.len() => {
                        text.push(chars[i + 1]);
                        i += 2;
                    }
                    terminator if terminator == quote => {
                        i += 1;
                        break;
                    }
                    other => {
                        text.push(other);
                        i += 1;
                    }
                }
            }
            tokens.push(Token::Text(text));
            continue;
        }

        let next = chars
            .get(i + 1)
            .copied()
            .unwrap_or('\0');
        let (token, width) = match (c, next) {
            ('|', '|') => (Token::Operator(Operator::Or), 2),
            ('&', '&') => (Token::Operator(Operator::And), 2),
            ('=', '=') => (Token::Operator(Operator::Equal), 2),
            ('!', '=') => (Token::Operator(Operator::NotEqual), 2),
            ('<', '=') => (Token::Operator(Operator::LessEqual), 2),
            ('>', '=') => (Token::Operator(Operator::GreaterEqual), 2),
            ('<', _) => (Token::Operator(Operator::Less), 1),
            ('>', _) => (Token::Operator(Operator::Greater), 1),
            ('!', _) => (Token::Operator(Operator::Not), 1),
            ('+', _) => (Token::Operator(Operator::Add), 1),
            ('-', _) => (Token::Operator(Operator::Subtract), 1),
            ('*', _) => (Token::Operator(Operator::Multiply), 1),
            ('/', _) => (Token::Operator(Operator::Divide), 1),
            ('%', _) => (Token::Operator(Operator::Remainder), 1),
            ('(', _) => (Token::OpenParen, 1),
            (')', _) => (Token::CloseParen, 1),
            ('=', _) => {
                return Err(EvalError::Malformed(
                    "single '=' is assignment, not comparison".to_string(),
                ));
            }
            _ => {
                return Err(EvalError::Malformed(format!("unexpected character '{}'", c)));
            }
        };
        tokens.push(token);
        i += width;
    }

    Ok(tokens)
}

// ---------------------------------------------------------------------
// Grammar
// ---------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Literal(Value),
    Variable(String),
    Unary(Operator, Box<Expr>),
    Binary(Operator, Box<Expr>, Box<Expr>),
}

struct ExprParser<'t> {
    tokens: &'t [Token],
    position: usize,
    depth: u32,
}

impl<'t> ExprParser<'t> {
    fn peek(&self) -> Option<&Token> {
        self.tokens
            .get(self.position)
    }

    fn take_operator(&mut self, wanted: &[Operator]) -> Option<Operator> {
        if let Some(Token::Operator(operator)) = self.peek() {
            if wanted.contains(operator) {
                let operator = *operator;
                self.position += 1;
                return Some(operator);
            }
        }
        None
    }

    fn descend(&mut self) -> Result<(), EvalError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(EvalError::TooComplex);
        }
        Ok(())
    }

    fn parse_or(&mut self) -> Result<Expr, EvalError> {
        self.descend()?;
        let mut left = self.parse_and()?;
        while let Some(operator) = self.take_operator(&[Operator::Or]) {
            let right = self.parse_and()?;
            left = Expr::Binary(operator, Box::new(left), Box::new(right));
        }
        self.depth -= 1;
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, EvalError> {
        let mut left = self.parse_equality()?;
        while let Some(operator) = self.take_operator(&[Operator::And]) {
            let right = self.parse_equality()?;
            left = Expr::Binary(operator, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_equality(&mut self) -> Result<Expr, EvalError> {
        let mut left = self.parse_comparison()?;
        while let Some(operator) = self.take_operator(&[Operator::Equal, Operator::NotEqual]) {
            let right = self.parse_comparison()?;
            left = Expr::Binary(operator, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_comparison(&mut self) -> Result<Expr, EvalError> {
        let mut left = self.parse_additive()?;
        while let Some(operator) = self.take_operator(&[
            Operator::Less,
            Operator::LessEqual,
            Operator::Greater,
            Operator::GreaterEqual,
        ]) {
            let right = self.parse_additive()?;
            left = Expr::Binary(operator, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_additive(&mut self) -> Result<Expr, EvalError> {
        let mut left = self.parse_term()?;
        while let Some(operator) = self.take_operator(&[Operator::Add, Operator::Subtract]) {
            let right = self.parse_term()?;
            left = Expr::Binary(operator, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_term(&mut self) -> Result<Expr, EvalError> {
        let mut left = self.parse_unary()?;
        while let Some(operator) = self.take_operator(&[
            Operator::Multiply,
            Operator::Divide,
            Operator::Remainder,
        ]) {
            let right = self.parse_unary()?;
            left = Expr::Binary(operator, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, EvalError> {
        self.descend()?;
        let result = if let Some(operator) =
            self.take_operator(&[Operator::Not, Operator::Subtract])
        {
            let inner = self.parse_unary()?;
            Ok(Expr::Unary(operator, Box::new(inner)))
        } else {
            self.parse_primary()
        };
        self.depth -= 1;
        result
    }

    fn parse_primary(&mut self) -> Result<Expr, EvalError> {
        match self
            .peek()
            .cloned()
        {
            Some(Token::Number(number)) => {
                self.position += 1;
                Ok(Expr::Literal(Value::Number(number)))
            }
            Some(Token::Text(text)) => {
                self.position += 1;
                Ok(Expr::Literal(Value::Text(text)))
            }
            Some(Token::Identifier(name)) => {
                self.position += 1;
                match name.as_str() {
                    "undefined" | "null" => Ok(Expr::Literal(Value::Empty)),
                    "true" => Ok(Expr::Literal(Value::Number(1.0))),
                    "false" => Ok(Expr::Literal(Value::Number(0.0))),
                    _ => Ok(Expr::Variable(name)),
                }
            }
            Some(Token::OpenParen) => {
                self.position += 1;
                let inner = self.parse_or()?;
                match self.peek() {
                    Some(Token::CloseParen) => {
                        self.position += 1;
                        Ok(inner)
                    }
                    _ => Err(EvalError::Malformed("expected ')'".to_string())),
                }
            }
            Some(other) => Err(EvalError::Malformed(format!(
                "unexpected token {:?}",
                other
            ))),
            None => Err(EvalError::Malformed("unexpected end of expression".to_string())),
        }
    }

    fn expect_end(&self) -> Result<(), EvalError> {
        if self.position == self.tokens.len() {
            Ok(())
        } else {
            Err(EvalError::Malformed("trailing tokens".to_string()))
        }
    }
}

// ---------------------------------------------------------------------
// Interpretation
// ---------------------------------------------------------------------

fn eval(expression: &Expr, registry: &Registry) -> Result<Value, EvalError> {
    match expression {
        Expr::Literal(value) => Ok(value.clone()),

        Expr::Variable(name) => registry
            .get(name)
            .cloned()
            .ok_or_else(|| EvalError::UnknownIdentifier(name.clone())),

        Expr::Unary(Operator::Not, inner) => {
            let value = eval(inner, registry)?;
            Ok(bool_value(!value.is_truthy()))
        }
        Expr::Unary(Operator::Subtract, inner) => {
            let value = eval(inner, registry)?;
            Ok(Value::Number(-value.as_number()))
        }
        Expr::Unary(operator, _) => Err(EvalError::Malformed(format!(
            "operator {:?} is not unary",
            operator
        ))),

        Expr::Binary(Operator::And, left, right) => {
            let left = eval(left, registry)?;
            if !left.is_truthy() {
                return Ok(bool_value(false));
            }
            let right = eval(right, registry)?;
            Ok(bool_value(right.is_truthy()))
        }
        Expr::Binary(Operator::Or, left, right) => {
            let left = eval(left, registry)?;
            if left.is_truthy() {
                return Ok(bool_value(true));
            }
            let right = eval(right, registry)?;
            Ok(bool_value(right.is_truthy()))
        }

        Expr::Binary(operator, left, right) => {
            let left = eval(left, registry)?;
            let right = eval(right, registry)?;
            Ok(apply_binary(*operator, left, right))
        }
    }
}

fn apply_binary(operator: Operator, left: Value, right: Value) -> Value {
    match operator {
        Operator::Equal => bool_value(loose_eq(&left, &right)),
        Operator::NotEqual => bool_value(!loose_eq(&left, &right)),

        Operator::Less
        | Operator::LessEqual
        | Operator::Greater
        | Operator::GreaterEqual => bool_value(compare(operator, &left, &right)),

        Operator::Add => {
            // text on either side concatenates, otherwise numeric
            if matches!(left, Value::Text(_)) || matches!(right, Value::Text(_)) {
                Value::Text(format!("{}{}", left, right))
            } else {
                Value::Number(left.as_number() + right.as_number())
            }
        }
        Operator::Subtract => Value::Number(left.as_number() - right.as_number()),
        Operator::Multiply => Value::Number(left.as_number() * right.as_number()),
        Operator::Divide => Value::Number(left.as_number() / right.as_number()),
        Operator::Remainder => Value::Number(left.as_number() % right.as_number()),

        Operator::And | Operator::Or | Operator::Not => {
            // handled before dispatch
            Value::Empty
        }
    }
}

/// Loose equality: numbers and numeric-looking text compare by value,
/// empty compares equal to empty text.
fn loose_eq(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Empty, Value::Empty) => true,
        (Value::Empty, Value::Text(text)) | (Value::Text(text), Value::Empty) => text.is_empty(),
        (Value::Empty, Value::Number(_)) | (Value::Number(_), Value::Empty) => false,
        (Value::Text(a), Value::Text(b)) => a == b,
        (Value::Number(a), Value::Number(b)) => a == b,
        (Value::Number(number), Value::Text(text))
        | (Value::Text(text), Value::Number(number)) => text
            .trim()
            .parse::<f64>()
            .map(|parsed| parsed == *number)
            .unwrap_or(false),
    }
}

fn compare(operator: Operator, left: &Value, right: &Value) -> bool {
    // two text values order lexicographically; anything else numerically,
    // and NaN makes every comparison false
    if let (Value::Text(a), Value::Text(b)) = (left, right) {
        return match operator {
            Operator::Less => a < b,
            Operator::LessEqual => a <= b,
            Operator::Greater => a > b,
            Operator::GreaterEqual => a >= b,
            _ => false,
        };
    }

    let a = left.as_number();
    let b = right.as_number();
    match operator {
        Operator::Less => a < b,
        Operator::LessEqual => a <= b,
        Operator::Greater => a > b,
        Operator::GreaterEqual => a >= b,
        _ => false,
    }
}

fn bool_value(truth: bool) -> Value {
    Value::Number(if truth { 1.0 } else { 0.0 })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> Registry {
        let mut registry = Registry::new();
        registry.set("name", Value::Text("Bob".to_string()));
        registry.set("count", Value::Number(3.0));
        registry.set("blank", Value::Empty);
        registry
    }

    #[test]
    fn literals_and_arithmetic() {
        let vars = registry();
        assert_eq!(evaluate("1 + 2 * 3", &vars), Ok(Value::Number(7.0)));
        assert_eq!(evaluate("(1 + 2) * 3", &vars), Ok(Value::Number(9.0)));
        assert_eq!(evaluate("10 % 4", &vars), Ok(Value::Number(2.0)));
        assert_eq!(evaluate("-count", &vars), Ok(Value::Number(-3.0)));
    }

    #[test]
    fn text_concatenation() {
        let vars = registry();
        assert_eq!(
            evaluate("name + '!'", &vars),
            Ok(Value::Text("Bob!".to_string()))
        );
        assert_eq!(
            evaluate("'n=' + count", &vars),
            Ok(Value::Text("n=3".to_string()))
        );
    }

    #[test]
    fn comparisons() {
        let vars = registry();
        assert_eq!(evaluate("name == \"Bob\"", &vars), Ok(Value::Number(1.0)));
        assert_eq!(evaluate("name != 'Bob'", &vars), Ok(Value::Number(0.0)));
        assert_eq!(evaluate("count >= 3", &vars), Ok(Value::Number(1.0)));
        assert_eq!(evaluate("count < 3", &vars), Ok(Value::Number(0.0)));
        // numeric-looking text compares by value
        assert_eq!(evaluate("'3' == 3", &vars), Ok(Value::Number(1.0)));
        // an unanswered variable equals the empty string
        assert_eq!(evaluate("blank == ''", &vars), Ok(Value::Number(1.0)));
        assert_eq!(evaluate("blank == 0", &vars), Ok(Value::Number(0.0)));
    }

    #[test]
    fn logic_short_circuits() {
        let vars = registry();
        assert_eq!(
            evaluate("count == 3 && name == 'Bob'", &vars),
            Ok(Value::Number(1.0))
        );
        assert_eq!(evaluate("!blank", &vars), Ok(Value::Number(1.0)));
        // the unknown side is never reached
        assert_eq!(evaluate("count == 9 && missing == 1", &vars), Ok(Value::Number(0.0)));
        assert_eq!(evaluate("count == 3 || missing == 1", &vars), Ok(Value::Number(1.0)));
    }

    #[test]
    fn unknown_identifiers_are_their_own_class() {
        let vars = registry();
        let result = evaluate("missing == 1", &vars);
        assert_eq!(
            result,
            Err(EvalError::UnknownIdentifier("missing".to_string()))
        );
        assert!(result
            .unwrap_err()
            .is_unknown_identifier());
    }

    #[test]
    fn fail_open_policies() {
        let vars = registry();
        // visibility: unknown dependency defaults to shown
        assert!(evaluate_visibility("missing == 1", &vars));
        assert!(!evaluate_visibility("count == 9", &vars));
        // repeat-until: unknown dependency keeps repeating
        assert!(!evaluate_until("missing == 1", &vars));
        assert!(evaluate_until("count == 3", &vars));
        // other failures hide / keep repeating, never crash
        assert!(!evaluate_visibility("count ==", &vars));
        assert!(!evaluate_until("count ==", &vars));
    }

    #[test]
    fn single_equals_is_rejected_outside_repeat_headers() {
        let vars = registry();
        assert!(matches!(
            evaluate("count = 3", &vars),
            Err(EvalError::Malformed(_))
        ));
    }

    #[test]
    fn repeat_normalization() {
        assert_eq!(normalize_repeat_expression("count = 3"), "count == 3");
        assert_eq!(normalize_repeat_expression("count == 3"), "count == 3");
        assert_eq!(normalize_repeat_expression("count >= 3"), "count >= 3");
        assert_eq!(normalize_repeat_expression("a != b"), "a != b");
        // two single equals: ambiguous, left alone
        assert_eq!(normalize_repeat_expression("a = 1 && b = 2"), "a = 1 && b = 2");
    }

    #[test]
    fn safety_bounds() {
        let vars = registry();
        let long = "1 + ".repeat(2000) + "1";
        assert_eq!(evaluate(&long, &vars), Err(EvalError::TooComplex));

        let deep = "(".repeat(100) + "1" + &")".repeat(100);
        assert_eq!(evaluate(&deep, &vars), Err(EvalError::TooComplex));
    }

    #[test]
    fn undefined_keyword_is_the_empty_value() {
        let vars = registry();
        assert_eq!(evaluate("undefined", &vars), Ok(Value::Empty));
        assert_eq!(evaluate("blank == undefined", &vars), Ok(Value::Number(1.0)));
    }
}
