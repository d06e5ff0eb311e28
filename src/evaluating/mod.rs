// Expression evaluation and embedded-code execution

pub mod code;
pub mod expression;

pub use expression::{
    evaluate, evaluate_until, evaluate_visibility, normalize_repeat_expression, EvalError,
};
