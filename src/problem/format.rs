use owo_colors::OwoColorize;
use std::path::Path;

use crate::language::LoadingError;
use crate::parsing::ParsingError;

/// Format a fatal parse error with the offending source line and a caret.
pub fn full_parsing_error(error: &ParsingError, filename: &Path, source: &str) -> String {
    let problem = error.message();
    let i = error.line();

    let code = source
        .lines()
        .nth(i)
        .unwrap_or("?");
    let line = i + 1;
    let width = 3.max(
        line.to_string()
            .len(),
    );

    format!(
        r#"
{}: {}:{} {}

{:width$} {}
{:width$} {} {}
{:width$} {} {}
        "#,
        "error".bright_red(),
        filename.to_string_lossy(),
        line,
        problem.bold(),
        ' ',
        '|'.bright_blue(),
        line.bright_blue(),
        '|'.bright_blue(),
        code,
        ' ',
        '|'.bright_blue(),
        '^'.bright_red(),
    )
    .trim_ascii()
    .to_string()
}

/// Format a fatal parse error as a single line.
pub fn concise_parsing_error(error: &ParsingError, filename: &Path) -> String {
    format!(
        "{}: {}:{} {}",
        "error".bright_red(),
        filename.to_string_lossy(),
        error.line() + 1,
        error
            .message()
            .bold(),
    )
}

/// Format a LoadingError with concise single-line output.
pub fn concise_loading_error(error: &LoadingError<'_>) -> String {
    format!(
        "{}: {}: {}",
        "error".bright_red(),
        error
            .filename
            .display(),
        error
            .problem
            .bold(),
    )
}
