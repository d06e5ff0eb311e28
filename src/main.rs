use clap::{Arg, ArgAction, Command};
use owo_colors::OwoColorize;
use std::io::Read;
use std::path::Path;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use stepwise::{parsing, problem};

fn main() -> ExitCode {
    const VERSION: &str = concat!("v", env!("CARGO_PKG_VERSION"));

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let matches = Command::new("stepwise")
        .version(VERSION)
        .propagate_version(true)
        .about("Compiler for interactive step-by-step procedure documents.")
        .disable_help_subcommand(true)
        .subcommand(
            Command::new("check")
                .about("Syntax-check the given procedure document")
                .arg(
                    Arg::new("concise")
                        .long("concise")
                        .action(ArgAction::SetTrue)
                        .help("Report errors on a single line each, without source context."),
                )
                .arg(
                    Arg::new("filename")
                        .required(true)
                        .help("The procedure document to check, or '-' for standard input."),
                ),
        )
        .subcommand(
            Command::new("compile")
                .about("Compile the given procedure document and emit its block tree as JSON")
                .arg(
                    Arg::new("compact")
                        .short('c')
                        .long("compact")
                        .action(ArgAction::SetTrue)
                        .help("Emit compact JSON on a single line rather than pretty-printed."),
                )
                .arg(
                    Arg::new("filename")
                        .required(true)
                        .help("The procedure document to compile, or '-' for standard input."),
                ),
        )
        .get_matches();

    match matches.subcommand() {
        Some(("check", submatches)) => {
            let filename = submatches
                .get_one::<String>("filename")
                .map(String::as_str)
                .unwrap_or("-");
            let concise = submatches.get_flag("concise");
            run_check(filename, concise)
        }
        Some(("compile", submatches)) => {
            let filename = submatches
                .get_one::<String>("filename")
                .map(String::as_str)
                .unwrap_or("-");
            let compact = submatches.get_flag("compact");
            run_compile(filename, compact)
        }
        _ => {
            println!("usage: stepwise [COMMAND] ...");
            println!("Try '--help' for more information.");
            ExitCode::SUCCESS
        }
    }
}

fn run_check(filename: &str, concise: bool) -> ExitCode {
    let path = Path::new(filename);
    let content = match load_content(path) {
        Ok(content) => content,
        Err(message) => {
            eprintln!("{}", message);
            return ExitCode::FAILURE;
        }
    };

    match parsing::compile(&content) {
        Ok(procedure) => {
            let steps = procedure
                .steps
                .len();
            let variables = procedure
                .registry
                .len();
            println!(
                "{}: {} step{}, {} variable{}",
                path.display(),
                steps,
                if steps == 1 { "" } else { "s" },
                variables,
                if variables == 1 { "" } else { "s" },
            );
            ExitCode::SUCCESS
        }
        Err(error) => {
            if concise {
                eprintln!("{}", problem::concise_parsing_error(&error, path));
            } else {
                eprintln!("{}", problem::full_parsing_error(&error, path, &content));
            }
            ExitCode::FAILURE
        }
    }
}

fn run_compile(filename: &str, compact: bool) -> ExitCode {
    let path = Path::new(filename);
    let content = match load_content(path) {
        Ok(content) => content,
        Err(message) => {
            eprintln!("{}", message);
            return ExitCode::FAILURE;
        }
    };

    let procedure = match parsing::compile(&content) {
        Ok(procedure) => procedure,
        Err(error) => {
            eprintln!("{}", problem::full_parsing_error(&error, path, &content));
            return ExitCode::FAILURE;
        }
    };

    let output = if compact {
        serde_json::to_string(&procedure)
    } else {
        serde_json::to_string_pretty(&procedure)
    };

    match output {
        Ok(json) => {
            println!("{}", json);
            ExitCode::SUCCESS
        }
        Err(error) => {
            eprintln!("{}: serializing failed: {}", "error".bright_red(), error);
            ExitCode::FAILURE
        }
    }
}

fn load_content(path: &Path) -> Result<String, String> {
    if path.to_str() == Some("-") {
        let mut buffer = String::new();
        match std::io::stdin().read_to_string(&mut buffer) {
            Ok(_) => Ok(buffer),
            Err(error) => Err(format!(
                "{}: failed reading standard input: {}",
                "error".bright_red(),
                error
            )),
        }
    } else {
        parsing::load(path).map_err(|error| problem::concise_loading_error(&error))
    }
}
