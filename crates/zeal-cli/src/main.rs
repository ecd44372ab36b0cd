//! The `zeal` command-line interface
//!
//! `zeal <source.ze>` compiles and executes a program. The stage flags
//! `-l` / `-p` / `-c` / `-d` stop the pipeline after lexing, parsing,
//! compilation, or disassembly and are mutually exclusive.

use clap::{ArgGroup, Parser};
use std::path::PathBuf;
use std::process::ExitCode;
use zeal_runtime::{Zeal, ZealError};

/// OS-specific search path separator (`;` on Windows, `:` elsewhere)
const SEARCH_PATH_SEPARATOR: char = if cfg!(windows) { ';' } else { ':' };

#[derive(Parser)]
#[command(
    name = "zeal",
    version,
    about = "The Zeal programming language",
    group(ArgGroup::new("stage").args(["lex", "parse", "compile", "dump"]))
)]
struct Args {
    /// Source file to run
    source: PathBuf,

    /// Lex only: print the token stream
    #[arg(short = 'l')]
    lex: bool,

    /// Parse only: print the AST
    #[arg(short = 'p')]
    parse: bool,

    /// Compile only: stop after code generation
    #[arg(short = 'c')]
    compile: bool,

    /// Dump the compiled bytecode
    #[arg(short = 'd')]
    dump: bool,

    /// Additional module search directories, separated by the OS path
    /// separator
    #[arg(long = "search-paths", value_name = "LIST")]
    search_paths: Option<String>,
}

fn parse_search_paths(raw: &str) -> Result<Vec<PathBuf>, String> {
    if raw.starts_with(SEARCH_PATH_SEPARATOR) || raw.ends_with(SEARCH_PATH_SEPARATOR) {
        return Err(format!(
            "search paths may not start or end with '{}'",
            SEARCH_PATH_SEPARATOR
        ));
    }
    Ok(raw
        .split(SEARCH_PATH_SEPARATOR)
        .filter(|part| !part.is_empty())
        .map(PathBuf::from)
        .collect())
}

fn main() -> ExitCode {
    let args = Args::parse();

    let search_paths = match args.search_paths.as_deref() {
        Some(raw) => match parse_search_paths(raw) {
            Ok(paths) => paths,
            Err(msg) => {
                eprintln!("error: {}", msg);
                return ExitCode::from(1);
            }
        },
        None => Vec::new(),
    };

    let zeal = Zeal::new().with_search_paths(search_paths);

    let result = if args.lex {
        zeal.lex_file(&args.source).map(|tokens| {
            for token in &tokens {
                println!("{:?} @ line {}", token.kind, token.span.line);
            }
            0
        })
    } else if args.parse {
        zeal.parse_file(&args.source).map(|program| {
            println!("{:#?}", program);
            0
        })
    } else if args.compile {
        zeal.compile_file(&args.source).map(|_| 0)
    } else if args.dump {
        zeal.disassemble_file(&args.source).map(|listing| {
            print!("{}", listing);
            0
        })
    } else {
        zeal.run_file(&args.source)
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(ZealError::Compile(err)) => {
            eprintln!("{}", err);
            ExitCode::from(1)
        }
        Err(ZealError::Runtime(err)) => {
            eprintln!("{}", err.render());
            ExitCode::from(1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_search_paths_splits_on_separator() {
        let raw = format!("a{}b{}c", SEARCH_PATH_SEPARATOR, SEARCH_PATH_SEPARATOR);
        let paths = parse_search_paths(&raw).unwrap();
        assert_eq!(
            paths,
            vec![PathBuf::from("a"), PathBuf::from("b"), PathBuf::from("c")]
        );
    }

    #[test]
    fn test_parse_search_paths_rejects_leading_separator() {
        let raw = format!("{}a", SEARCH_PATH_SEPARATOR);
        assert!(parse_search_paths(&raw).is_err());
    }

    #[test]
    fn test_parse_search_paths_rejects_trailing_separator() {
        let raw = format!("a{}", SEARCH_PATH_SEPARATOR);
        assert!(parse_search_paths(&raw).is_err());
    }
}
