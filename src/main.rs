use std::fs;
use std::io::{self, Read};

use anyhow::{bail, Context, Result};

use py2cpp::{codegen, lexer, parser, semantic};

enum Emit {
    Tokens,
    Ast,
    Cpp,
}

fn main() -> Result<()> {
    let mut args = std::env::args().skip(1);
    let mut emit = Emit::Cpp;
    let mut check_only = false;
    let mut input_path: Option<String> = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--emit" | "-e" => {
                let target = args
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("Missing target after {arg}"))?;
                emit = match target.as_str() {
                    "tokens" => Emit::Tokens,
                    "ast" => Emit::Ast,
                    "cpp" => Emit::Cpp,
                    other => bail!("Unknown emit target '{other}'"),
                };
            }
            "--check" | "-c" => check_only = true,
            _ => {
                input_path = Some(arg);
                if args.next().is_some() {
                    bail!("Only one input file is supported");
                }
                break;
            }
        }
    }

    let source = if let Some(path) = input_path {
        fs::read_to_string(&path).with_context(|| format!("Reading {path}"))?
    } else {
        let mut buffer = String::new();
        io::stdin()
            .read_to_string(&mut buffer)
            .context("Reading stdin")?;
        buffer
    };

    let (tokens, lex_errors) = lexer::tokenize(&source);
    for error in &lex_errors {
        eprintln!("{error}");
    }

    if let Emit::Tokens = emit {
        for token in &tokens {
            println!(
                "{}:{} {}",
                token.span.line,
                token.span.column,
                token.kind.describe()
            );
        }
        if !lex_errors.is_empty() {
            bail!("{} lexical error(s)", lex_errors.len());
        }
        return Ok(());
    }

    let program = parser::parse_tokens(tokens)?;

    if let Emit::Ast = emit {
        println!("{program:#?}");
        return Ok(());
    }

    let semantic_errors = semantic::analyze(&program);
    for error in &semantic_errors {
        eprintln!("{error}");
    }
    if check_only {
        let total = lex_errors.len() + semantic_errors.len();
        if total > 0 {
            bail!("{total} error(s) found");
        }
        println!("No errors found");
        return Ok(());
    }
    if !lex_errors.is_empty() || !semantic_errors.is_empty() {
        bail!(
            "{} error(s), not generating code",
            lex_errors.len() + semantic_errors.len()
        );
    }

    let output = codegen::generate(&program)?;
    print!("{output}");
    Ok(())
}
