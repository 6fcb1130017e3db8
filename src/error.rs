//! Stage-tagged compilation errors. Each pipeline stage fails in its own
//! shape; `CompileError` collapses them into one type for callers that run
//! the whole pipeline at once.

use thiserror::Error;

use crate::lexer::LexError;
use crate::parser::ParseError;
use crate::semantic::SemanticError;

#[derive(Debug, Error)]
pub enum CompileError {
    #[error("{} lexical error{}", .0.len(), plural(.0.len()))]
    Lexical(Vec<LexError>),

    #[error(transparent)]
    Syntax(#[from] ParseError),

    #[error("{} semantic error{}", .0.len(), plural(.0.len()))]
    Semantic(Vec<SemanticError>),

    #[error("Code generation error: {0}")]
    Generation(anyhow::Error),
}

impl CompileError {
    /// Which pipeline stage produced this error.
    pub fn stage(&self) -> &'static str {
        match self {
            CompileError::Lexical(_) => "lexer",
            CompileError::Syntax(_) => "parser",
            CompileError::Semantic(_) => "semantic",
            CompileError::Generation(_) => "codegen",
        }
    }

    /// One line per underlying diagnostic, for terminal output.
    pub fn report(&self) -> String {
        match self {
            CompileError::Lexical(errors) => errors
                .iter()
                .map(|error| error.to_string())
                .collect::<Vec<_>>()
                .join("\n"),
            CompileError::Syntax(error) => error.to_string(),
            CompileError::Semantic(errors) => errors
                .iter()
                .map(|error| error.to_string())
                .collect::<Vec<_>>()
                .join("\n"),
            CompileError::Generation(error) => error.to_string(),
        }
    }
}

fn plural(count: usize) -> &'static str {
    if count == 1 {
        ""
    } else {
        "s"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_names() {
        let lexical = CompileError::Lexical(vec![]);
        let syntax = CompileError::Syntax(ParseError {
            expected: "newline".to_string(),
            found: "'+'".to_string(),
            line: 1,
            position: 3,
        });
        let semantic = CompileError::Semantic(vec![]);
        let generation = CompileError::Generation(anyhow::anyhow!("boom"));
        assert_eq!(lexical.stage(), "lexer");
        assert_eq!(syntax.stage(), "parser");
        assert_eq!(semantic.stage(), "semantic");
        assert_eq!(generation.stage(), "codegen");
    }

    #[test]
    fn report_joins_diagnostics() {
        let error = CompileError::Semantic(vec![
            SemanticError {
                message: "Variable 'x' is not defined".to_string(),
                line: 2,
            },
            SemanticError {
                message: "Variable 'y' is not defined".to_string(),
                line: 3,
            },
        ]);
        let report = error.report();
        assert!(report.contains("Line 2: Variable 'x' is not defined"));
        assert!(report.contains("Line 3: Variable 'y' is not defined"));
        assert_eq!(report.lines().count(), 2);
    }
}
