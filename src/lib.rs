pub mod ast;
pub mod codegen;
pub mod error;
pub mod lexer;
pub mod parser;
pub mod semantic;
pub mod symbols;
pub mod token;

pub use codegen::CodeGenerator;
pub use error::CompileError;

/// Runs the full pipeline: tokenize, parse, semantic checks, C++ emission.
/// The first failing stage wins; lexical and semantic diagnostics are
/// returned in bulk, syntax and generation errors stop at the first one.
pub fn compile(source: &str) -> Result<String, CompileError> {
    let (tokens, lex_errors) = lexer::tokenize(source);
    if !lex_errors.is_empty() {
        return Err(CompileError::Lexical(lex_errors));
    }
    let program = parser::parse_tokens(tokens)?;
    let semantic_errors = semantic::analyze(&program);
    if !semantic_errors.is_empty() {
        return Err(CompileError::Semantic(semantic_errors));
    }
    codegen::generate(&program).map_err(CompileError::Generation)
}
