//! The template language.
//!
//! ERB-style blocks: `<% %>` evaluates, `<%= %>` prints HTML-encoded,
//! `<%- %>` prints raw and `<%@ %>` carries a directive for the compiler.
pub mod context;
pub mod error;
pub mod language;
pub mod lexer;

pub use context::{Context, Runtime};
pub use error::Error;
pub use language::{Evaluate, Program};
pub use lexer::{Lexer, ToValue, Token, TokenWithContext, Tokenize, Value};
