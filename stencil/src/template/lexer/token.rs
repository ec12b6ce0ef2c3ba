use super::Value;

use serde::{Deserialize, Serialize};

/// A template language token, e.g. `if` or `for`.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub enum Token {
    // e.g. `<html><body></body></html>`
    Text(String),
    // e.g. `<% logged_in %>`
    Variable(String),
    // e.g. `<% 5 %>`
    Value(Value),
    // e.g. `<%@ model reports::Invoice %>`
    Directive(String),
    // `<% if %>`
    If,
    // `<% elsif %>`
    ElseIf,
    // `<% else %>`
    Else,
    End,
    BlockStart,
    BlockStartPrint,
    BlockStartPrintRaw,
    BlockEnd,
    Space,
    Dot,
    And,
    Or,
    Not,
    For,
    In,
    Plus,
    Minus,
    Mod,
    Div,
    Mult,
    Equals,
    NotEquals,
    GreaterThan,
    GreaterEqualThan,
    LessThan,
    LessEqualThan,
    SquareBracketStart,
    SquareBracketEnd,
    Comma,
    RoundBracketStart,
    RoundBracketEnd,
}

impl Token {
    /// Length of the token in the source, used to underline errors.
    pub fn len(&self) -> usize {
        match self {
            Token::Text(text) | Token::Variable(text) | Token::Directive(text) => text.len(),
            Token::If | Token::In => 2,
            Token::Else => 4,
            Token::ElseIf => 5,
            Token::End | Token::For => 3,
            Token::And | Token::Or | Token::Equals | Token::NotEquals => 2,
            Token::GreaterEqualThan | Token::LessEqualThan => 2,
            Token::BlockStart | Token::BlockEnd => 2,
            Token::BlockStartPrint | Token::BlockStartPrintRaw => 3,
            _ => 1,
        }
    }

    /// Keywords that start or continue a control block.
    pub fn is_keyword(&self) -> bool {
        matches!(
            self,
            Token::If | Token::ElseIf | Token::Else | Token::End | Token::For
        )
    }
}
