use super::{Token, TokenWithContext};
use thiserror::Error;

use std::path::Path;

#[derive(Error, Debug)]
pub enum Error {
    #[error("syntax error")]
    Syntax(TokenWithContext),

    #[error("expression syntax error")]
    ExpressionSyntax(TokenWithContext),

    #[error("expected token \"{1:?}\", but have token \"{0}\" instead")]
    WrongToken(TokenWithContext, Token),

    #[error("reached end of file while performing \"{0}\", did you forget a closing tag?")]
    Eof(&'static str),

    #[error("variable \"{0}\" is not defined or in scope")]
    UndefinedVariable(String),

    #[error("method \"{0}\" is not defined on {1}")]
    UnknownMethod(String, &'static str),

    #[error("\"{1}\" does not contain a definition for \"{0}\"")]
    UnknownMember(String, String),

    #[error("helper \"{0}\" is not available to this template")]
    UnknownHelper(String),

    #[error("unknown directive \"{0}\"")]
    UnknownDirective(String),

    #[error("{0} is not a list and can't be iterated")]
    NotIterable(String),

    #[error("attempted to divide by zero")]
    DivisionByZero,

    #[error("integer overflow in \"{0}\"")]
    Overflow(&'static str),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("{0}")]
    Helper(String),

    #[error("failed to format a timestamp correctly, error: \"{0}\"")]
    TimeFormat(#[from] time::error::Format),

    #[error("output error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Pretty(String),
}

impl Error {
    /// Position of the offending token, if the error has one.
    pub fn token(&self) -> Option<&TokenWithContext> {
        match self {
            Error::Syntax(token) => Some(token),
            Error::ExpressionSyntax(token) => Some(token),
            Error::WrongToken(token, _) => Some(token),
            _ => None,
        }
    }

    /// Rewrite the error with the offending source line underlined.
    pub fn pretty(self, source: &str, path: Option<impl AsRef<Path> + Copy>) -> Self {
        let token = self.token().cloned();
        let token = match token {
            Some(token) => token,
            None => {
                if let Some(path) = path {
                    let prefix = "---> ";
                    return Error::Pretty(format!(
                        "{}{}\n\n{}{}",
                        prefix,
                        path.as_ref().display(),
                        " ".repeat(prefix.len()),
                        self
                    ));
                } else {
                    return self;
                }
            }
        };

        let context = source.lines().nth(std::cmp::max(1, token.line()) - 1);
        let context = match context {
            Some(context) => context,
            None => return self,
        };

        let leading_spaces = context.len() - context.trim_start().len();
        let offset = (token.column() as i64 - token.token().len() as i64 + 1
            - leading_spaces as i64)
            .max(0) as usize;
        let underline = " ".repeat(offset) + &format!("^ {}", self);

        let line_number = format!("{} | ", token.line());
        let underline_offset = " ".repeat(token.line().to_string().len()) + " | ";

        let path = if let Some(path) = path {
            format!(
                "---> {}:{}:{}\n\n",
                path.as_ref().display(),
                token.line(),
                token.column()
            )
        } else {
            "".to_string()
        };

        Error::Pretty(format!(
            "{}{}\n{}{}\n{}{}",
            path,
            underline_offset,
            line_number,
            context.trim(),
            underline_offset,
            underline
        ))
    }
}
