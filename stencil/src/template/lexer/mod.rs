pub mod token;
pub mod value;

pub use token::Token;
pub use value::{ToValue, Value};

use super::Error;

use std::iter::Peekable;
use std::str::Chars;

/// Token annotated with its position in the template source.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenWithContext {
    token: Token,
    line: usize,
    column: usize,
}

impl std::fmt::Display for TokenWithContext {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "{:?} (line: {}, column: {})",
            self.token, self.line, self.column
        )
    }
}

impl TokenWithContext {
    pub fn new(token: Token, line: usize, column: usize) -> Self {
        Self {
            token,
            line,
            column,
        }
    }

    pub fn line(&self) -> usize {
        self.line
    }

    pub fn column(&self) -> usize {
        self.column
    }

    pub fn token(&self) -> Token {
        self.token.clone()
    }
}

/// The lexer converts a template text
/// into a list of tokens that may mean something
/// in the template language.
///
/// Anything that's not inside a code block, e.g. `<% %>`, is considered
/// to be just text that needs to be printed as-is. This text is
/// represented by the special `Token::Text`.
///
/// Directives, e.g. `<%@ model reports::Invoice %>`, are kept as raw text
/// for the compiler to interpret. A line break right after a directive
/// is not part of the output.
pub struct Lexer<'a> {
    // Template source.
    source: &'a str,
    // Resulting tokens.
    tokens: Vec<TokenWithContext>,
    // Buffer for multi-character tokens.
    buffer: String,
    // Indicates if we're inside code block where
    // some characters have special meaning, e.g. `<% 5 / 3 %>`
    code_block: bool,
    // Indicates we're currently parsing a number, so the `.` character
    // has special meaning.
    number: bool,
    // Which line we're on.
    line: usize,
    // Which column we're on.
    column: usize,
}

impl<'a> Lexer<'a> {
    /// Create new lexer from text input.
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            tokens: vec![],
            buffer: String::new(),
            code_block: false,
            number: false,
            line: 1,
            column: 0,
        }
    }

    /// Parse an input string into tokens supported by the template language.
    ///
    /// Tokens are processed one character at a time. Multi-character tokens like `if`
    /// or `for` are buffered and parsed as a string.
    pub fn tokens(mut self) -> Result<Vec<TokenWithContext>, Error> {
        let mut iter = self.source.chars().peekable();

        while let Some(c) = iter.next() {
            self.column += 1;
            match c {
                '\n' | '\r' | '\t' if self.code_block => {
                    if c == '\n' {
                        self.newline();
                    }
                    self.separator();
                }

                '\n' => {
                    self.buffer.push(c);
                    self.newline();
                }

                // Possibly a code block start tag.
                '<' => match iter.peek() {
                    Some('%') if !self.code_block => {
                        iter.next();
                        self.column += 1;
                        self.block_start(&mut iter)?;
                    }

                    // Comparison operator, e.g. `<% a < b %>` or `<% a <= b %>`.
                    Some(_) if self.code_block => {
                        self.drain_buffer();
                        if iter.peek() == Some(&'=') {
                            iter.next();
                            self.tokens.push(self.add_token(Token::LessEqualThan));
                        } else {
                            self.tokens.push(self.add_token(Token::LessThan));
                        }
                    }

                    // Just a "less than" sign, e.g. opening bracket for an HTML tag.
                    _ => self.buffer.push('<'),
                },

                '>' if self.code_block => {
                    self.drain_buffer();
                    if iter.peek() == Some(&'=') {
                        iter.next();
                        self.tokens.push(self.add_token(Token::GreaterEqualThan));
                    } else {
                        self.tokens.push(self.add_token(Token::GreaterThan));
                    }
                }

                '.' => {
                    // If we're parsing a number, keep the dot for the floating point
                    // notation. Otherwise, it's an accessor for a method call or object attribute.
                    if self.code_block {
                        if self.number && iter.peek().map(|c| c.is_numeric()).unwrap_or(false) {
                            self.buffer.push('.');
                        } else {
                            self.drain_buffer();
                            self.tokens.push(self.add_token(Token::Dot));
                        }
                    } else {
                        // Or it's just a dot part of the template.
                        self.buffer.push('.');
                    }
                }

                '!' if self.code_block => {
                    self.drain_buffer();
                    if iter.peek() == Some(&'=') {
                        iter.next();
                        self.tokens.push(self.add_token(Token::NotEquals));
                    } else {
                        self.tokens.push(self.add_token(Token::Not));
                    }
                }

                '=' if self.code_block => {
                    self.drain_buffer();
                    if iter.peek() == Some(&'=') {
                        iter.next();
                        self.tokens.push(self.add_token(Token::Equals));
                    } else {
                        return Err(Error::Syntax(self.add_token(Token::Equals)));
                    }
                }

                '&' | '|' if self.code_block => {
                    self.drain_buffer();
                    match iter.next() {
                        Some(n) if n == c => {
                            let token = if c == '&' { Token::And } else { Token::Or };
                            self.tokens.push(self.add_token(token));
                        }
                        _ => return Err(Error::Syntax(self.add_token(Token::Text(c.into())))),
                    }
                }

                // Potentially a code block end tag.
                '%' => match iter.peek() {
                    Some('>') if self.code_block => {
                        iter.next();
                        self.drain_buffer();
                        self.tokens.push(self.add_token(Token::BlockEnd));
                        self.code_block = false;
                    }

                    // Modulus operator, e.g. `5 % 3 == 2`
                    _ if self.code_block => {
                        self.drain_buffer();
                        self.tokens.push(self.add_token(Token::Mod));
                    }

                    _ => self.buffer.push('%'),
                },

                // Maybe a string.
                '"' => {
                    if self.code_block {
                        self.drain_buffer();
                        let string = self.string(&mut iter)?;
                        self.tokens
                            .push(self.add_token(Token::Value(Value::String(string))));
                    } else {
                        // Just a double quote, e.g. `<html lang="en-US">`
                        self.buffer.push('"');
                    }
                }

                ' ' => {
                    if self.code_block {
                        // Spaces separate tokens.
                        self.separator();
                    } else {
                        // Spaces separate words.
                        self.buffer.push(' ');
                    }
                }

                '+' | '-' | '*' | '/' | '[' | ']' | ',' | '(' | ')' if self.code_block => {
                    self.drain_buffer();
                    let token = match c {
                        '+' => Token::Plus,
                        '-' => Token::Minus,
                        '*' => Token::Mult,
                        '/' => Token::Div,
                        '[' => Token::SquareBracketStart,
                        ']' => Token::SquareBracketEnd,
                        ',' => Token::Comma,
                        '(' => Token::RoundBracketStart,
                        _ => Token::RoundBracketEnd,
                    };
                    self.tokens.push(self.add_token(token));
                }

                '0'..='9' => {
                    if self.code_block && self.buffer.is_empty() {
                        self.number = true;
                    }
                    self.buffer.push(c);
                }

                c => self.buffer.push(c),
            }
        }

        if self.code_block {
            return Err(Error::Eof("code block"));
        }

        self.drain_buffer();

        Ok(self
            .tokens
            .into_iter()
            // Remove spaces from output, the lexer handled it, the parser doesn't need to.
            .filter(|token| token.token != Token::Space)
            .collect())
    }

    // Handle `<%`, `<%=`, `<%-` and `<%@`.
    fn block_start(&mut self, iter: &mut Peekable<Chars<'a>>) -> Result<(), Error> {
        self.drain_buffer();

        match iter.peek() {
            Some('=') => {
                iter.next();
                self.tokens.push(self.add_token(Token::BlockStartPrint));
                self.code_block = true;
            }

            Some('-') => {
                iter.next();
                self.tokens.push(self.add_token(Token::BlockStartPrintRaw));
                self.code_block = true;
            }

            Some('@') => {
                iter.next();
                let (line, column) = (self.line, self.column);
                let mut directive = String::new();
                let mut closed = false;

                while let Some(c) = iter.next() {
                    if c == '%' && iter.peek() == Some(&'>') {
                        iter.next();
                        closed = true;
                        break;
                    }

                    if c == '\n' {
                        self.newline();
                    }

                    directive.push(c);
                }

                if !closed {
                    return Err(Error::Eof("directive"));
                }

                self.tokens.push(TokenWithContext::new(
                    Token::Directive(directive.trim().to_string()),
                    line,
                    column,
                ));

                // Directives don't print, and neither does the line they're on.
                if iter.peek() == Some(&'\r') {
                    iter.next();
                }

                if iter.peek() == Some(&'\n') {
                    iter.next();
                    self.newline();
                }
            }

            _ => {
                self.tokens.push(self.add_token(Token::BlockStart));
                self.code_block = true;
            }
        }

        Ok(())
    }

    // Read a string literal, the opening quote has already been consumed.
    fn string(&mut self, iter: &mut Peekable<Chars<'a>>) -> Result<String, Error> {
        let mut string = String::new();

        while let Some(c) = iter.next() {
            self.column += 1;
            match c {
                '"' => return Ok(string),
                '\\' => match iter.next() {
                    Some('n') => string.push('\n'),
                    Some('t') => string.push('\t'),
                    Some(c) => string.push(c),
                    None => break,
                },
                '\n' => {
                    self.newline();
                    string.push(c);
                }
                c => string.push(c),
            }
        }

        Err(Error::Eof("string"))
    }

    fn separator(&mut self) {
        self.drain_buffer();
        self.tokens.push(self.add_token(Token::Space));
    }

    fn newline(&mut self) {
        self.line += 1;
        self.column = 0;
    }

    // Handle multi-character tokens.
    fn drain_buffer(&mut self) {
        self.number = false;

        if !self.buffer.is_empty() {
            let s = std::mem::take(&mut self.buffer);
            if self.code_block {
                let token = match s.as_str() {
                    "if" => Token::If,
                    "else" => Token::Else,
                    "elsif" => Token::ElseIf,
                    "end" => Token::End,
                    "for" => Token::For,
                    "in" => Token::In,
                    "and" => Token::And,
                    "or" => Token::Or,
                    "not" => Token::Not,
                    "true" => Token::Value(Value::Boolean(true)),
                    "false" => Token::Value(Value::Boolean(false)),
                    "null" | "nil" => Token::Value(Value::Null),
                    st => {
                        if let Ok(integer) = st.parse::<i64>() {
                            Token::Value(Value::Integer(integer))
                        } else if let Ok(float) = st.parse::<f64>() {
                            Token::Value(Value::Float(float))
                        } else {
                            Token::Variable(s)
                        }
                    }
                };
                self.tokens.push(self.add_token(token));
            } else {
                self.tokens.push(self.add_token(Token::Text(s)));
            }
        }
    }

    // Add token to output with lexer context (e.g. line number).
    fn add_token(&self, token: Token) -> TokenWithContext {
        TokenWithContext::new(token, self.line, self.column)
    }
}

/// Easily tokenize strings.
pub trait Tokenize {
    /// Parse a string and convert it to a list of tokens.
    fn tokenize(&self) -> Result<Vec<TokenWithContext>, Error>;
}

impl Tokenize for &str {
    fn tokenize(&self) -> Result<Vec<TokenWithContext>, Error> {
        Lexer::new(self).tokens()
    }
}

impl Tokenize for String {
    fn tokenize(&self) -> Result<Vec<TokenWithContext>, Error> {
        Lexer::new(self).tokens()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn tokens(source: &str) -> Result<Vec<Token>, Error> {
        Ok(source.tokenize()?.into_iter().map(|t| t.token()).collect())
    }

    #[test]
    fn test_print_block() -> Result<(), Error> {
        assert_eq!(
            tokens("Hello <%= Model.Name %>")?,
            vec![
                Token::Text("Hello ".into()),
                Token::BlockStartPrint,
                Token::Variable("Model".into()),
                Token::Dot,
                Token::Variable("Name".into()),
                Token::BlockEnd,
            ]
        );

        Ok(())
    }

    #[test]
    fn test_directive_swallows_line() -> Result<(), Error> {
        assert_eq!(
            tokens("<%@ model reports::Invoice %>\r\n<p>total</p>\n")?,
            vec![
                Token::Directive("model reports::Invoice".into()),
                Token::Text("<p>total</p>\n".into()),
            ]
        );

        Ok(())
    }

    #[test]
    fn test_operators() -> Result<(), Error> {
        assert_eq!(
            tokens("<% a<=5 && b != 2.5 %>")?,
            vec![
                Token::BlockStart,
                Token::Variable("a".into()),
                Token::LessEqualThan,
                Token::Value(Value::Integer(5)),
                Token::And,
                Token::Variable("b".into()),
                Token::NotEquals,
                Token::Value(Value::Float(2.5)),
                Token::BlockEnd,
            ]
        );

        Ok(())
    }

    #[test]
    fn test_text_keeps_newlines() -> Result<(), Error> {
        let tokens = "<p>\n<%- body %>\n</p>".tokenize()?;

        assert_eq!(tokens[0].token(), Token::Text("<p>\n".into()));
        assert_eq!(tokens[1].token(), Token::BlockStartPrintRaw);
        assert_eq!(tokens[2].line(), 2);
        assert_eq!(tokens.last().map(|t| t.token()), Some(Token::Text("\n</p>".into())));

        Ok(())
    }

    #[test]
    fn test_unclosed_block() {
        assert!("<%= name".tokenize().is_err());
        assert!(r#"<%= "name %>"#.tokenize().is_err());
    }
}
