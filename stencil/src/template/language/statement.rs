use super::{
    super::{Context, Error, Token, TokenWithContext, Tokenize, Value},
    Expression,
};
use serde::{Deserialize, Serialize};

use std::iter::{Iterator, Peekable};

macro_rules! expect {
    ($got:expr, $expected:expr) => {
        if $got.token() != $expected {
            return Err(Error::WrongToken($got, $expected));
        }
    };
}

macro_rules! block_end {
    ($iter:expr) => {
        let token = $iter.next().ok_or(Error::Eof("block end"))?;
        expect!(token, Token::BlockEnd);
    };
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Statement {
    // e.g. `<%= variable %>`, HTML-encoded.
    Print(Expression),
    // e.g. `<%- render_body() %>`, printed as-is.
    PrintRaw(Expression),
    // e.g. `<html><body></body></html>`
    PrintText(String),
    // e.g. `<% layout("layout.html") %>`, the result is discarded.
    Evaluate(Expression),
    // e.g. `<%@ import reports %>`
    Directive(String),
    // e.g. `<% if variable == 5 %>right<% else %>wrong<% end %>`
    If {
        expression: Expression,
        if_body: Vec<Statement>,
        else_body: Vec<Statement>,
        else_if: bool,
    },

    // `<% else %>`
    Else,
    // `<% end %>
    End,

    // `<% for var in [1, 2, 3] %> <%= var %> <% end %>`
    For {
        variable: String,
        list: Expression,
        body: Vec<Statement>,
    },
}

impl Statement {
    pub fn from_str(string: &str) -> Result<Self, Error> {
        let tokens = string.tokenize()?;
        Statement::parse(&mut tokens.into_iter().peekable())
    }

    pub fn evaluate(&self, context: &Context) -> Result<String, Error> {
        match self {
            Statement::PrintText(text) => Ok(text.clone()),
            Statement::Print(expression) => {
                Ok(crate::html_encode(&expression.evaluate(context)?.to_string()))
            }
            Statement::PrintRaw(expression) => Ok(expression.evaluate(context)?.to_string()),
            Statement::Evaluate(expression) => {
                expression.evaluate(context)?;
                Ok(String::new())
            }
            Statement::Directive(_) | Statement::Else | Statement::End => Ok(String::new()),
            Statement::If {
                expression,
                if_body,
                else_body,
                ..
            } => {
                let body = if expression.evaluate(context)?.truthy() {
                    if_body
                } else {
                    else_body
                };

                let mut result = String::new();
                for statement in body {
                    result.push_str(&statement.evaluate(context)?);
                }

                Ok(result)
            }
            Statement::For {
                variable,
                list,
                body,
            } => {
                let mut result = String::new();
                let values = match list.evaluate(context)? {
                    Value::List(values) => values,
                    hash @ Value::Hash(_) => hash.call("iter", &[])?.to_vec(),
                    Value::Null => vec![],
                    value => return Err(Error::NotIterable(value.to_string())),
                };

                let mut for_context = context.clone();
                for value in values {
                    for_context.set(variable, value)?;

                    for statement in body {
                        result.push_str(&statement.evaluate(&for_context)?);
                    }
                }

                Ok(result)
            }
        }
    }

    /// Collect every global helper call made by this statement and its children.
    pub fn helper_calls(&self, calls: &mut Vec<(String, usize, usize)>) {
        match self {
            Statement::Print(expression)
            | Statement::PrintRaw(expression)
            | Statement::Evaluate(expression) => expression.helper_calls(calls),
            Statement::If {
                expression,
                if_body,
                else_body,
                ..
            } => {
                expression.helper_calls(calls);
                if_body.iter().for_each(|s| s.helper_calls(calls));
                else_body.iter().for_each(|s| s.helper_calls(calls));
            }
            Statement::For { list, body, .. } => {
                list.helper_calls(calls);
                body.iter().for_each(|s| s.helper_calls(calls));
            }
            _ => (),
        }
    }

    pub fn parse(
        iter: &mut Peekable<impl Iterator<Item = TokenWithContext>>,
    ) -> Result<Statement, Error> {
        loop {
            let next = iter.next().ok_or(Error::Eof("statement"))?;
            match next.token() {
                Token::End => {
                    block_end!(iter);
                    return Ok(Statement::End);
                }
                Token::Text(string) => return Ok(Statement::PrintText(string)),
                Token::Directive(directive) => return Ok(Statement::Directive(directive)),
                Token::BlockEnd => (),
                Token::BlockStart => {
                    // Control flow keywords are handled on the next iteration,
                    // anything else is an expression evaluated for its side effects.
                    match iter.peek().map(|t| t.token()) {
                        Some(token) if token.is_keyword() || token == Token::BlockEnd => (),
                        Some(_) => {
                            let expression = Expression::parse(iter)?;
                            block_end!(iter);
                            return Ok(Statement::Evaluate(expression));
                        }
                        None => return Err(Error::Eof("code block")),
                    }
                }
                Token::BlockStartPrint => {
                    let expression = Expression::parse(iter)?;
                    block_end!(iter);
                    return Ok(Statement::Print(expression));
                }
                Token::BlockStartPrintRaw => {
                    let expression = Expression::parse(iter)?;
                    block_end!(iter);
                    return Ok(Statement::PrintRaw(expression));
                }
                Token::Else => {
                    block_end!(iter);
                    return Ok(Statement::Else);
                }
                Token::If | Token::ElseIf => {
                    let else_if = next.token() == Token::ElseIf;
                    let (mut if_body, mut else_body) = (vec![], vec![]);
                    let expression = Expression::parse(iter)?;

                    loop {
                        let statement = Statement::parse(iter)?;
                        match statement {
                            Statement::End => {
                                return Ok(Statement::If {
                                    expression,
                                    if_body,
                                    else_body,
                                    else_if,
                                })
                            }

                            // if
                            // elsif
                            // else
                            // end
                            //
                            // translates into this:
                            //
                            // if
                            // else
                            //   if
                            //   else
                            //   end
                            // end
                            Statement::If { else_if: true, .. } => {
                                else_body.push(statement);
                                return Ok(Statement::If {
                                    expression,
                                    if_body,
                                    else_body,
                                    else_if,
                                });
                            }

                            Statement::Else => loop {
                                let statement = Statement::parse(iter)?;

                                match statement {
                                    Statement::End => {
                                        return Ok(Statement::If {
                                            expression,
                                            if_body,
                                            else_body,
                                            else_if,
                                        })
                                    }
                                    statement => else_body.push(statement),
                                }
                            },
                            statement => if_body.push(statement),
                        }
                    }
                }

                Token::For => {
                    let variable = iter.next().ok_or(Error::Eof("for loop variable"))?;
                    let variable = match variable.token() {
                        Token::Variable(name) => name,
                        _ => return Err(Error::Syntax(variable)),
                    };

                    let in_ = iter.next().ok_or(Error::Eof("for loop"))?;
                    expect!(in_, Token::In);

                    let list = Expression::parse(iter)?;
                    block_end!(iter);

                    let mut body = vec![];

                    loop {
                        match Statement::parse(iter)? {
                            Statement::End => break,
                            statement => body.push(statement),
                        }
                    }

                    return Ok(Statement::For {
                        variable,
                        list,
                        body,
                    });
                }
                _ => return Err(Error::Syntax(next)),
            }
        }
    }
}

impl Value {
    fn to_vec(self) -> Vec<Value> {
        match self {
            Value::List(list) => list,
            value => vec![value],
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_statements_basic() -> Result<(), Error> {
        let ast = Statement::from_str(r#"<% if variable == 5 %>right<% else %>wrong<% end %>"#)?;
        let mut context = Context::default();
        context.set("variable", Value::Integer(5))?;

        assert_eq!(ast.evaluate(&context)?, "right");

        Ok(())
    }

    #[test]
    fn test_statements_if_else() -> Result<(), Error> {
        let ast = Statement::from_str(
            "<% if variable == 5 %>
                right
            <% elsif variable == 6 %>
                wrong
            <% else %>
                neither
            <% end %>",
        )?;
        let mut context = Context::default();
        context.set("variable", Value::Integer(7))?;

        assert_eq!(ast.evaluate(&context)?.trim(), "neither");

        context.set("variable", Value::Integer(6))?;
        assert_eq!(ast.evaluate(&context)?.trim(), "wrong");

        Ok(())
    }

    #[test]
    fn test_print_expression() -> Result<(), Error> {
        let mut context = Context::default();
        context.set("variable", "<b>bold</b>")?;

        let escaped = Statement::from_str("<%= variable %>")?.evaluate(&context)?;
        assert_eq!(escaped, "&lt;b&gt;bold&lt;/b&gt;");

        let raw = Statement::from_str("<%- variable %>")?.evaluate(&context)?;
        assert_eq!(raw, "<b>bold</b>");

        Ok(())
    }

    #[test]
    fn test_for_loop() -> Result<(), Error> {
        let mut context = Context::default();
        context.set("variable", Value::String("variable value".into()))?;
        let result = Statement::from_str(
            r#"<% for a in [1, "hello", 3.45, variable] %><li><%= a %></li><% end %>"#,
        )?
        .evaluate(&context)?;

        assert_eq!(
            result,
            "<li>1</li><li>hello</li><li>3.45</li><li>variable value</li>"
        );

        let result = Statement::from_str(
            "<% for v in [1, 2, 3].enumerate %><p><%= v.0 + 1 %>. <%= v.1 %></p><% end %>",
        )?
        .evaluate(&Context::default())?;

        assert_eq!(result, "<p>1. 1</p><p>2. 2</p><p>3. 3</p>");

        Ok(())
    }

    #[test]
    fn test_evaluate_block() -> Result<(), Error> {
        let statement = Statement::from_str(r#"<% default(1, 2) %>"#)?;

        assert!(matches!(statement, Statement::Evaluate(_)));
        assert_eq!(statement.evaluate(&Context::default())?, "");

        Ok(())
    }
}
