use super::{
    super::lexer::{Token, TokenWithContext, Tokenize, Value},
    super::Context,
    super::Error,
    Op, Term,
};
use serde::{Deserialize, Serialize};

use std::iter::{Iterator, Peekable};

/// An expression, like `5 == 6` or `Model.Name.upcase`,
/// which when evaluated produces a single value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Expression {
    // Standard `5 + 6`-style expression.
    // It's recursive, so you can have something like `(5 + 6) / (1 - 5)`.
    Binary {
        left: Box<Expression>,
        op: Op,
        right: Box<Expression>,
    },

    Unary {
        op: Op,
        operand: Box<Expression>,
    },

    // Base case for recursive expression parsing, which evaluates to the value
    // of the term, e.g. `5` evalutes to `5` or `variable_name` evalutes to whatever
    // the variable is set to in the context.
    Term {
        term: Term,
    },

    // A list of expressions, e.g.
    // `[1, 2, variable, "hello world"]`
    List {
        terms: Vec<Expression>,
    },

    // Call a method or read a member of a value, e.g. `Model.Name` or `list[0]`.
    Function {
        term: Box<Expression>,
        name: Box<Expression>,
        args: Vec<Expression>,
    },

    // Call a global helper, e.g. `render_partial("footer")`.
    Helper {
        name: String,
        args: Vec<Expression>,
        line: usize,
        column: usize,
    },
}

impl Expression {
    /// Create new constant expression (term).
    pub fn constant(value: Value) -> Self {
        Self::Term {
            term: Term::Constant(value),
        }
    }

    /// Create new variable expression (term).
    pub fn variable(variable: String) -> Self {
        Self::Term {
            term: Term::Variable(variable),
        }
    }

    /// Evaluate the expression to a value given the context.
    pub fn evaluate(&self, context: &Context) -> Result<Value, Error> {
        match self {
            Expression::Term { term } => term.evaluate(context),

            Expression::Binary { left, op, right } => {
                let left = left.evaluate(context)?;
                let right = right.evaluate(context)?;
                op.evaluate_binary(&left, &right)
            }

            Expression::Unary { op, operand } => {
                let operand = operand.evaluate(context)?;
                op.evaluate_unary(&operand)
            }

            Expression::List { terms } => {
                let mut list = vec![];
                for term in terms {
                    list.push(term.evaluate(context)?);
                }
                Ok(Value::List(list))
            }

            Expression::Function { term, name, args } => {
                let value = term.evaluate(context)?;
                let name = match name.evaluate(context)? {
                    Value::String(name) => name,
                    Value::Integer(index) => index.to_string(),
                    name => return Err(Error::NotIterable(name.to_string())),
                };

                let args = args
                    .iter()
                    .map(|arg| arg.evaluate(context))
                    .collect::<Result<Vec<Value>, Error>>()?;

                value.call(&name, &args)
            }

            Expression::Helper { name, args, .. } => {
                // `default` is there to replace undefined variables,
                // so it's allowed to receive them.
                let allow_undefined = name == "default";

                let args = args
                    .iter()
                    .map(|arg| match arg.evaluate(context) {
                        Err(Error::UndefinedVariable(_)) if allow_undefined => Ok(Value::Null),
                        result => result,
                    })
                    .collect::<Result<Vec<Value>, Error>>()?;

                context.helper(name, &args)
            }
        }
    }

    /// Collect every global helper call with its position in the source.
    pub fn helper_calls(&self, calls: &mut Vec<(String, usize, usize)>) {
        match self {
            Expression::Term { .. } => (),
            Expression::Binary { left, right, .. } => {
                left.helper_calls(calls);
                right.helper_calls(calls);
            }
            Expression::Unary { operand, .. } => operand.helper_calls(calls),
            Expression::List { terms } => terms.iter().for_each(|t| t.helper_calls(calls)),
            Expression::Function { term, name, args } => {
                term.helper_calls(calls);
                name.helper_calls(calls);
                args.iter().for_each(|arg| arg.helper_calls(calls));
            }
            Expression::Helper {
                name,
                args,
                line,
                column,
            } => {
                calls.push((name.clone(), *line, *column));
                args.iter().for_each(|arg| arg.helper_calls(calls));
            }
        }
    }

    fn term(iter: &mut Peekable<impl Iterator<Item = TokenWithContext>>) -> Result<Self, Error> {
        let next = iter.next().ok_or(Error::Eof("term next"))?;
        let term = match next.token() {
            Token::Not => Expression::Unary {
                op: Op::Not,
                operand: Box::new(Self::term(iter)?),
            },

            Token::Minus => Expression::Unary {
                op: Op::Sub,
                operand: Box::new(Self::term(iter)?),
            },

            Token::Plus => Expression::Unary {
                op: Op::Add,
                operand: Box::new(Self::term(iter)?),
            },

            Token::RoundBracketStart => {
                let expr = Self::parse(iter)?;
                let close = iter.next().ok_or(Error::Eof("round bracket end"))?;
                if close.token() != Token::RoundBracketEnd {
                    return Err(Error::WrongToken(close, Token::RoundBracketEnd));
                }

                Self::accessor(expr, iter)?
            }

            token => {
                let expr = match token {
                    Token::Variable(name) => match iter.peek().map(|t| t.token()) {
                        Some(Token::RoundBracketStart) => {
                            let _ = iter.next();
                            Expression::Helper {
                                name,
                                args: Self::arguments(iter)?,
                                line: next.line(),
                                column: next.column(),
                            }
                        }

                        _ => Self::variable(name),
                    },

                    Token::Value(value) => Self::constant(value),

                    Token::SquareBracketStart => {
                        let mut terms = vec![];

                        if iter.peek().map(|t| t.token()) == Some(Token::SquareBracketEnd) {
                            let _ = iter.next();
                        } else {
                            loop {
                                terms.push(Self::parse(iter)?);
                                let next = iter.next().ok_or(Error::Eof("list"))?;
                                match next.token() {
                                    Token::SquareBracketEnd => break,
                                    Token::Comma => continue,
                                    _ => return Err(Error::ExpressionSyntax(next)),
                                }
                            }
                        }

                        Expression::List { terms }
                    }

                    _ => return Err(Error::ExpressionSyntax(next)),
                };

                Self::accessor(expr, iter)?
            }
        };

        Ok(term)
    }

    // Arguments of a call, e.g. `("footer", Model.Address)`.
    // The opening bracket has already been consumed.
    fn arguments(
        iter: &mut Peekable<impl Iterator<Item = TokenWithContext>>,
    ) -> Result<Vec<Self>, Error> {
        let mut args = vec![];

        if iter.peek().map(|t| t.token()) == Some(Token::RoundBracketEnd) {
            let _ = iter.next();
            return Ok(args);
        }

        loop {
            args.push(Self::parse(iter)?);

            let next = iter.next().ok_or(Error::Eof("function arguments"))?;
            match next.token() {
                Token::RoundBracketEnd => return Ok(args),
                Token::Comma => continue,
                _ => return Err(Error::ExpressionSyntax(next)),
            }
        }
    }

    fn accessor(
        mut expr: Self,
        iter: &mut Peekable<impl Iterator<Item = TokenWithContext>>,
    ) -> Result<Self, Error> {
        loop {
            let accessor = iter.peek().map(|t| t.token());

            expr = match accessor {
                Some(Token::Dot) => {
                    let _ = iter.next();
                    let name = iter.next().ok_or(Error::Eof("accessor name"))?;
                    let method = match name.token() {
                        Token::Variable(name) => name,
                        Token::Value(Value::Integer(n)) => n.to_string(),
                        _ => return Err(Error::ExpressionSyntax(name)),
                    };

                    let args = match iter.peek().map(|t| t.token()) {
                        Some(Token::RoundBracketStart) => {
                            let _ = iter.next();
                            Self::arguments(iter)?
                        }
                        _ => vec![],
                    };

                    Expression::Function {
                        term: Box::new(expr),
                        name: Box::new(Expression::constant(Value::String(method))),
                        args,
                    }
                }

                Some(Token::SquareBracketStart) => {
                    let _ = iter.next();
                    let name = Self::parse(iter)?;
                    let next = iter.next().ok_or(Error::Eof("expected closing bracket"))?;
                    if next.token() != Token::SquareBracketEnd {
                        return Err(Error::WrongToken(next, Token::SquareBracketEnd));
                    }

                    Expression::Function {
                        term: Box::new(expr),
                        name: Box::new(name),
                        args: vec![],
                    }
                }

                Some(_) | None => return Ok(expr),
            };
        }
    }

    // Precedence climbing: only operators binding tighter than `limit`
    // are folded into this expression.
    fn binary(
        iter: &mut Peekable<impl Iterator<Item = TokenWithContext>>,
        limit: u8,
    ) -> Result<Self, Error> {
        let mut left = Self::term(iter)?;

        loop {
            let op = match iter.peek().and_then(|t| Op::from_token(t.token())) {
                Some(op) if op.binary() && op.precedence() < limit => op,
                _ => return Ok(left),
            };

            let _ = iter.next();
            let right = Self::binary(iter, op.precedence())?;

            left = Expression::Binary {
                left: Box::new(left),
                op,
                right: Box::new(right),
            };
        }
    }

    /// Recursively parse the expression.
    ///
    /// Consumes language tokens automatically.
    pub fn parse(
        iter: &mut Peekable<impl Iterator<Item = TokenWithContext>>,
    ) -> Result<Self, Error> {
        Self::binary(iter, u8::MAX)
    }
}

pub trait Evaluate {
    fn evaluate(&self, context: &Context) -> Result<Value, Error>;
    fn evaluate_default(&self) -> Result<Value, Error> {
        self.evaluate(&Context::default())
    }
}

impl Evaluate for &str {
    fn evaluate(&self, context: &Context) -> Result<Value, Error> {
        let tokens = self.tokenize()?;
        // Skip code block start.
        let expr = Expression::parse(&mut tokens.into_iter().skip(1).peekable())?;
        expr.evaluate(context)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::model::Model;
    use serde_json::json;
    use std::collections::HashMap;

    #[test]
    fn test_if_const() -> Result<(), Error> {
        assert_eq!(r#"<% 1 == 2 %>"#.evaluate_default()?, Value::Boolean(false));
        assert_eq!(r#"<% 1 == 1 %>"#.evaluate_default()?, Value::Boolean(true));

        Ok(())
    }

    #[test]
    fn test_list() -> Result<(), Error> {
        let mut context = Context::default();
        context.set("variable", "world")?;
        context.set("list", vec![1, 2, 3])?;

        let t1 = r#"<% [1, 2, "hello", 3.13, variable] %>"#.evaluate(&context)?;
        assert_eq!(
            t1,
            Value::List(vec![
                Value::Integer(1),
                Value::Integer(2),
                Value::String("hello".into()),
                Value::Float(3.13),
                Value::String("world".into()),
            ])
        );

        assert_eq!("<% [1, 2, 3].0 %>".evaluate_default()?, Value::Integer(1));
        assert_eq!(r#"<% list.2 %>"#.evaluate(&context)?, Value::Integer(3));
        assert_eq!(r#"<% list.len %>"#.evaluate(&context)?, Value::Integer(3));
        assert_eq!("<% [] %>".evaluate_default()?, Value::List(vec![]));

        Ok(())
    }

    #[test]
    fn test_hash() -> Result<(), Error> {
        let mut context = Context::default();
        context.set(
            "hash",
            Value::Hash(HashMap::from([("key".to_string(), Value::Integer(5))])),
        )?;
        context.set("name", Value::String("key".into()))?;

        let t1 = "<% (hash.key * 2.5) - 2.5 %>".evaluate(&context)?;
        assert_eq!(t1, Value::Float(10.0));

        let t1 = "<% hash[name] %>".evaluate(&context)?;
        assert_eq!(t1, Value::Integer(5));

        Ok(())
    }

    #[test]
    fn test_call() -> Result<(), Error> {
        assert_eq!(
            "<% 54.5.to_string %>".evaluate_default()?,
            Value::String("54.5".into())
        );
        assert_eq!(
            r#"<% ("one" + "two" + "three").upcase %>"#.evaluate_default()?,
            Value::String("ONETWOTHREE".into())
        );
        assert_eq!(
            r#"<% " one".upcase.trim %>"#.evaluate_default()?,
            Value::String("ONE".into())
        );
        assert_eq!(
            r#"<% ["a", "b"].join(", ") %>"#.evaluate_default()?,
            Value::String("a, b".into())
        );

        Ok(())
    }

    #[test]
    fn test_precedence() -> Result<(), Error> {
        assert_eq!("<% 2 * 2 + 3 * 5 %>".evaluate_default()?, Value::Integer(19));
        assert_eq!("<% 1 * 2 + 3 == 5 %>".evaluate_default()?, Value::Boolean(true));
        assert_eq!("<% 10 - 2 - 3 %>".evaluate_default()?, Value::Integer(5));
        assert_eq!("<% 7 % 4 %>".evaluate_default()?, Value::Integer(3));
        assert_eq!(
            "<% (1 + 5) * 0.25 %>".evaluate_default()?,
            Value::Float(1.5)
        );
        assert_eq!(
            "<% ((1 + 2) + (-1 - -1)) * 5 + (25 - 5) %>".evaluate_default()?,
            Value::Integer(35)
        );

        Ok(())
    }

    #[test]
    fn test_unary() -> Result<(), Error> {
        assert_eq!(
            "<% !false == true && true %>".evaluate_default()?,
            Value::Boolean(true)
        );

        let mut context = Context::default();
        context.set("variable", 5)?;
        assert_eq!(
            "<% -variable * 1.5 %>".evaluate(&context)?,
            Value::Float(-7.5)
        );

        Ok(())
    }

    #[test]
    fn test_default() -> Result<(), Error> {
        let v = r#"<% default(some_var, "val") %>"#.evaluate_default()?;
        assert_eq!(v, Value::String("val".into()));

        let mut context = Context::default();
        context.set("var", "set")?;
        let v = r#"<% default(var, "val") %>"#.evaluate(&context)?;
        assert_eq!(v, Value::String("set".into()));

        Ok(())
    }

    #[test]
    fn test_model_member() -> Result<(), Error> {
        let model = Model::anonymous(json!({"Name": "Joe Doe", "Address": {"City": "Paia"}}));
        let mut context = Context::default();
        context.set("Model", model.to_value())?;

        assert_eq!(
            "<% Model.Name %>".evaluate(&context)?,
            Value::String("Joe Doe".into())
        );
        assert_eq!(
            "<% Model.Address.City.upcase %>".evaluate(&context)?,
            Value::String("PAIA".into())
        );
        assert!(matches!(
            "<% Model.Missing %>".evaluate(&context),
            Err(Error::UnknownMember(_, _))
        ));

        Ok(())
    }

    #[test]
    fn test_helper_positions() -> Result<(), Error> {
        let tokens = r#"<% layout("main.html") + render_body() %>"#.tokenize()?;
        let expr = Expression::parse(&mut tokens.into_iter().skip(1).peekable())?;
        let mut calls = vec![];
        expr.helper_calls(&mut calls);

        let names = calls.iter().map(|c| c.0.as_str()).collect::<Vec<_>>();
        assert_eq!(names, vec!["layout", "render_body"]);
        assert_eq!(calls[0].1, 1);

        Ok(())
    }
}
