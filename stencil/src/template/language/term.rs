//! Expression term, a single entity in an expression.
use super::super::{
    lexer::{Token, Value},
    Context, Error,
};
use serde::{Deserialize, Serialize};

/// Expression term.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Term {
    Constant(Value),
    Variable(String),
}

impl Term {
    /// Convert a token into a term. If the token isn't a term, return `None`.
    pub fn from_token(token: Token) -> Option<Self> {
        match token {
            Token::Variable(name) => Some(Term::Variable(name)),
            Token::Value(value) => Some(Term::Constant(value)),
            _ => None,
        }
    }

    /// Evalutate the term given the context.
    pub fn evaluate(&self, context: &Context) -> Result<Value, Error> {
        match self {
            Term::Constant(value) => Ok(value.clone()),
            Term::Variable(name) => context
                .get(name)
                .ok_or_else(|| Error::UndefinedVariable(name.clone())),
        }
    }

    /// Variable name. Constant terms don't have names.
    pub fn name(&self) -> &str {
        match self {
            Term::Variable(name) => name,
            Term::Constant(_) => "",
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::template::Lexer;

    #[test]
    fn test_terms() -> Result<(), Error> {
        let tokens = Lexer::new("<% 1.54 %>").tokens()?;
        let float = Term::from_token(tokens[1].token()).ok_or(Error::Eof("term"))?;
        assert_eq!(float.evaluate(&Context::default())?, Value::Float(1.54));

        let tokens = Lexer::new("<% variable %>").tokens()?;
        let variable = Term::from_token(tokens[1].token()).ok_or(Error::Eof("term"))?;
        assert_eq!(variable.name(), "variable");
        assert!(matches!(
            variable.evaluate(&Context::default()),
            Err(Error::UndefinedVariable(_))
        ));

        let mut context = Context::default();
        context.set("variable", "test")?;
        assert_eq!(variable.evaluate(&context)?, Value::String("test".into()));

        Ok(())
    }
}
