//! Executable template.
//!
//! A program is a list of statements. Directives are kept in place so the
//! compiler can read them back, they print nothing.
use super::super::{Context, Error, TokenWithContext, Tokenize};
use super::Statement;
use serde::{Deserialize, Serialize};

use std::io::Write;

/// Executable program.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Program {
    statements: Vec<Statement>,
}

impl Program {
    /// Evaluate the program given the context. The context contains variable definitions.
    pub fn evaluate(&self, context: &Context) -> Result<String, Error> {
        let mut result = String::new();
        for statement in &self.statements {
            result.push_str(&statement.evaluate(context)?);
        }

        Ok(result)
    }

    /// Evaluate the program, writing each top-level statement to the writer
    /// as soon as it's rendered.
    pub fn evaluate_into(&self, context: &Context, writer: &mut dyn Write) -> Result<(), Error> {
        for statement in &self.statements {
            let output = statement.evaluate(context)?;
            if !output.is_empty() {
                writer.write_all(output.as_bytes())?;
            }
        }

        Ok(())
    }

    /// Parse the program from a list of tokens.
    pub fn parse(tokens: Vec<TokenWithContext>) -> Result<Self, Error> {
        let mut iter = tokens.into_iter().peekable();
        let mut statements = vec![];

        while iter.peek().is_some() {
            let statement = Statement::parse(&mut iter)?;
            statements.push(statement);
        }

        Ok(Program { statements })
    }

    /// Compile the program from source.
    pub fn from_str(source: &str) -> Result<Self, Error> {
        let tokens = source.tokenize()?;
        Program::parse(tokens)
    }

    pub fn statements(&self) -> &[Statement] {
        &self.statements
    }

    /// Directives, in the order they appear, e.g. `model reports::Invoice`.
    pub fn directives(&self) -> impl Iterator<Item = &str> {
        self.statements.iter().filter_map(|statement| match statement {
            Statement::Directive(directive) => Some(directive.as_str()),
            _ => None,
        })
    }

    /// Every global helper the program calls, with line and column.
    pub fn helper_calls(&self) -> Vec<(String, usize, usize)> {
        let mut calls = vec![];
        for statement in &self.statements {
            statement.helper_calls(&mut calls);
        }
        calls
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::template::Value;
    use std::collections::HashMap;

    #[test]
    fn test_basic_program() -> Result<(), Error> {
        let program =
            "<html><body><% if 1 == 4 %>world is great<% else %>not so much<% end %></body></html>"
                .tokenize()?;
        let program = Program::parse(program)?;
        let output = program.evaluate(&Context::default())?;
        assert_eq!("<html><body>not so much</body></html>", output);
        Ok(())
    }

    #[test]
    fn test_program_hash() -> Result<(), Error> {
        let program = Program::from_str(
            r#"<a href="/users/<%= user.id %>"><%= user.email %></a>"#,
        )?;
        let user = HashMap::from([
            (String::from("id"), Value::Integer(25)),
            (String::from("email"), Value::String("test@test.com".into())),
        ]);

        let mut context = Context::new();
        context.set("user", Value::Hash(user))?;

        assert_eq!(
            program.evaluate(&context)?,
            r#"<a href="/users/25">test@test.com</a>"#
        );

        Ok(())
    }

    #[test]
    fn test_directives() -> Result<(), Error> {
        let program = Program::from_str("<%@ model reports::Invoice %>\n<%@ import reports %>\nTotal: <%= layout(\"main\") %>")?;

        assert_eq!(
            program.directives().collect::<Vec<_>>(),
            vec!["model reports::Invoice", "import reports"]
        );
        assert_eq!(program.helper_calls()[0].0, "layout");
        assert_eq!(program.helper_calls()[0].1, 3);

        Ok(())
    }

    #[test]
    fn test_evaluate_into() -> Result<(), Error> {
        let program = Program::from_str("<% for i in 3.times %><%= i %>,<% end %>done")?;
        let mut output = vec![];
        program.evaluate_into(&Context::default(), &mut output)?;

        assert_eq!(String::from_utf8_lossy(&output), "0,1,2,done");

        Ok(())
    }
}
