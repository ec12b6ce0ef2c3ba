//! The default template compiler.
//!
//! Parses the template with the built-in template language and interprets
//! its directives:
//!
//! - `<%@ inherits stencil::TemplateBase<app::Invoice> %>` sets the base type and model type,
//! - `<%@ model app::Invoice %>` sets the model type,
//! - `<%@ import app::reports %>` adds an imported namespace.
use super::GeneratedCode;
use crate::template::{Error, Program};

/// Turns template source into a generated representation.
pub trait TemplateCompiler: Send + Sync {
    fn parse(
        &self,
        source: &str,
        imports: &[String],
        base_type: &str,
    ) -> Result<GeneratedCode, Error>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct StencilCompiler;

// `Base<Model>` or just `Base`.
fn split_generic(name: &str) -> (String, Option<String>) {
    let name = name.trim();
    match name.split_once('<') {
        Some((base, rest)) if rest.ends_with('>') => (
            base.trim().to_string(),
            Some(rest[..rest.len() - 1].trim().to_string()),
        ),
        _ => (name.to_string(), None),
    }
}

impl TemplateCompiler for StencilCompiler {
    fn parse(
        &self,
        source: &str,
        imports: &[String],
        base_type: &str,
    ) -> Result<GeneratedCode, Error> {
        let program = Program::from_str(source)?;

        let mut base_type = base_type.to_string();
        let mut model_type = None;
        let mut imports = imports.to_vec();

        for directive in program.directives() {
            let (keyword, argument) = directive
                .split_once(char::is_whitespace)
                .map(|(keyword, argument)| (keyword, argument.trim()))
                .unwrap_or((directive, ""));

            match keyword {
                "inherits" if !argument.is_empty() => {
                    let (base, model) = split_generic(argument);
                    base_type = base;
                    model_type = model;
                }
                "model" if !argument.is_empty() => model_type = Some(argument.to_string()),
                "import" | "using" if !argument.is_empty() => {
                    if !imports.iter().any(|import| import == argument) {
                        imports.push(argument.to_string());
                    }
                }
                _ => return Err(Error::UnknownDirective(directive.to_string())),
            }
        }

        Ok(GeneratedCode {
            namespace: String::new(),
            class_name: String::new(),
            base_type,
            model_type,
            imports,
            program,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_directives() -> Result<(), Error> {
        let code = StencilCompiler.parse(
            "<%@ inherits stencil::FolderTemplateBase<app::Invoice> %>\n<%@ import app::reports %>\nok",
            &["std".to_string()],
            "stencil::TemplateBase",
        )?;

        assert_eq!(code.base_type, "stencil::FolderTemplateBase");
        assert_eq!(code.model_type.as_deref(), Some("app::Invoice"));
        assert_eq!(code.imports, vec!["std", "app::reports"]);

        Ok(())
    }

    #[test]
    fn test_unknown_directive() {
        let result = StencilCompiler.parse("<%@ page title %>", &[], "stencil::TemplateBase");
        assert!(matches!(result, Err(Error::UnknownDirective(d)) if d == "page title"));
    }

    #[test]
    fn test_split_generic() {
        assert_eq!(
            split_generic("Base<app::Model>"),
            ("Base".to_string(), Some("app::Model".to_string()))
        );
        assert_eq!(split_generic("Base"), ("Base".to_string(), None));
    }
}
