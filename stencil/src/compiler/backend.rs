//! Code generation backend.
//!
//! Turns the generated representation into a loadable [`Module`], or a list
//! of diagnostics explaining why it can't.
use super::{BaseContract, GeneratedCode};
use crate::unit::{unique_id, EntryType, Module};

use std::path::PathBuf;

/// One problem found while building a module.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub line: usize,
    pub column: usize,
    pub message: String,
}

impl Diagnostic {
    pub fn new(line: usize, column: usize, message: impl ToString) -> Self {
        Self {
            line,
            column,
            message: message.to_string(),
        }
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "line {}, column {}: {}", self.line, self.column, self.message)
    }
}

#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    /// Keep the module in memory only.
    pub in_memory: bool,
    /// Directory for module images when not building in memory.
    pub output_path: Option<PathBuf>,
}

pub trait CodeBackend: Send + Sync {
    /// Human-readable listing of the generated code, kept for diagnostics.
    fn emit_source(&self, code: &GeneratedCode) -> String;

    /// Build a loadable module.
    fn compile(
        &self,
        code: &GeneratedCode,
        source: &str,
        references: &[String],
        options: &BuildOptions,
    ) -> Result<Module, Vec<Diagnostic>>;
}

/// Builds modules that hold the parsed program.
#[derive(Debug, Default, Clone, Copy)]
pub struct ModuleBackend;

impl ModuleBackend {
    fn check(&self, code: &GeneratedCode, references: &[String]) -> Vec<Diagnostic> {
        let mut diagnostics = vec![];

        let contract = match BaseContract::from_name(&code.base_type) {
            Some(contract) => Some(contract),
            None => {
                diagnostics.push(Diagnostic::new(
                    1,
                    1,
                    format!("base type \"{}\" could not be found", code.base_type),
                ));
                None
            }
        };

        if let Some(model_type) = &code.model_type {
            if let Some(module) = crate::model::module_of(model_type) {
                let known = references
                    .iter()
                    .chain(code.imports.iter())
                    .any(|reference| {
                        module == *reference || module.starts_with(&format!("{}::", reference))
                    });

                if !known {
                    diagnostics.push(Diagnostic::new(
                        1,
                        1,
                        format!(
                            "model type \"{}\" could not be found, is module \"{}\" referenced?",
                            model_type, module
                        ),
                    ));
                }
            }
        }

        if let Some(contract) = contract {
            for (helper, line, column) in code.program.helper_calls() {
                if !contract.helpers().contains(&helper.as_str()) {
                    diagnostics.push(Diagnostic::new(
                        line,
                        column,
                        format!(
                            "\"{}\" does not contain a definition for \"{}\"",
                            contract.name(),
                            helper
                        ),
                    ));
                }
            }
        }

        diagnostics
    }
}

impl CodeBackend for ModuleBackend {
    fn emit_source(&self, code: &GeneratedCode) -> String {
        let mut source = format!("// namespace {}\n", code.namespace);

        for import in &code.imports {
            source.push_str(&format!("use {};\n", import));
        }

        let base = match &code.model_type {
            Some(model_type) => format!("{}<{}>", code.base_type, model_type),
            None => code.base_type.clone(),
        };

        source.push_str(&format!(
            "\nstruct {} : {}\n\n{:#?}\n",
            code.class_name,
            base,
            code.program.statements()
        ));

        source
    }

    fn compile(
        &self,
        code: &GeneratedCode,
        _source: &str,
        references: &[String],
        options: &BuildOptions,
    ) -> Result<Module, Vec<Diagnostic>> {
        let diagnostics = self.check(code, references);
        if !diagnostics.is_empty() {
            return Err(diagnostics);
        }

        let module = Module::new(
            unique_id(),
            vec![EntryType {
                namespace: code.namespace.clone(),
                name: code.class_name.clone(),
                base_type: code.base_type.clone(),
                model_type: code.model_type.clone(),
                imports: code.imports.clone(),
                program: code.program.clone(),
            }],
        );

        if options.in_memory {
            return Ok(module);
        }

        let directory = options
            .output_path
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("stencil"));

        module
            .persist(&directory)
            .and_then(Module::load)
            .map_err(|err| vec![Diagnostic::new(0, 0, err)])
    }
}

#[cfg(test)]
mod test {
    use super::super::parser::{StencilCompiler, TemplateCompiler};
    use super::*;
    use tempdir::TempDir;

    fn generated(source: &str) -> GeneratedCode {
        let mut code = StencilCompiler
            .parse(source, &[], BaseContract::Template.name())
            .unwrap();
        code.namespace = "__stencil".into();
        code.class_name = "_page".into();
        code
    }

    #[test]
    fn test_unknown_helper() {
        let code = generated("<%= 1 %>\n  <%= render_partial(\"x\") %>");
        let diagnostics = ModuleBackend
            .compile(&code, "", &[], &BuildOptions::default())
            .unwrap_err();

        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].line, 2);
        assert!(diagnostics[0].message.contains("render_partial"));
    }

    #[test]
    fn test_model_reference() {
        let code = generated("<%@ model app::reports::Invoice %>");
        let options = BuildOptions {
            in_memory: true,
            output_path: None,
        };

        assert!(ModuleBackend.compile(&code, "", &[], &options).is_err());
        assert!(ModuleBackend
            .compile(&code, "", &["app".to_string()], &options)
            .is_ok());
        assert!(ModuleBackend
            .compile(&code, "", &["app::reports".to_string()], &options)
            .is_ok());
    }

    #[test]
    fn test_module_on_disk() {
        let dir = TempDir::new("stencil-backend").unwrap();
        let code = generated("Hello");
        let options = BuildOptions {
            in_memory: false,
            output_path: Some(dir.path().to_owned()),
        };

        let module = ModuleBackend.compile(&code, "", &[], &options).unwrap();
        let path = module.path.clone().unwrap();

        assert!(path.starts_with(dir.path()));
        assert!(path.exists());
        assert_eq!(module.entry(None).unwrap().full_name(), "__stencil::_page");
    }

    #[test]
    fn test_emit_source() {
        let source = ModuleBackend.emit_source(&generated("<%@ import app %>Hi"));

        assert!(source.starts_with("// namespace __stencil\nuse app;\n"));
        assert!(source.contains("struct _page : stencil::TemplateBase"));
        assert!(source.contains("PrintText"));
    }
}
