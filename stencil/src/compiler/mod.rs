//! Compilation pipeline.
//!
//! Source text goes through the model declaration rewrite, the template
//! compiler and the code generation backend, in that order. The generated
//! source listing is captured whenever one was produced, so it can be
//! attached to diagnostics. The pipeline doesn't cache; every call compiles.
use crate::colors::MaybeColorize;
use crate::template::Program;
use crate::unit::{unique_id, TemplateUnit};
use crate::Error;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use std::time::Instant;

pub mod backend;
pub mod parser;
pub mod rewrite;

pub use backend::{BuildOptions, CodeBackend, Diagnostic, ModuleBackend};
pub use parser::{StencilCompiler, TemplateCompiler};
pub use rewrite::{declares_model, rewrite_model_declaration};

/// The contract a compiled template implements. Decides which helpers
/// the template can call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BaseContract {
    /// Templates rendered from strings and readers.
    #[default]
    Template,
    /// Templates rendered from a folder, with layouts and partials.
    FolderTemplate,
}

impl BaseContract {
    pub fn name(&self) -> &'static str {
        match self {
            BaseContract::Template => "stencil::TemplateBase",
            BaseContract::FolderTemplate => "stencil::FolderTemplateBase",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim() {
            "stencil::TemplateBase" | "TemplateBase" => Some(BaseContract::Template),
            "stencil::FolderTemplateBase" | "FolderTemplateBase" => {
                Some(BaseContract::FolderTemplate)
            }
            _ => None,
        }
    }

    /// Global helpers available to templates implementing this contract.
    pub fn helpers(&self) -> &'static [&'static str] {
        match self {
            BaseContract::Template => &["default", "html_encode", "render_template"],
            BaseContract::FolderTemplate => &[
                "default",
                "html_encode",
                "render_template",
                "layout",
                "render_body",
                "render_partial",
            ],
        }
    }

    /// Can an engine providing this contract run a template built against `other`?
    pub fn accepts(&self, other: BaseContract) -> bool {
        *self == other || (*self == BaseContract::FolderTemplate && other == BaseContract::Template)
    }
}

/// Where the compiled entry type lives and what it implements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitDescriptor {
    pub namespace: String,
    pub class_name: String,
    pub imports: Vec<String>,
    pub base_contract: BaseContract,
    pub model_type: Option<String>,
}

impl UnitDescriptor {
    /// Descriptor with a generated class name.
    pub fn new(namespace: impl ToString, base_contract: BaseContract) -> Self {
        Self {
            namespace: namespace.to_string(),
            class_name: unique_id(),
            imports: vec![],
            base_contract,
            model_type: None,
        }
    }

    /// Use this class name instead, made into a valid identifier.
    pub fn class_name(mut self, class_name: &str) -> Self {
        let mut name: String = class_name
            .trim()
            .chars()
            .map(|c| if c.is_alphanumeric() || c == '_' { c } else { '_' })
            .collect();

        if name.is_empty() || name.starts_with(|c: char| c.is_ascii_digit()) {
            name.insert(0, '_');
        }

        self.class_name = name;
        self
    }

    pub fn model_type(mut self, model_type: Option<&str>) -> Self {
        self.model_type = model_type.map(|t| t.to_string());
        self
    }
}

/// Output of the template compiler.
#[derive(Debug, Clone)]
pub struct GeneratedCode {
    pub namespace: String,
    pub class_name: String,
    pub base_type: String,
    pub model_type: Option<String>,
    pub imports: Vec<String>,
    pub program: Program,
}

/// A failed compile, with the generated source if there was one.
#[derive(Debug, Clone)]
pub struct CompileFailure {
    pub error: Error,
    pub generated_source: Option<String>,
}

impl From<Error> for CompileFailure {
    fn from(error: Error) -> Self {
        Self {
            error,
            generated_source: None,
        }
    }
}

/// Drives the template compiler and the backend.
pub struct Pipeline {
    compiler: Box<dyn TemplateCompiler>,
    backend: Box<dyn CodeBackend>,
    namespaces: Vec<String>,
    references: Vec<String>,
    options: BuildOptions,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("namespaces", &self.namespaces)
            .field("references", &self.references)
            .field("options", &self.options)
            .finish()
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new(Box::new(StencilCompiler), Box::new(ModuleBackend))
    }
}

impl Pipeline {
    pub fn new(compiler: Box<dyn TemplateCompiler>, backend: Box<dyn CodeBackend>) -> Self {
        Self {
            compiler,
            backend,
            namespaces: vec![],
            references: vec![],
            options: BuildOptions {
                in_memory: true,
                output_path: None,
            },
        }
    }

    pub fn options(mut self, options: BuildOptions) -> Self {
        self.options = options;
        self
    }

    pub fn add_namespace(&mut self, namespace: &str) {
        if !self.namespaces.iter().any(|n| n == namespace) {
            self.namespaces.push(namespace.to_string());
        }
    }

    pub fn add_reference(&mut self, module: &str) {
        if !self.references.iter().any(|r| r == module) {
            self.references.push(module.to_string());
        }
    }

    pub fn namespaces(&self) -> &[String] {
        &self.namespaces
    }

    pub fn references(&self) -> &[String] {
        &self.references
    }

    /// Compile the template source into a unit.
    pub fn compile(
        &self,
        source: &str,
        descriptor: &UnitDescriptor,
    ) -> Result<TemplateUnit, CompileFailure> {
        let start = Instant::now();

        if source.trim().is_empty() {
            return Err(Error::Parse("template source is empty".into()).into());
        }

        let base_type = descriptor.base_contract.name();
        let source =
            rewrite_model_declaration(source, base_type, descriptor.model_type.as_deref());

        let mut imports = self.namespaces.clone();
        for import in &descriptor.imports {
            if !imports.contains(import) {
                imports.push(import.clone());
            }
        }

        let mut code = self
            .compiler
            .parse(&source, &imports, base_type)
            .map_err(|err| Error::Parse(err.pretty(&source, None::<&str>).to_string()))?;
        code.namespace = descriptor.namespace.clone();
        code.class_name = descriptor.class_name.clone();

        let generated_source = self.backend.emit_source(&code);

        match self
            .backend
            .compile(&code, &generated_source, &self.references, &self.options)
        {
            Ok(module) => {
                info!(
                    "compiled {}::{} into {} ({:.3} ms)",
                    code.namespace,
                    code.class_name,
                    module.id.purple(),
                    start.elapsed().as_secs_f64() * 1000.0
                );

                Ok(TemplateUnit::new(module, generated_source))
            }

            Err(diagnostics) => {
                let message = diagnostics
                    .iter()
                    .map(|d| d.to_string())
                    .collect::<Vec<_>>()
                    .join("\n");

                warn!("{}::{} failed to build", code.namespace, code.class_name);

                Err(CompileFailure {
                    error: Error::Build(message),
                    generated_source: Some(generated_source),
                })
            }
        }
    }
}
