//! Model declaration rewrite.
//!
//! `<%@ model app::Invoice %>` is shorthand for
//! `<%@ inherits stencil::TemplateBase<app::Invoice> %>`. The rewrite is textual
//! and happens before the template compiler sees the source, so the compiled
//! type specializes on the model type.
use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use std::borrow::Cow;

static MODEL: Lazy<Regex> = Lazy::new(|| Regex::new(r"<%@\s*model\s+([^%]+?)\s*%>").unwrap());
static INHERITS: Lazy<Regex> = Lazy::new(|| Regex::new(r"<%@\s*inherits\s").unwrap());

/// Does the source declare its model type, either way?
pub fn declares_model(source: &str) -> bool {
    INHERITS.is_match(source) || MODEL.is_match(source)
}

/// Rewrite the model declaration into an `inherits` directive.
///
/// Sources that already inherit from something are returned untouched,
/// which makes the rewrite idempotent.
pub fn rewrite_model_declaration<'a>(
    source: &'a str,
    base_type: &str,
    model_type: Option<&str>,
) -> Cow<'a, str> {
    if INHERITS.is_match(source) {
        return Cow::Borrowed(source);
    }

    if MODEL.is_match(source) {
        return MODEL.replace(source, |caps: &Captures| {
            format!("<%@ inherits {}<{}> %>", base_type, &caps[1])
        });
    }

    match model_type {
        Some(model_type) => Cow::Owned(format!(
            "<%@ inherits {}<{}> %>\n{}",
            base_type, model_type, source
        )),
        None => Cow::Borrowed(source),
    }
}
