//! Stencil compiles, caches and renders text templates outside of a web
//! request pipeline: report generators, e-mail composers, static site builders.
//!
//! Templates are compiled into units, cached by content hash or file signature,
//! and optionally executed inside an isolated context that can be torn down
//! to reclaim everything compiled inside it.
//!
//! Most types you need come with one import:
//!
//! ```
//! use stencil::prelude::*;
//! ```
//!
//! ### Rendering strings
//!
//! ```rust
//! use stencil::prelude::*;
//! use serde_json::json;
//!
//! let host = StringHost::default();
//! host.start().unwrap();
//!
//! let model = Model::anonymous(json!({"Name": "Joe Doe"}));
//! let output = host.render_template("Hello <%= Model.Name %>", &model, None).unwrap();
//!
//! assert_eq!(output.as_deref(), Some("Hello Joe Doe"));
//! ```
//!
//! ### Rendering files
//!
//! [`host::FolderHost`] renders templates relative to a folder, with layouts and partials:
//!
//! ```html
//! <% layout("layout.html") %>
//! <h1><%= Model.title %></h1>
//! <%- render_partial("footer", Model) %>
//! ```
pub mod colors;
pub mod compiler;
pub mod config;
pub mod engine;
pub mod error;
pub mod fault;
pub mod host;
pub mod logging;
pub mod model;
pub mod prelude;
pub mod sandbox;
pub mod template;
pub mod unit;

pub use error::Error;
pub use fault::{FaultRecord, RenderLayer};

/// Serde is used for models, module images and isolated context messages.
pub use serde;

/// Convert text to snake_case.
pub fn snake_case(string: &str) -> String {
    let mut result = String::with_capacity(string.len());
    let mut previous_lowercase = false;

    for c in string.chars() {
        if c.is_ascii_uppercase() {
            if previous_lowercase {
                result.push('_');
            }
            result.push(c.to_ascii_lowercase());
            previous_lowercase = false;
        } else if c == '-' || c == ' ' {
            result.push('_');
            previous_lowercase = false;
        } else {
            result.push(c);
            previous_lowercase = c.is_ascii_lowercase() || c.is_ascii_digit();
        }
    }

    result
}

/// Convert the first letter of the string to uppercase lettering.
pub fn capitalize(string: &str) -> String {
    let mut iter = string.chars();
    match iter.next() {
        None => String::new(),
        Some(letter) => letter.to_uppercase().chain(iter).collect(),
    }
}

/// Escape characters that have special meaning in HTML.
pub fn html_encode(string: &str) -> String {
    let mut result = String::with_capacity(string.len());

    for c in string.chars() {
        match c {
            '&' => result.push_str("&amp;"),
            '<' => result.push_str("&lt;"),
            '>' => result.push_str("&gt;"),
            '"' => result.push_str("&quot;"),
            '\'' => result.push_str("&#39;"),
            c => result.push(c),
        }
    }

    result
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_snake_case() {
        assert_eq!(snake_case("FirstName"), "first_name");
        assert_eq!(snake_case("first_name"), "first_name");
        assert_eq!(snake_case("HTTPServer"), "httpserver");
        assert_eq!(snake_case("content-type"), "content_type");
    }

    #[test]
    fn test_html_encode() {
        assert_eq!(
            html_encode(r#"<a href="x">Tom & 'Jerry'</a>"#),
            "&lt;a href=&quot;x&quot;&gt;Tom &amp; &#39;Jerry&#39;&lt;/a&gt;"
        );
    }
}
