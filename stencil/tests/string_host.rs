use serde_json::json;
use stencil::prelude::*;
use tempdir::TempDir;

use std::any::Any;
use std::fs::read_to_string;
use std::sync::Arc;

// Model whose members can't be read.
#[derive(Debug)]
struct Unreadable;

impl PropertyBag for Unreadable {
    fn try_get(&self, name: &str) -> Option<Value> {
        panic!("{} is unreadable", name)
    }

    fn type_name(&self) -> Option<&str> {
        None
    }

    fn to_wire(&self) -> Result<serde_json::Value, Error> {
        Ok(json!({}))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

fn host() -> StringHost {
    StringHost::new(Config::default())
}

#[test]
fn test_cache_by_content() -> Result<(), FaultRecord> {
    let host = host();
    host.start()?;

    let first = host.compile_template("Hello <%= Model.Name %>")?;
    let second = host.compile_template("Hello <%= Model.Name %>")?;
    let other = host.compile_template("Bye <%= Model.Name %>")?;

    assert!(first.is_some());
    assert_eq!(first, second);
    assert_ne!(first, other);
    assert_eq!(host.compiled_units().len(), 2);

    Ok(())
}

#[test]
fn test_render() -> Result<(), FaultRecord> {
    let host = host();
    host.start()?;

    let model = Model::anonymous(json!({"Name": "Joe Doe"}));

    for _ in 0..2 {
        let output = host.render_template("Hello <%= Model.Name %>", &model, None)?;
        assert_eq!(output.as_deref(), Some("Hello Joe Doe"));
    }

    assert_eq!(host.compiled_units().len(), 1);

    Ok(())
}

#[test]
fn test_errors_returned_as_none() -> Result<(), FaultRecord> {
    let host = host();
    host.start()?;
    host.set_throw_exceptions(false);

    let output = host.render_template("<%= Model.Name", &Model::None, None)?;

    assert_eq!(output, None);
    assert!(host.error_message().is_some());
    assert!(host.render_html_error_page(None).contains("Template Rendering Error"));

    // A successful call clears the error.
    host.render_template("ok", &Model::None, None)?;
    assert_eq!(host.error_message(), None);

    Ok(())
}

#[test]
fn test_errors_thrown() -> Result<(), FaultRecord> {
    let host = host();
    host.start()?;
    host.set_throw_exceptions(true);

    let result = host.render_template("<%= Model.Missing.Deeper %>", &Model::anonymous(json!({})), None);

    let record = result.err().expect("render should fail");
    assert_eq!(record.kind(), Some("ExecutionFault"));
    assert!(record.generated_source.map(|s| !s.is_empty()).unwrap_or(false));
    assert_eq!(host.error_message(), Some(record.message));

    Ok(())
}

#[test]
fn test_not_started() {
    let host = host();
    host.set_throw_exceptions(true);

    let result = host.render_template("hi", &Model::None, None);
    assert!(matches!(result, Err(FaultRecord { fault: Some(Error::NotStarted), .. })));
}

#[test]
fn test_render_to_file() -> Result<(), FaultRecord> {
    let dir = TempDir::new("stencil-string-host").map_err(Error::from)?;
    let path = dir.path().join("out.txt");

    let host = host();
    host.start()?;

    let written = host.render_template_to_file(
        "<% for n in Model.numbers %><%= n %>,<% end %>",
        &Model::anonymous(json!({"numbers": [1, 2, 3]})),
        &path,
    )?;

    assert!(written);
    assert_eq!(read_to_string(&path).map_err(Error::from)?, "1,2,3,");

    Ok(())
}

#[test]
fn test_stop_clears_cache() -> Result<(), FaultRecord> {
    let host = host();
    host.start()?;
    host.compile_template("cached")?;
    assert_eq!(host.compiled_units().len(), 1);

    assert!(host.stop());
    assert!(host.compiled_units().is_empty());

    host.start()?;
    assert_eq!(host.render_template("cached", &Model::None, None)?.as_deref(), Some("cached"));

    Ok(())
}

#[test]
fn test_integer_overflow() -> Result<(), FaultRecord> {
    let host = host();
    host.start()?;

    let model = Model::anonymous(json!({"a": i64::MIN, "b": -1}));

    let output = host.render_template("<%= Model.a / Model.b %>", &model, None)?;
    assert_eq!(output, None);
    assert!(host.error_message().map(|m| m.contains("overflow")).unwrap_or(false));

    host.set_throw_exceptions(true);
    let record = host
        .render_template("<%= Model.a % Model.b %>", &model, None)
        .err()
        .expect("overflow is a fault");
    assert_eq!(record.kind(), Some("ExecutionFault"));

    Ok(())
}

#[test]
fn test_panic_in_model() -> Result<(), FaultRecord> {
    let host = host();
    host.start()?;
    host.set_throw_exceptions(true);

    let model = Model::from_bag(Arc::new(Unreadable));
    let record = host
        .render_template("<%= Model.Name %>", &model, None)
        .err()
        .expect("panic is a fault");

    assert_eq!(record.kind(), Some("ExecutionFault"));
    assert!(record.message.contains("Name is unreadable"));

    // The host keeps working.
    assert_eq!(host.render_template("ok", &Model::None, None)?.as_deref(), Some("ok"));

    Ok(())
}
