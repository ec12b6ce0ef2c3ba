use serde::Serialize;
use serde_json::json;
use stencil::compiler::BaseContract;
use stencil::config::Config;
use stencil::engine::{CompileRequest, Engine, EngineConfig};
use stencil::model::Model;
use stencil::Error;
use tempdir::TempDir;

#[derive(Serialize)]
struct Person {
    name: String,
    age: i64,
}

fn engine() -> Engine {
    Engine::new(EngineConfig::from_config(
        &Config::default(),
        BaseContract::Template,
    ))
}

#[test]
fn test_render_anonymous_model() -> Result<(), Error> {
    let engine = engine();
    let output = engine.render_template(
        "Hello <%= Model.Name %>",
        &Model::anonymous(json!({"Name": "Joe Doe"})),
        None,
    )?;

    assert_eq!(output, "Hello Joe Doe");

    Ok(())
}

#[test]
fn test_render_compiled_unit_twice() -> Result<(), Error> {
    let engine = engine();
    let id = engine.compile_template("Hi <%= Model.name %>", None, None)?;
    assert_eq!(engine.units(), 1);

    let ann = engine.render_template_from_unit(&id, &Model::anonymous(json!({"name": "Ann"})), None)?;
    let bob = engine.render_template_from_unit(&id, &Model::anonymous(json!({"name": "Bob"})), None)?;

    assert_eq!(ann, "Hi Ann");
    assert_eq!(bob, "Hi Bob");
    assert_eq!(engine.units(), 1);

    Ok(())
}

#[test]
fn test_typed_and_anonymous_models_agree() -> Result<(), Error> {
    let template = "<%= Model.name %> is <%= Model.age %>";

    let typed = engine().render_template(
        template,
        &Model::new(Person {
            name: "Ann".into(),
            age: 31,
        }),
        None,
    )?;
    let anonymous = engine().render_template(
        template,
        &Model::anonymous(json!({"name": "Ann", "age": 31})),
        None,
    )?;

    assert_eq!(typed, "Ann is 31");
    assert_eq!(typed, anonymous);

    Ok(())
}

#[test]
fn test_render_into_writer() -> Result<(), Error> {
    let engine = engine();
    let mut output = vec![];

    let result = engine.render_template(
        "<% for i in [1, 2, 3] %><%= i %><% end %>",
        &Model::None,
        Some(&mut output),
    )?;

    assert_eq!(result, "");
    assert_eq!(String::from_utf8_lossy(&output), "123");

    Ok(())
}

#[test]
fn test_compile_error_keeps_state() {
    let engine = engine();
    let result = engine.compile_template("<% if %>", None, None);

    assert!(matches!(result, Err(Error::Parse(_))));
    assert!(engine.error_message().is_some());
    assert!(engine.state().last_error.is_some());

    // Next call starts clean.
    assert!(engine.compile_template("fine", None, None).is_ok());
    assert!(engine.error_message().is_none());
}

#[test]
fn test_model_type_mismatch() -> Result<(), Error> {
    let engine = engine();
    engine.add_referenced_module_from::<Person>();

    let unit = engine.compile(
        "<%= Model.name %>",
        &CompileRequest {
            model_type: Some(std::any::type_name::<Person>().to_string()),
            ..Default::default()
        },
    )?;

    let result = engine.render_template_from_unit(&unit.id, &Model::new(String::from("nope")), None);
    assert!(matches!(result, Err(Error::TypeActivation(_))));

    Ok(())
}

#[test]
fn test_unit_not_found() {
    let result = engine().render_template_from_unit("_missing", &Model::None, None);
    assert!(matches!(result, Err(Error::UnitNotFound(_))));
}

#[test]
fn test_modules_on_disk() -> Result<(), Error> {
    let dir = TempDir::new("stencil-modules")?;

    let mut config = Config::default();
    config.compiler.compile_to_memory = false;
    config.compiler.temp_module_path = dir.path().to_owned();

    let engine = Engine::new(EngineConfig::from_config(&config, BaseContract::Template));
    let id = engine.compile_template("<%= 1 + 2 %>", None, None)?;

    assert!(dir.path().join(format!("{}.stencil", id)).exists());
    assert_eq!(engine.render_template_from_unit(&id, &Model::None, None)?, "3");

    Ok(())
}
