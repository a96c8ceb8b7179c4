//! Manifest rendering tests

use dockssh::deploy::config::{merge, ConfigMap, ConfigSource, ConfigValue, SourceKind};
use dockssh::deploy::manifest::{render, DEPLOYMENT_TEMPLATE};
use dockssh::errors::DeployError;
use serde_yaml::Value;

const ID: &str = "dlgr-0a1b2c3d";
const IMAGE: &str = "org/experiment:latest";

fn config(entries: &[(&str, ConfigValue)]) -> ConfigMap {
    merge(&[ConfigSource::new(
        SourceKind::User,
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect(),
    )])
}

fn environment<'a>(document: &'a Value, service: &str) -> &'a Value {
    &document["services"][service]["environment"]
}

fn render_doc(config: &ConfigMap) -> Value {
    let rendered = render(DEPLOYMENT_TEMPLATE, ID, IMAGE, config).unwrap();
    serde_yaml::from_str(&rendered).unwrap()
}

#[test]
fn test_fields_are_substituted() {
    let document = render_doc(&ConfigMap::default());
    assert_eq!(document["services"]["web"]["image"], IMAGE);
    assert_eq!(
        document["services"]["web"]["container_name"],
        format!("{}_web", ID).as_str()
    );
    assert_eq!(document["services"]["worker"]["image"], IMAGE);
}

#[test]
fn test_values_are_strings() {
    let document = render_doc(&config(&[
        ("debug_mode", ConfigValue::Bool(true)),
        ("num_participants", ConfigValue::Int(2)),
        ("base_payment", ConfigValue::Float(0.5)),
        ("title", ConfigValue::from("Stroop")),
    ]));

    for service in ["web", "worker"] {
        let env = environment(&document, service);
        assert_eq!(env["debug_mode"], Value::String("True".to_string()));
        assert_eq!(env["num_participants"], Value::String("2".to_string()));
        assert_eq!(env["base_payment"], Value::String("0.5".to_string()));
        assert_eq!(env["title"], Value::String("Stroop".to_string()));
        assert!(env["HOME"].is_string());
    }
    // Template values that are not strings are coerced as well
    assert_eq!(environment(&document, "web")["PORT"], Value::String("5000".to_string()));
}

#[test]
fn test_quotes_and_backslashes_round_trip() {
    let tricky = r#"say "hi" to C:\temp\new and it's 'fine' \\ done"#;
    let document = render_doc(&config(&[("description", ConfigValue::from(tricky))]));
    assert_eq!(environment(&document, "web")["description"], tricky);
}

#[test]
fn test_rendering_is_injective_on_values() {
    let a = render(
        DEPLOYMENT_TEMPLATE,
        ID,
        IMAGE,
        &config(&[("title", "one".into()), ("other", "same".into())]),
    )
    .unwrap();
    let b = render(
        DEPLOYMENT_TEMPLATE,
        ID,
        IMAGE,
        &config(&[("title", "two".into()), ("other", "same".into())]),
    )
    .unwrap();
    assert_ne!(a, b);

    let a: Value = serde_yaml::from_str(&a).unwrap();
    let b: Value = serde_yaml::from_str(&b).unwrap();
    assert_ne!(environment(&a, "web")["title"], environment(&b, "web")["title"]);
    assert_eq!(environment(&a, "web")["other"], environment(&b, "web")["other"]);
}

#[test]
fn test_config_wins_over_template_environment() {
    let document = render_doc(&config(&[("REDIS_URL", "redis://elsewhere:6379".into())]));
    assert_eq!(
        environment(&document, "worker")["REDIS_URL"],
        "redis://elsewhere:6379"
    );
}

#[test]
fn test_unknown_placeholder_is_a_render_error() {
    let template = "services:\n  web:\n    image: \"{{registry}}/app\"\n    environment:\n      A: b\n";
    let err = render(template, ID, IMAGE, &ConfigMap::default()).unwrap_err();
    assert!(matches!(err, DeployError::Render(_)));
    assert!(err.to_string().contains("registry"));
}

#[test]
fn test_invalid_yaml_is_a_render_error() {
    let err = render("services: [unclosed", ID, IMAGE, &ConfigMap::default()).unwrap_err();
    assert!(matches!(err, DeployError::Render(_)));
}
