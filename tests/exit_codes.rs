mod common;

use std::process::Command;

use common::{foo_class, read_jar, write_jar};
use tempfile::TempDir;

fn desugar_jar() -> Command {
    Command::new(env!("CARGO_BIN_EXE_desugar-jar"))
}

#[test]
fn missing_arguments_are_a_usage_error() {
    let status = desugar_jar().status().unwrap();
    assert_eq!(status.code(), Some(2));
}

#[test]
fn unknown_config_fails() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("input.jar");
    write_jar(&input, &[("pkg/Foo.class", &foo_class())]);
    let output = desugar_jar()
        .arg(&input)
        .arg(dir.path().join("output.jar"))
        .arg("--config=nope")
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("nope"));
}

#[test]
fn missing_input_fails() {
    let dir = TempDir::new().unwrap();
    let status = desugar_jar()
        .arg(dir.path().join("missing.jar"))
        .arg(dir.path().join("output.jar"))
        .status()
        .unwrap();
    assert_eq!(status.code(), Some(1));
}

#[test]
fn built_in_config_requires_its_types() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("input.jar");
    write_jar(&input, &[("pkg/Foo.class", &foo_class())]);
    let status = desugar_jar()
        .arg(&input)
        .arg(dir.path().join("output.jar"))
        .arg("--config=android_fix_libs")
        .status()
        .unwrap();
    assert_eq!(status.code(), Some(1));
}

#[test]
fn drop_unselected_keeps_resources() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("input.jar");
    let output = dir.path().join("output.jar");
    let mut entries = vec![
        ("META-INF/MANIFEST.MF".to_owned(), b"Manifest-Version: 1.0\r\n".to_vec()),
        ("pkg/Foo.class".to_owned(), foo_class()),
    ];
    entries.extend(
        desugar_jar::desugar::BuildConfig::AndroidFixLibs
            .top_level_type_patterns()
            .iter()
            .map(|pattern| {
                let name = match pattern.strip_suffix('*') {
                    Some(prefix) => format!("{prefix}Helper"),
                    None => (*pattern).to_owned(),
                };
                (format!("{name}.class"), common::plain_class(&name))
            }),
    );
    let borrowed = entries
        .iter()
        .map(|(name, bytes)| (name.as_str(), bytes.as_slice()))
        .collect::<Vec<_>>();
    write_jar(&input, &borrowed);
    let status = desugar_jar()
        .arg(&input)
        .arg(&output)
        .arg("--config=android_fix_libs")
        .arg("--drop-unselected")
        .status()
        .unwrap();
    assert!(status.success());
    let names = read_jar(&output).into_iter().map(|(name, _)| name).collect::<Vec<_>>();
    assert!(names.contains(&"META-INF/MANIFEST.MF".to_owned()));
    assert!(!names.contains(&"pkg/Foo.class".to_owned()));
    assert_eq!(names.len(), entries.len() - 1);
}
