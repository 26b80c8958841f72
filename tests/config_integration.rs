//! ---
//! ast_section: "06-testing-qa"
//! ast_subsection: "integration-tests"
//! ast_type: "source"
//! ast_scope: "code"
//! ast_description: "Validation of the shipped example configuration files."
//! ast_version: "v0.1.0"
//! ast_owner: "tbd"
//! ---
use std::fs;
use std::path::Path;
use std::time::Duration;

use ast_common::config::{AppConfig, Mode};
use ast_common::logging::LogFormat;

fn read(path: &str) -> String {
    let manifest_dir = env!("CARGO_MANIFEST_DIR");
    let full = Path::new(manifest_dir).join("..").join(path);
    fs::read_to_string(&full)
        .unwrap_or_else(|err| panic!("failed to read {}: {}", full.display(), err))
}

#[test]
fn dev_example_parses_and_targets_simulation_mode() {
    let config: AppConfig = read("configs/example.dev.toml")
        .parse()
        .expect("dev example must parse");
    assert_eq!(config.mode, Mode::Simulation);
    assert_eq!(config.storage.tables.trucks, "ast-trucks");
    assert_eq!(config.session.stage_duration, Duration::from_secs(1));
    assert_eq!(config.logging.format, LogFormat::Pretty);
    assert!(config.api.enabled);
    assert!(config.metrics.enabled);
    assert!(config.api.static_dir.is_none());
}

#[test]
fn prod_example_parses_and_targets_production_mode() {
    let config: AppConfig = read("configs/example.prod.toml")
        .parse()
        .expect("prod example must parse");
    assert_eq!(config.mode, Mode::Production);
    assert_eq!(config.simulator.host, "10.0.12.40");
    assert_eq!(config.session.stage_duration, Duration::from_secs(2));
    assert_eq!(config.logging.format, LogFormat::StructuredJson);
    assert_eq!(config.logging.file_prefix.as_deref(), Some("astd"));
    assert!(config.api.static_dir.is_some());
}

#[test]
fn example_configs_carry_frontmatter_headers() {
    for path in ["configs/example.dev.toml", "configs/example.prod.toml"] {
        let content = read(path);
        assert!(
            content.starts_with("# ---"),
            "{path} must include frontmatter header"
        );
    }
}
