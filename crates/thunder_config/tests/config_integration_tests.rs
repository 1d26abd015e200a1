//! Integration tests for configuration loading and mapping.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_yaml::Value;
use tempfile::{tempdir, TempDir};
use thunder_config::{
    get_stack_config, ConfigError, EnumSchema, HierarchicalConfig, LoadOptions, ModuleConfig,
    Record, Schema, DEFAULT_FILENAME,
};
use thunder_core::LocalConfigStore;

/// `repo/.git` plus `repo/sysenvs/aws/sandbox` as the entrypoint directory.
fn repo_layout() -> (TempDir, PathBuf, PathBuf) {
    let dir = tempdir().unwrap();
    let repo = dir.path().join("repo");
    let entry = repo.join("sysenvs").join("aws").join("sandbox");
    fs::create_dir_all(&entry).unwrap();
    fs::create_dir_all(repo.join(".git")).unwrap();
    (dir, repo, entry)
}

fn write_config(dir: &Path, content: &str) {
    fs::write(dir.join(DEFAULT_FILENAME), content).unwrap();
}

#[test]
fn test_nearest_file_wins() {
    let (_dir, repo, entry) = repo_layout();
    write_config(&repo, "team: infra\nnamespace: co");
    write_config(&entry, "team: platform");

    let config = HierarchicalConfig::load(&LoadOptions::new().with_entrypoint(&entry)).unwrap();

    assert_eq!(config.require_str("team").unwrap(), "platform");
    assert_eq!(config.require_str("namespace").unwrap(), "co");
    assert_eq!(
        config.sources(),
        &[repo.join(DEFAULT_FILENAME), entry.join(DEFAULT_FILENAME)]
    );
}

#[test]
fn test_entrypoint_may_be_a_file() {
    let (_dir, repo, entry) = repo_layout();
    write_config(&repo, "team: infra");
    let program = entry.join("Pulumi.yaml");
    fs::write(&program, "name: sandbox").unwrap();

    let config = HierarchicalConfig::load(&LoadOptions::new().with_entrypoint(&program)).unwrap();
    assert_eq!(config.require_str("team").unwrap(), "infra");
}

#[test]
fn test_nested_maps_merge_and_lists_replace() {
    let (_dir, repo, entry) = repo_layout();
    write_config(
        &repo,
        "network:\n  cidr: 10.0.0.0/16\n  zones: [a, b, c]\n",
    );
    write_config(&entry, "network:\n  nat: true\n  zones: [a]\n");

    let config = HierarchicalConfig::load(&LoadOptions::new().with_entrypoint(&entry)).unwrap();

    assert_eq!(config.require_str("network.cidr").unwrap(), "10.0.0.0/16");
    assert_eq!(config.require("network.nat").unwrap(), &Value::Bool(true));
    let zones: Vec<String> = config.get_as("network.zones").unwrap().unwrap();
    assert_eq!(zones, vec!["a"]);
}

#[test]
fn test_templates_see_merged_values() {
    let (_dir, repo, entry) = repo_layout();
    write_config(
        &repo,
        "team: infra\nnamespace: co\nowner_email: \"{{ team }}@{{ namespace }}.example.com\"",
    );
    write_config(&entry, "team: platform");

    let config = HierarchicalConfig::load(&LoadOptions::new().with_entrypoint(&entry)).unwrap();
    assert_eq!(
        config.require_str("owner_email").unwrap(),
        "platform@co.example.com"
    );
}

#[test]
fn test_template_error_names_file() {
    let (_dir, repo, entry) = repo_layout();
    write_config(&repo, "team: infra");
    write_config(&entry, "domain: \"{{ undefined_value }}.example.com\"");

    let err = HierarchicalConfig::load(&LoadOptions::new().with_entrypoint(&entry)).unwrap_err();
    assert!(matches!(err, ConfigError::Template { .. }));
    assert!(err.to_string().contains(DEFAULT_FILENAME));
}

#[test]
fn test_files_above_repository_root_are_ignored() {
    let (dir, repo, entry) = repo_layout();
    write_config(dir.path(), "team: outsiders\nextra: 1");
    write_config(&repo, "team: infra");

    let config = HierarchicalConfig::load(&LoadOptions::new().with_entrypoint(&entry)).unwrap();
    assert_eq!(config.require_str("team").unwrap(), "infra");
    assert!(config.get("extra").is_none());
}

#[test]
fn test_empty_and_invalid_documents() {
    let (_dir, repo, entry) = repo_layout();
    write_config(&repo, "");
    write_config(&entry, "team: platform");
    let config = HierarchicalConfig::load(&LoadOptions::new().with_entrypoint(&entry)).unwrap();
    assert_eq!(config.require_str("team").unwrap(), "platform");

    write_config(&repo, "- just\n- a list\n");
    let err = HierarchicalConfig::load(&LoadOptions::new().with_entrypoint(&entry)).unwrap_err();
    assert!(matches!(err, ConfigError::InvalidDocument { .. }));
}

#[test]
fn test_no_files_yields_empty_config() {
    let (_dir, _repo, entry) = repo_layout();
    let config = HierarchicalConfig::load(&LoadOptions::new().with_entrypoint(&entry)).unwrap();
    assert!(config.sources().is_empty());
    assert!(config.require("team").unwrap_err().is_missing());
}

#[derive(Debug, Deserialize, PartialEq)]
enum VolumeType {
    Gp2,
    Gp3,
}

#[derive(Debug, Deserialize)]
struct DiskArgs {
    name: String,
    size_gb: i64,
    #[serde(default = "default_volume_type")]
    volume_type: VolumeType,
    #[serde(default = "default_true")]
    encrypted: bool,
}

fn default_volume_type() -> VolumeType {
    VolumeType::Gp3
}

fn default_true() -> bool {
    true
}

impl ModuleConfig for DiskArgs {
    fn schema() -> Schema {
        Record::new("DiskArgs")
            .required("name", Schema::String)
            .required("size_gb", Schema::Integer)
            .with_default(
                "volume_type",
                EnumSchema::new("VolumeType")
                    .variant_with_value("Gp2", "gp2")
                    .variant_with_value("Gp3", "gp3"),
            )
            .with_default("encrypted", Schema::Bool)
            .into()
    }
}

#[derive(Debug, Deserialize)]
struct DisksArgs {
    disks: Vec<DiskArgs>,
}

impl ModuleConfig for DisksArgs {
    fn schema() -> Schema {
        Record::new("DisksArgs")
            .required("disks", Schema::list(Schema::of::<DiskArgs>()))
            .into()
    }
}

#[test]
fn test_stack_config_defaults_and_enum_values() {
    let store = LocalConfigStore::new().with(
        "disks:disks",
        r#"[{"name":"data","size_gb":100,"volume_type":"gp2"},{"name":"logs","size_gb":20}]"#,
    );

    let args: DisksArgs = get_stack_config(&store, "disks").unwrap();
    assert_eq!(args.disks.len(), 2);
    assert_eq!(args.disks[0].volume_type, VolumeType::Gp2);
    assert_eq!(args.disks[1].volume_type, VolumeType::Gp3);
    assert!(args.disks[1].encrypted);
    assert_eq!(args.disks[1].name, "logs");
    assert_eq!(args.disks[1].size_gb, 20);
}

#[test]
fn test_extra_key_and_missing_key_are_distinct() {
    let extra = LocalConfigStore::new()
        .with("disks:disks", r#"[{"name":"data","size_gb":1}]"#)
        .with("disks:unexpected", "1");
    let err = get_stack_config::<DisksArgs>(&extra, "disks").unwrap_err();
    assert!(matches!(err, ConfigError::UnknownField { ref path } if path == "unexpected"));

    let missing = LocalConfigStore::new().with("disks:disks", r#"[{"name":"data"}]"#);
    let err = get_stack_config::<DisksArgs>(&missing, "disks").unwrap_err();
    assert!(matches!(err, ConfigError::MissingField { ref path } if path == "disks[0].size_gb"));

    let empty = LocalConfigStore::new();
    let err = get_stack_config::<DisksArgs>(&empty, "disks").unwrap_err();
    assert!(err.is_missing());
}
