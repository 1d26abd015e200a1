//! Integration tests running stacks end to end against the local engine.

use std::sync::Arc;

use serde_json::{json, Value};
use thunder_config::HierarchicalConfig;
use thunder_core::{ExportTree, LocalConfigStore, LocalEngine};
use thunder_modules::{run_active_stack, run_stack, ModuleCatalog, ModuleError, ModuleManager, ModuleRegistry, ThunderContext};

const COMMON: &str = r#"
namespace: co
purpose: sandbox
phase: dev
team: infra
"#;

fn manager() -> ModuleManager {
    let catalog = Arc::new(ModuleCatalog::builtin().unwrap());
    ModuleManager::new(ModuleRegistry::from_catalog(catalog).unwrap())
}

fn context(engine: &LocalEngine, stack_file: &str) -> ThunderContext {
    let config = HierarchicalConfig::from_mapping(serde_yaml::from_str(COMMON).unwrap());
    let store = LocalConfigStore::from_yaml_str(stack_file).unwrap();
    ThunderContext::new(Arc::new(engine.clone()), Arc::new(store), config, manager())
}

fn resolved(tree: &ExportTree) -> Value {
    tree.resolved().expect("exports should be resolved")
}

#[test]
fn test_s3_stack_builds_private_buckets() {
    let engine = LocalEngine::new("infra", "s3").with_invoke_result(
        "aws:organizations/getOrganization:getOrganization",
        json!({"id": "o-12345"}),
    );
    let ctx = context(
        &engine,
        r#"
config:
  aws:region: us-west-2
  s3:buckets:
    - name: logs
    - name: assets
      acl: public-read
      versioning: false
"#,
    );

    let exports = run_active_stack(&ctx, "aws").unwrap();
    assert!(!exports.is_resolved());

    let bucket_name = ctx.env().bucket_name("logs").unwrap();
    assert!(bucket_name.starts_with("sandbox-dev-"));
    assert!(bucket_name.ends_with("-logs"));

    let registered = engine.resources();
    let logs = registered
        .iter()
        .find(|r| r.resource.name() == bucket_name)
        .unwrap();
    let inputs = resolved(&logs.inputs);
    assert_eq!(inputs["acl"], "private");
    assert_eq!(inputs["versioning"]["enabled"], true);
    assert_eq!(inputs["tags"]["Name"], "s3-bucket-logs");
    assert_eq!(inputs["tags"]["thunder:group"], "logs");
    assert_eq!(
        logs.options.ignore_changes,
        vec!["lifecycleRules".to_string(), "replicationConfiguration".to_string()]
    );

    let assets = registered
        .iter()
        .find(|r| r.resource.name().ends_with("-assets") && r.resource.type_token() == "aws:s3/bucket:Bucket")
        .unwrap();
    let inputs = resolved(&assets.inputs);
    assert_eq!(inputs["acl"], "public-read");
    assert_eq!(inputs["versioning"]["enabled"], false);

    engine.complete_with_inputs().unwrap();

    let policy = registered
        .iter()
        .find(|r| r.resource.name() == format!("{}-org-only-policy", bucket_name))
        .unwrap();
    let inputs = resolved(&policy.inputs);
    assert_eq!(
        inputs["policy"]["Statement"][0]["Condition"]["StringNotEquals"]["aws:PrincipalOrgID"],
        "o-12345"
    );

    let exported = engine.exports();
    let value = resolved(&exported["s3"]);
    assert_eq!(value[0]["friendly_name"], "logs");
    assert_eq!(value[0]["bucket"], bucket_name.as_str());
    assert_eq!(value[1]["friendly_name"], "assets");
}

#[test]
fn test_bucket_policy_waits_for_organization() {
    let engine = LocalEngine::new("infra", "s3");
    let ctx = context(
        &engine,
        "config:\n  aws:region: us-west-2\n  s3:buckets: [{name: logs}]\n",
    );
    run_active_stack(&ctx, "aws").unwrap();

    engine.complete_with_inputs().unwrap();
    let pending: Vec<_> = engine
        .resources()
        .into_iter()
        .filter(|r| !r.resource.is_completed())
        .collect();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].resource.type_token(), "aws:s3/bucketPolicy:BucketPolicy");
}

#[test]
fn test_s3_requires_region() {
    let engine = LocalEngine::new("infra", "s3");
    let ctx = context(&engine, "config:\n  s3:buckets: [{name: logs}]\n");
    let err = run_active_stack(&ctx, "aws").unwrap_err();
    assert!(err.to_string().contains("aws:region"));
    assert!(engine.resources().is_empty());
}

#[test]
fn test_s3_rejects_unknown_field() {
    let engine = LocalEngine::new("infra", "s3");
    let ctx = context(
        &engine,
        "config:\n  aws:region: us-west-2\n  s3:buckets: [{name: logs, encrypted: true}]\n",
    );
    let err = run_active_stack(&ctx, "aws").unwrap_err();
    assert!(matches!(err, ModuleError::Config(_)));
    assert!(err.to_string().contains("buckets[0].encrypted"));
    assert!(engine.resources().is_empty());
}

#[test]
fn test_provider_override_runs_shared_module() {
    let engine = LocalEngine::new("infra", "seed");
    let ctx = context(&engine, "config:\n  thunder:provider: shared\n");

    let exports = run_active_stack(&ctx, "aws").unwrap();
    assert!(!exports.is_resolved());

    let random_id = engine.find_resource("seed").unwrap();
    random_id.complete(json!({"b64Url": "Ab_c-D9"})).unwrap();

    assert_eq!(resolved(&exports), json!({"seed": "abcd9"}));
    assert_eq!(resolved(&engine.exports()["seed"]), json!({"seed": "abcd9"}));
}

#[test]
fn test_seed_byte_length() {
    let engine = LocalEngine::new("infra", "seed");
    let ctx = context(&engine, "config:\n  seed:byte_length: 12\n");
    run_stack(&ctx, "shared", "seed").unwrap();

    let random_id = engine
        .resources()
        .into_iter()
        .find(|r| r.resource.type_token() == "random:index/randomId:RandomId")
        .unwrap();
    assert_eq!(resolved(&random_id.inputs), json!({"byteLength": 12}));
}

#[test]
fn test_seed_override_is_known_immediately() {
    let engine = LocalEngine::new("infra", "seed");
    let ctx = context(&engine, "config:\n  seed:seed_override: fixedseed\n");

    let exports = run_stack(&ctx, "shared", "seed").unwrap();
    assert_eq!(resolved(&exports), json!({"seed": "fixedseed"}));
    assert!(engine.find_resource("seed").is_none());
}

#[test]
fn test_empty_seed_override_generates_seed() {
    let engine = LocalEngine::new("infra", "seed");
    let ctx = context(&engine, "config:\n  seed:seed_override: \"\"\n");

    let exports = run_stack(&ctx, "shared", "seed").unwrap();
    assert!(!exports.is_resolved());

    engine
        .find_resource("seed")
        .unwrap()
        .complete(json!({"b64Url": "XyZ-1"}))
        .unwrap();
    assert_eq!(resolved(&exports), json!({"seed": "xyz1"}));
}

#[test]
fn test_unknown_module() {
    let engine = LocalEngine::new("infra", "no-such-module");
    let ctx = context(&engine, "");
    let err = run_stack(&ctx, "azure", "no-such-module").unwrap_err();
    match err {
        ModuleError::ModuleNotFound { provider, module } => {
            assert_eq!(provider, "azure");
            assert_eq!(module, "no-such-module");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn test_module_resolved_once_across_runs() {
    let engine = LocalEngine::new("infra", "seed");
    let ctx = context(&engine, "config:\n  seed:seed_override: abc\n");

    run_stack(&ctx, "shared", "seed").unwrap();
    run_stack(&ctx, "shared", "seed").unwrap();

    let module = ctx.manager().get("shared", "seed").unwrap();
    assert_eq!(module.resolutions(), 1);
}

#[test]
fn test_cross_stack_lookup_from_module_scope() {
    let engine = LocalEngine::new("infra", "seed");
    let ctx = context(&engine, "");
    engine.publish(
        "s3",
        json!({"s3": [{"friendly_name": "logs", "bucket": "sandbox-dev-abcde-logs"}]}),
    );

    let bucket = ctx
        .stacks()
        .find_entity("s3", "@", "logs", Some("friendly_name"))
        .unwrap();
    assert_eq!(
        bucket.peek().unwrap().unwrap()["bucket"],
        "sandbox-dev-abcde-logs"
    );
    assert_eq!(engine.reference_count(), 1);
}
