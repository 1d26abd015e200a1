//! The orchestration engine seam.
//!
//! Resource creation, state reconciliation and persistence of stack outputs
//! belong to an external engine. This module defines the narrow interface the
//! core needs from it and an in-process [`LocalEngine`] used for dry runs and
//! tests.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use once_cell::sync::OnceCell;
use parking_lot::{Mutex, RwLock};
use serde::{Serialize, Serializer};
use serde_json::Value;
use tracing::{debug, info};

use crate::deferred::Deferred;
use crate::error::{CoreError, CoreResult};
use crate::export::{self, ExportTree};

/// Options forwarded to the engine when registering a resource.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceOptions {
    /// URN of the parent resource.
    pub parent: Option<String>,
    /// URNs this resource must be created after.
    pub depends_on: Vec<String>,
    /// Input properties the engine should not diff.
    pub ignore_changes: Vec<String>,
    pub protect: bool,
}

impl ResourceOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parent(mut self, parent: &Resource) -> Self {
        self.parent = Some(parent.urn().to_string());
        self
    }

    pub fn depends_on(mut self, resource: &Resource) -> Self {
        self.depends_on.push(resource.urn().to_string());
        self
    }

    pub fn ignore_changes(mut self, properties: &[&str]) -> Self {
        self.ignore_changes
            .extend(properties.iter().map(|p| p.to_string()));
        self
    }

    pub fn protect(mut self) -> Self {
        self.protect = true;
        self
    }
}

struct ResourceState {
    urn: String,
    type_token: String,
    name: String,
    outputs: Mutex<HashMap<String, Deferred<Value>>>,
    completed: OnceCell<Value>,
}

/// Handle to a resource registered with the engine.
///
/// The handle is opaque: it cannot be exported. Export its outputs instead.
#[derive(Clone)]
pub struct Resource {
    state: Arc<ResourceState>,
}

impl Resource {
    pub fn new(type_token: &str, name: &str) -> Self {
        Self {
            state: Arc::new(ResourceState {
                urn: format!("urn:thunder:{}::{}", type_token, name),
                type_token: type_token.to_string(),
                name: name.to_string(),
                outputs: Mutex::new(HashMap::new()),
                completed: OnceCell::new(),
            }),
        }
    }

    pub fn urn(&self) -> &str {
        &self.state.urn
    }

    pub fn type_token(&self) -> &str {
        &self.state.type_token
    }

    pub fn name(&self) -> &str {
        &self.state.name
    }

    /// A property of the resource, known once the engine has created it.
    pub fn output(&self, property: &str) -> Deferred<Value> {
        let mut outputs = self.state.outputs.lock();
        if let Some(completed) = self.state.completed.get() {
            return Deferred::known(completed.get(property).cloned().unwrap_or(Value::Null));
        }
        outputs
            .entry(property.to_string())
            .or_insert_with(Deferred::pending)
            .clone()
    }

    /// A string property of the resource.
    pub fn output_str(&self, property: &str) -> Deferred<String> {
        self.output(property).map(|value| match value {
            Value::String(s) => s,
            Value::Null => String::new(),
            other => other.to_string(),
        })
    }

    /// Engine side: record the resource's final properties and resolve every
    /// output handed out so far.
    pub fn complete(&self, outputs: Value) -> CoreResult<()> {
        let mut slots = self.state.outputs.lock();
        self.state
            .completed
            .set(outputs.clone())
            .map_err(|_| CoreError::ResourceCompleted(self.state.urn.clone()))?;

        let pending = std::mem::take(&mut *slots);
        drop(slots);
        for (property, slot) in pending {
            let value = outputs.get(&property).cloned().unwrap_or(Value::Null);
            // Slots handed out before completion are only ever filled here.
            let _ = slot.resolve(value);
        }
        debug!("completed resource `{}`", self.state.urn);
        Ok(())
    }

    pub fn is_completed(&self) -> bool {
        self.state.completed.get().is_some()
    }
}

impl fmt::Debug for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resource")
            .field("urn", &self.state.urn)
            .finish()
    }
}

impl Serialize for Resource {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        export::serialize_opaque(&format!("Resource({})", self.state.urn), serializer)
    }
}

/// What the core needs from the orchestration engine.
pub trait Engine: Send + Sync {
    /// Name of the project being deployed.
    fn project(&self) -> String;

    /// Name of the active stack.
    fn stack(&self) -> String;

    /// Register a component resource grouping everything a module creates.
    fn register_component(
        &self,
        type_token: &str,
        name: &str,
        opts: &ResourceOptions,
    ) -> CoreResult<Resource>;

    /// Register a provider resource. Inputs may hold values that are not
    /// known yet, such as another resource's outputs.
    fn register_resource(
        &self,
        type_token: &str,
        name: &str,
        inputs: ExportTree,
        opts: &ResourceOptions,
    ) -> CoreResult<Resource>;

    /// Attach outputs to a component resource.
    fn register_outputs(&self, component: &Resource, outputs: &ExportTree) -> CoreResult<()>;

    /// Publish a stack output under `name`.
    fn export(&self, name: &str, value: ExportTree) -> CoreResult<()>;

    /// The output another stack published under its own name.
    fn stack_reference(&self, stack: &str) -> CoreResult<Deferred<Value>>;

    /// Call a provider data source, e.g. `aws:getCallerIdentity`.
    fn invoke(&self, token: &str, args: Value) -> CoreResult<Deferred<Value>>;
}

/// Record of a resource registered with the [`LocalEngine`].
#[derive(Debug, Clone)]
pub struct RegisteredResource {
    pub resource: Resource,
    pub inputs: ExportTree,
    pub options: ResourceOptions,
    pub component: bool,
}

/// In-process engine.
///
/// Resources are recorded and stay pending until [`Resource::complete`] is
/// called. Stack references resolve from outputs published in-process
/// ([`LocalEngine::publish`]) or from `{state_dir}/{stack}.json`, the file
/// [`LocalEngine::persist`] writes.
#[derive(Clone)]
pub struct LocalEngine {
    project: String,
    stack: String,
    state_dir: Option<PathBuf>,
    resources: Arc<RwLock<Vec<RegisteredResource>>>,
    component_outputs: Arc<RwLock<HashMap<String, ExportTree>>>,
    exports: Arc<RwLock<BTreeMap<String, ExportTree>>>,
    published: Arc<RwLock<HashMap<String, Value>>>,
    invoke_results: Arc<RwLock<HashMap<String, Value>>>,
    reference_count: Arc<AtomicUsize>,
}

impl LocalEngine {
    pub fn new(project: impl Into<String>, stack: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            stack: stack.into(),
            state_dir: None,
            resources: Arc::new(RwLock::new(Vec::new())),
            component_outputs: Arc::new(RwLock::new(HashMap::new())),
            exports: Arc::new(RwLock::new(BTreeMap::new())),
            published: Arc::new(RwLock::new(HashMap::new())),
            invoke_results: Arc::new(RwLock::new(HashMap::new())),
            reference_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Read and write stack state files in `dir`.
    pub fn with_state_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.state_dir = Some(dir.into());
        self
    }

    /// Make the outputs of another stack available to stack references.
    ///
    /// `outputs` is the stack's output map, keyed by output name.
    pub fn publish(&self, stack: impl Into<String>, outputs: Value) {
        self.published.write().insert(stack.into(), outputs);
    }

    /// Preset the result of a data source call.
    pub fn with_invoke_result(self, token: impl Into<String>, result: Value) -> Self {
        self.invoke_results.write().insert(token.into(), result);
        self
    }

    /// Everything registered so far, in registration order.
    pub fn resources(&self) -> Vec<RegisteredResource> {
        self.resources.read().clone()
    }

    pub fn find_resource(&self, name: &str) -> Option<Resource> {
        self.resources
            .read()
            .iter()
            .find(|r| r.resource.name() == name && !r.component)
            .map(|r| r.resource.clone())
    }

    /// Complete pending resources in registration order, echoing their inputs
    /// as outputs. Resources whose inputs are still unresolved stay pending.
    ///
    /// Returns the number of resources completed.
    pub fn complete_with_inputs(&self) -> CoreResult<usize> {
        let mut completed = 0;
        for registered in self.resources.read().iter() {
            if registered.resource.is_completed() {
                continue;
            }
            if let Some(inputs) = registered.inputs.resolved() {
                registered.resource.complete(inputs)?;
                completed += 1;
            }
        }
        Ok(completed)
    }

    pub fn exports(&self) -> BTreeMap<String, ExportTree> {
        self.exports.read().clone()
    }

    pub fn component_outputs(&self, urn: &str) -> Option<ExportTree> {
        self.component_outputs.read().get(urn).cloned()
    }

    /// Number of stack references created.
    pub fn reference_count(&self) -> usize {
        self.reference_count.load(Ordering::SeqCst)
    }

    /// Write the active stack's exports to `{state_dir}/{stack}.json`.
    ///
    /// Fails if some exported value is still pending.
    pub fn persist(&self) -> CoreResult<Option<PathBuf>> {
        let Some(dir) = &self.state_dir else {
            return Ok(None);
        };

        let mut outputs = serde_json::Map::new();
        for (name, tree) in self.exports.read().iter() {
            let value = tree.resolved().ok_or_else(|| CoreError::InvalidStackState {
                stack: self.stack.clone(),
                message: format!("output `{}` has unresolved values", name),
            })?;
            outputs.insert(name.clone(), value);
        }

        fs::create_dir_all(dir)?;
        let path = state_file(dir, &self.stack);
        fs::write(&path, serde_json::to_string_pretty(&Value::Object(outputs))?)?;
        info!("persisted outputs for stack `{}` to {:?}", self.stack, path);
        Ok(Some(path))
    }

    fn load_state(&self, stack: &str) -> CoreResult<()> {
        if self.published.read().contains_key(stack) {
            return Ok(());
        }
        let Some(dir) = &self.state_dir else {
            return Ok(());
        };
        let path = state_file(dir, stack);
        if !path.exists() {
            return Ok(());
        }

        debug!("loading state for stack `{}` from {:?}", stack, path);
        let content = fs::read_to_string(&path)?;
        let outputs: Value =
            serde_json::from_str(&content).map_err(|e| CoreError::InvalidStackState {
                stack: stack.to_string(),
                message: e.to_string(),
            })?;
        self.publish(stack, outputs);
        Ok(())
    }

    fn record(&self, resource: Resource, inputs: ExportTree, opts: &ResourceOptions, component: bool) {
        self.resources.write().push(RegisteredResource {
            resource,
            inputs,
            options: opts.clone(),
            component,
        });
    }
}

fn state_file(dir: &Path, stack: &str) -> PathBuf {
    dir.join(format!("{}.json", stack))
}

impl Engine for LocalEngine {
    fn project(&self) -> String {
        self.project.clone()
    }

    fn stack(&self) -> String {
        self.stack.clone()
    }

    fn register_component(
        &self,
        type_token: &str,
        name: &str,
        opts: &ResourceOptions,
    ) -> CoreResult<Resource> {
        debug!("registering component `{}` of type `{}`", name, type_token);
        let resource = Resource::new(type_token, name);
        self.record(resource.clone(), ExportTree::Null, opts, true);
        Ok(resource)
    }

    fn register_resource(
        &self,
        type_token: &str,
        name: &str,
        inputs: ExportTree,
        opts: &ResourceOptions,
    ) -> CoreResult<Resource> {
        debug!("registering resource `{}` of type `{}`", name, type_token);
        let resource = Resource::new(type_token, name);
        self.record(resource.clone(), inputs, opts, false);
        Ok(resource)
    }

    fn register_outputs(&self, component: &Resource, outputs: &ExportTree) -> CoreResult<()> {
        self.component_outputs
            .write()
            .insert(component.urn().to_string(), outputs.clone());
        Ok(())
    }

    fn export(&self, name: &str, value: ExportTree) -> CoreResult<()> {
        debug!("exporting `{}` from stack `{}`", name, self.stack);
        self.exports.write().insert(name.to_string(), value);
        Ok(())
    }

    fn stack_reference(&self, stack: &str) -> CoreResult<Deferred<Value>> {
        self.reference_count.fetch_add(1, Ordering::SeqCst);
        self.load_state(stack)?;

        let published = Arc::clone(&self.published);
        let stack = stack.to_string();
        Ok(Deferred::from_poll(move || {
            published
                .read()
                .get(&stack)
                .and_then(|outputs| outputs.get(&stack))
                .cloned()
        }))
    }

    fn invoke(&self, token: &str, _args: Value) -> CoreResult<Deferred<Value>> {
        Ok(match self.invoke_results.read().get(token) {
            Some(result) => Deferred::known(result.clone()),
            None => Deferred::pending(),
        })
    }
}

impl fmt::Debug for LocalEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalEngine")
            .field("project", &self.project)
            .field("stack", &self.stack)
            .field("state_dir", &self.state_dir)
            .field("resources", &self.resources.read().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn test_resource_outputs_resolve_on_complete() {
        let engine = LocalEngine::new("infra", "s3");
        let bucket = engine
            .register_resource("aws:s3:Bucket", "logs", json!({"bucket": "logs"}).into(), &ResourceOptions::new())
            .unwrap();

        let arn = bucket.output("arn");
        assert!(arn.peek().is_none());

        bucket.complete(json!({"arn": "arn:aws:s3:::logs"})).unwrap();
        assert_eq!(arn.peek().unwrap(), "arn:aws:s3:::logs");
        assert_eq!(bucket.output("missing").peek(), Some(Value::Null));
        assert!(bucket.complete(json!({})).is_err());
    }

    #[test]
    fn test_complete_with_inputs() {
        let engine = LocalEngine::new("infra", "s3");
        let bucket = engine
            .register_resource("aws:s3:Bucket", "logs", json!({"bucket": "logs"}).into(), &ResourceOptions::new())
            .unwrap();
        let name = bucket.output_str("bucket");
        let org_id = engine
            .invoke("aws:organizations:getOrganization", json!({}))
            .unwrap();

        let policy = engine
            .register_resource(
                "aws:s3:BucketPolicy",
                "logs-policy",
                ExportTree::Map(BTreeMap::from([
                    ("bucket".to_string(), ExportTree::Deferred(bucket.output("bucket"))),
                    ("org_id".to_string(), ExportTree::Deferred(org_id)),
                ])),
                &ResourceOptions::new().parent(&bucket),
            )
            .unwrap();

        // The policy waits on a data source nobody answers.
        assert_eq!(engine.complete_with_inputs().unwrap(), 1);
        assert_eq!(name.peek().as_deref(), Some("logs"));
        assert!(!policy.is_completed());
        assert_eq!(engine.complete_with_inputs().unwrap(), 0);
        assert_eq!(engine.resources()[1].options.parent.as_deref(), Some(bucket.urn()));
    }

    #[test]
    fn test_resource_is_opaque_in_exports() {
        let resource = Resource::new("aws:s3:Bucket", "logs");
        let err = export::flatten(&vec![resource]).unwrap_err();
        assert!(err.to_string().contains("Resource(urn:thunder:aws:s3:Bucket::logs)"));
    }

    #[test]
    fn test_stack_reference_from_published_outputs() {
        let engine = LocalEngine::new("infra", "k8s-agents");
        let reference = engine.stack_reference("vpc").unwrap();
        assert!(reference.peek().is_none());

        engine.publish("vpc", json!({"vpc": {"id": "vpc-1"}}));
        assert_eq!(reference.peek().unwrap(), json!({"id": "vpc-1"}));
        assert_eq!(engine.reference_count(), 1);
    }

    #[test]
    fn test_persist_and_reload_state() {
        let dir = tempdir().unwrap();

        let producer = LocalEngine::new("infra", "vpc").with_state_dir(dir.path());
        producer
            .export("vpc", ExportTree::from(json!({"id": "vpc-1"})))
            .unwrap();
        let path = producer.persist().unwrap().unwrap();
        assert!(path.ends_with("vpc.json"));

        let consumer = LocalEngine::new("infra", "k8s-agents").with_state_dir(dir.path());
        let reference = consumer.stack_reference("vpc").unwrap();
        assert_eq!(reference.peek().unwrap(), json!({"id": "vpc-1"}));
    }

    #[test]
    fn test_persist_rejects_pending_exports() {
        let dir = tempdir().unwrap();
        let engine = LocalEngine::new("infra", "vpc").with_state_dir(dir.path());
        engine
            .export("vpc", ExportTree::Deferred(Deferred::pending()))
            .unwrap();
        assert!(matches!(
            engine.persist(),
            Err(CoreError::InvalidStackState { .. })
        ));
    }
}
