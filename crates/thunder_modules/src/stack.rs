//! Lookups into the outputs of other stacks.
//!
//! Every stack exports its module's outputs under its own name. Lookups are
//! cached per stack and per query for the lifetime of the resolver, so asking
//! twice hands back the same deferred value.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use thunder_core::{Deferred, Engine, MemoMap};
use tracing::{debug, warn};

use crate::error::{StackError, StackResult};

/// Field matched by [`CrossStackResolver::find_entity`] when none is given.
pub const DEFAULT_MATCH_FIELD: &str = "name";

pub struct CrossStackResolver {
    engine: Arc<dyn Engine>,
    outputs: MemoMap<String, Deferred<Value>>,
    queries: MemoMap<(String, String), Deferred<Option<Value>>>,
}

impl CrossStackResolver {
    pub fn new(engine: Arc<dyn Engine>) -> Self {
        Self {
            engine,
            outputs: MemoMap::new(),
            queries: MemoMap::new(),
        }
    }

    /// Everything `stack` exported.
    pub fn get_stack_output(&self, stack: &str) -> StackResult<Deferred<Value>> {
        self.outputs.get_or_try_insert_with(stack.to_string(), || -> StackResult<_> {
            debug!("creating stack reference for `{}`", stack);
            Ok(self.engine.stack_reference(stack)?)
        })
    }

    /// The first element of the list at `list_path` whose `match_field`
    /// equals `value`. Use `@` as `list_path` when the output is the list.
    ///
    /// A miss resolves to `None`.
    pub fn find_entity(
        &self,
        stack: &str,
        list_path: &str,
        value: &str,
        match_field: Option<&str>,
    ) -> StackResult<Deferred<Option<Value>>> {
        let expression = format!(
            "{}[?{} == `{}`] | [0]",
            list_path,
            match_field.unwrap_or(DEFAULT_MATCH_FIELD),
            literal(value)
        );
        self.search(stack, &expression)
    }

    /// Evaluate a JMESPath expression against the stack's outputs. A null
    /// result resolves to `None`.
    pub fn search(&self, stack: &str, expression: &str) -> StackResult<Deferred<Option<Value>>> {
        jmespath::compile(expression).map_err(|e| StackError::InvalidQuery {
            expression: expression.to_string(),
            message: e.to_string(),
        })?;

        self.queries
            .get_or_try_insert_with((stack.to_string(), expression.to_string()), || -> StackResult<_> {
                let output = self.get_stack_output(stack)?;
                let expression = expression.to_string();
                Ok(output.map(move |value| evaluate(&expression, &value)))
            })
    }

    /// Number of distinct stacks referenced so far.
    pub fn referenced_stacks(&self) -> usize {
        self.outputs.len()
    }
}

impl fmt::Debug for CrossStackResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CrossStackResolver")
            .field("outputs", &self.outputs.len())
            .field("queries", &self.queries.len())
            .finish()
    }
}

/// A JMESPath literal for `value`: kept as is when it is JSON, quoted as a
/// string otherwise.
fn literal(value: &str) -> String {
    let json = match serde_json::from_str::<Value>(value) {
        Ok(_) => value.to_string(),
        Err(_) => Value::String(value.to_string()).to_string(),
    };
    json.replace('`', "\\`")
}

fn evaluate(expression: &str, value: &Value) -> Option<Value> {
    // Compiled expressions cannot cross threads; the syntax was checked upfront.
    let result = jmespath::compile(expression)
        .and_then(|compiled| compiled.search(value))
        .map_err(|e| warn!("query `{}` failed: {}", expression, e))
        .ok()?;

    match serde_json::to_value(&*result) {
        Ok(Value::Null) => None,
        Ok(found) => Some(found),
        Err(e) => {
            warn!("query `{}` returned an unexpected value: {}", expression, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use thunder_core::LocalEngine;

    fn resolver() -> (LocalEngine, CrossStackResolver) {
        let engine = LocalEngine::new("infra", "k8s-agents");
        let resolver = CrossStackResolver::new(Arc::new(engine.clone()));
        (engine, resolver)
    }

    #[test]
    fn test_stack_output_is_memoized() {
        let (engine, resolver) = resolver();
        let first = resolver.get_stack_output("k8s-controllers").unwrap();
        let second = resolver.get_stack_output("k8s-controllers").unwrap();

        assert!(Deferred::ptr_eq(&first, &second));
        assert_eq!(engine.reference_count(), 1);
        assert_eq!(resolver.referenced_stacks(), 1);
    }

    #[test]
    fn test_find_entity() {
        let (engine, resolver) = resolver();
        let bucket = resolver.find_entity("s3", "@", "logs", Some("friendly_name")).unwrap();
        let missing = resolver.find_entity("s3", "@", "nope", Some("friendly_name")).unwrap();
        assert!(bucket.peek().is_none());

        engine.publish(
            "s3",
            json!({"s3": [
                {"friendly_name": "logs", "bucket": "sandbox-dev-abcde-logs"},
                {"friendly_name": "assets", "bucket": "sandbox-dev-abcde-assets"},
            ]}),
        );

        assert_eq!(
            bucket.peek().unwrap().unwrap()["bucket"],
            "sandbox-dev-abcde-logs"
        );
        assert_eq!(missing.peek(), Some(None));
    }

    #[test]
    fn test_find_entity_in_nested_list() {
        let (engine, resolver) = resolver();
        engine.publish(
            "vpc",
            json!({"vpc": {"subnets": [{"name": "public", "id": "subnet-1"}, {"name": "private", "id": "subnet-2"}]}}),
        );

        let subnet = resolver.find_entity("vpc", "subnets", "private", None).unwrap();
        assert_eq!(subnet.peek().unwrap().unwrap()["id"], "subnet-2");
    }

    #[test]
    fn test_queries_are_cached() {
        let (_engine, resolver) = resolver();
        let a = resolver.search("vpc", "subnets[*].id").unwrap();
        let b = resolver.search("vpc", "subnets[*].id").unwrap();
        assert!(Deferred::ptr_eq(&a, &b));
    }

    #[test]
    fn test_invalid_query_fails_immediately() {
        let (engine, resolver) = resolver();
        let err = resolver.search("vpc", "subnets[?").unwrap_err();
        assert!(matches!(err, StackError::InvalidQuery { .. }));
        assert_eq!(engine.reference_count(), 0);
    }

    #[test]
    fn test_literal() {
        assert_eq!(literal("logs"), "\"logs\"");
        assert_eq!(literal("5"), "5");
        assert_eq!(literal("a`b"), "\"a\\`b\"");
    }
}
