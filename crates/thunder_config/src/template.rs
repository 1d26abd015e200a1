//! Template rendering of configuration values.
//!
//! String values may use Jinja2 syntax to reference other declared values,
//! e.g. `domain: "{{ sysenv }}.example.com"`. The process environment is
//! available as `env`.

use std::collections::BTreeMap;

use minijinja::{Environment, UndefinedBehavior};
use serde_yaml::{Mapping, Value};

/// Passes over the context before giving up on nested references.
const MAX_CONTEXT_PASSES: usize = 5;

/// Renders the string leaves of configuration documents.
pub struct ConfigRenderer {
    env: Environment<'static>,
    process_env: BTreeMap<String, String>,
}

impl Default for ConfigRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigRenderer {
    pub fn new() -> Self {
        Self::with_process_env(std::env::vars().collect())
    }

    pub fn with_process_env(process_env: BTreeMap<String, String>) -> Self {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        env.set_keep_trailing_newline(true);
        Self { env, process_env }
    }

    /// Resolve references inside `context` itself, so that a value may point
    /// at another templated value.
    pub fn settle_context(&self, context: &Mapping) -> Result<Mapping, String> {
        let mut current = context.clone();
        for _ in 0..MAX_CONTEXT_PASSES {
            let next = match self.render_mapping(&current, &current) {
                Ok(next) => next,
                // Values referencing not-yet-rendered ones settle in a later pass.
                Err(_) => self.render_mapping_lenient(&current, &current),
            };
            if next == current {
                return Ok(next);
            }
            current = next;
        }
        self.render_mapping(&current, &current)
    }

    /// Render every string leaf of `document` against `context`.
    pub fn render_mapping(&self, document: &Mapping, context: &Mapping) -> Result<Mapping, String> {
        let ctx = self.context(context);
        document
            .iter()
            .map(|(k, v)| Ok((k.clone(), self.render_value(v, &ctx)?)))
            .collect()
    }

    fn render_mapping_lenient(&self, document: &Mapping, context: &Mapping) -> Mapping {
        let ctx = self.context(context);
        document
            .iter()
            .map(|(k, v)| {
                let rendered = self.render_value(v, &ctx).unwrap_or_else(|_| v.clone());
                (k.clone(), rendered)
            })
            .collect()
    }

    fn context(&self, values: &Mapping) -> minijinja::Value {
        let mut ctx = values.clone();
        if !ctx.contains_key("env") {
            let env: Mapping = self
                .process_env
                .iter()
                .map(|(k, v)| (Value::String(k.clone()), Value::String(v.clone())))
                .collect();
            ctx.insert(Value::String("env".into()), Value::Mapping(env));
        }
        minijinja::Value::from_serialize(&ctx)
    }

    fn render_value(&self, value: &Value, ctx: &minijinja::Value) -> Result<Value, String> {
        Ok(match value {
            Value::String(s) if is_template(s) => {
                Value::String(self.env.render_str(s, ctx).map_err(|e| e.to_string())?)
            }
            Value::Sequence(items) => Value::Sequence(
                items
                    .iter()
                    .map(|item| self.render_value(item, ctx))
                    .collect::<Result<_, _>>()?,
            ),
            Value::Mapping(entries) => Value::Mapping(
                entries
                    .iter()
                    .map(|(k, v)| Ok((k.clone(), self.render_value(v, ctx)?)))
                    .collect::<Result<_, String>>()?,
            ),
            other => other.clone(),
        })
    }

    /// Render a single template string.
    pub fn render_str(&self, template: &str, context: &Mapping) -> Result<String, String> {
        self.env
            .render_str(template, self.context(context))
            .map_err(|e| e.to_string())
    }
}

fn is_template(value: &str) -> bool {
    value.contains("{{") || value.contains("{%")
}
