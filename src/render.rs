//! Variable substitution for step command templates.

use std::collections::HashMap;

use anyhow::{Context, Result};
use minijinja::{Environment, UndefinedBehavior};

/// Render a step template against the run's variable mapping.
///
/// Placeholders use `{{name}}` syntax. An unknown placeholder is a
/// configuration error, never a silently empty substitution.
pub fn render_command(template: &str, vars: &HashMap<String, String>) -> Result<String> {
    let mut env = Environment::new();
    env.set_undefined_behavior(UndefinedBehavior::Strict);
    env.render_str(template, vars)
        .with_context(|| format!("render step template `{template}`"))
}
