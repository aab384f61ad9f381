//! TOML stack files
//!
//! A stack file declares resources and outputs:
//!
//! ```toml
//! name = "web-app"
//! description = "Web servers behind a shared network"
//!
//! [[resources]]
//! id = "vpc"
//! kind = "network"
//! [resources.params]
//! cidr = "30.0.0.0/16"
//!
//! [[resources]]
//! id = "web-sg"
//! kind = "security_group"
//! [resources.params]
//! network = { ref = "vpc" }
//!
//! [[outputs]]
//! name = "VpcId"
//! resource = "vpc"
//! ```
//!
//! `${VAR}` patterns are replaced with environment variables before parsing.
//! Lines that are entirely comments are left alone.

use crate::stack::Stack;
use anyhow::{Context, Result, bail};
use declarative::{OutputSpec, Parameters, Reference, ResourceDescriptor, ResourceKind, Value};
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::LazyLock;

static ENV_VAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid env var regex"));

/// Key marking an inline table as a reference
const REF_KEY: &str = "ref";
const ATTRIBUTE_KEY: &str = "attribute";

// ============================================================================
// File Schema
// ============================================================================

/// On-disk form of a stack
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StackFile {
    pub name: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub resources: Vec<ResourceEntry>,

    #[serde(default)]
    pub outputs: Vec<OutputEntry>,
}

/// One `[[resources]]` entry
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResourceEntry {
    pub id: String,
    pub kind: ResourceKind,

    /// Explicit ordering dependencies, in addition to references in params
    #[serde(default)]
    pub depends_on: Vec<String>,

    #[serde(default)]
    pub params: toml::Table,
}

/// One `[[outputs]]` entry
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutputEntry {
    pub name: String,

    #[serde(default)]
    pub description: String,

    pub resource: String,

    #[serde(default = "default_attribute")]
    pub attribute: String,

    /// `{value}` is replaced by the attribute value
    #[serde(default)]
    pub template: Option<String>,
}

fn default_attribute() -> String {
    Reference::ID.to_string()
}

impl StackFile {
    /// Convert into a validated [`Stack`]
    ///
    /// Every descriptor is validated; duplicate ids and cycles are left to
    /// graph construction.
    pub fn into_stack(self) -> Result<Stack> {
        let mut stack = Stack::new(self.name, self.description);

        for entry in self.resources {
            let id = entry.id;
            let params = convert_params(&id, entry.params)?;
            let descriptor =
                ResourceDescriptor::new(id.clone(), entry.kind, params, entry.depends_on)
                    .with_context(|| format!("Invalid resource '{id}'"))?;
            stack.add(descriptor);
        }

        for entry in self.outputs {
            let mut spec = OutputSpec::new(
                entry.name,
                entry.description,
                Reference::new(entry.resource, entry.attribute),
            );
            if let Some(template) = entry.template {
                spec = spec.with_template(template);
            }
            stack.output(spec);
        }

        Ok(stack)
    }
}

impl Stack {
    /// Parse a stack from TOML text, after env var substitution
    pub fn from_toml(content: &str) -> Result<Self> {
        let substituted = substitute_env_vars(content)?;
        let file: StackFile =
            toml::from_str(&substituted).context("Invalid TOML format in stack file")?;
        file.into_stack()
    }

    /// Load a stack file from disk
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Could not read stack file: {}", path.display()))?;
        Self::from_toml(&content)
            .with_context(|| format!("Invalid stack file: {}", path.display()))
    }

    /// Load `<config_dir>/stacks/<name>.toml`
    pub fn load_named(name: &str) -> Result<Self> {
        let path = crate::paths::stack_file(name)?;
        log::debug!("Loading stack '{name}' from {}", path.display());
        Self::load(&path)
    }
}

/// Substitute `${VAR_NAME}` patterns with environment variable values
///
/// Whole-line comments are copied unchanged; a pattern in a trailing
/// comment after a value is still substituted.
///
/// # Errors
///
/// Returns an error naming every referenced variable that is not set, each
/// once and sorted.
pub fn substitute_env_vars(input: &str) -> Result<String> {
    let mut result = String::with_capacity(input.len());
    let mut missing = BTreeSet::new();

    for line in input.split_inclusive('\n') {
        if line.trim_start().starts_with('#') {
            result.push_str(line);
            continue;
        }
        let substituted = ENV_VAR_RE.replace_all(line, |cap: &Captures<'_>| {
            std::env::var(&cap[1]).unwrap_or_else(|_| {
                missing.insert(cap[1].to_string());
                String::new()
            })
        });
        result.push_str(&substituted);
    }

    if !missing.is_empty() {
        let names: Vec<_> = missing.into_iter().collect();
        bail!("Missing environment variable(s): {}", names.join(", "));
    }

    Ok(result)
}

// ============================================================================
// Value Conversion
// ============================================================================

fn convert_params(id: &str, table: toml::Table) -> Result<Parameters> {
    table
        .into_iter()
        .map(|(name, value)| {
            let converted = convert_value(value)
                .with_context(|| format!("Invalid parameter '{name}' of resource '{id}'"))?;
            Ok((name, converted))
        })
        .collect()
}

fn convert_value(value: toml::Value) -> Result<Value> {
    match value {
        toml::Value::String(s) => Ok(Value::String(s)),
        toml::Value::Integer(i) => Ok(Value::Integer(i)),
        toml::Value::Boolean(b) => Ok(Value::Bool(b)),
        toml::Value::Array(items) => items
            .into_iter()
            .map(convert_value)
            .collect::<Result<Vec<_>>>()
            .map(Value::List),
        toml::Value::Table(table) => convert_reference(table).map(Value::Ref),
        toml::Value::Float(_) => bail!("floating point values are not supported"),
        toml::Value::Datetime(_) => bail!("datetime values are not supported"),
    }
}

/// `{ ref = "<id>", attribute = "<name>" }`; attribute defaults to `id`
fn convert_reference(table: toml::Table) -> Result<Reference> {
    if let Some(unknown) = table
        .keys()
        .find(|k| k.as_str() != REF_KEY && k.as_str() != ATTRIBUTE_KEY)
    {
        bail!("unexpected key '{unknown}' in reference table");
    }

    let resource = match table.get(REF_KEY) {
        Some(toml::Value::String(s)) => s.clone(),
        Some(_) => bail!("'{REF_KEY}' must be a string"),
        None => bail!("tables are only allowed as references: missing '{REF_KEY}'"),
    };

    let attribute = match table.get(ATTRIBUTE_KEY) {
        Some(toml::Value::String(s)) => s.clone(),
        Some(_) => bail!("'{ATTRIBUTE_KEY}' must be a string"),
        None => Reference::ID.to_string(),
    };

    Ok(Reference::new(resource, attribute))
}
