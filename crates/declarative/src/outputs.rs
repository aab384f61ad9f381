//! Output collection - resolves named values from realized resources

use crate::error::{Error, Result};
use crate::realizer::Realization;
use crate::types::{Output, OutputSpec};

const TEMPLATE_PLACEHOLDER: &str = "{value}";

/// Named output declarations, resolved after a realization run
#[derive(Debug, Clone, Default)]
pub struct OutputCollector {
    specs: Vec<OutputSpec>,
}

impl OutputCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare an output; names must be unique
    pub fn add(&mut self, spec: OutputSpec) -> Result<()> {
        if self.specs.iter().any(|s| s.name == spec.name) {
            return Err(Error::DuplicateOutput(spec.name));
        }
        self.specs.push(spec);
        Ok(())
    }

    pub fn specs(&self) -> &[OutputSpec] {
        &self.specs
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    /// Resolve every declared output against `realized`
    pub fn collect(&self, realized: &Realization) -> Result<Vec<Output>> {
        collect(&self.specs, realized)
    }
}

/// Resolve `specs` in declaration order
///
/// Fails with [`Error::UnresolvedOutput`] if a spec names a resource that was
/// never realized, and with [`Error::MissingAttribute`] if the realized
/// resource lacks the attribute.
pub fn collect(specs: &[OutputSpec], realized: &Realization) -> Result<Vec<Output>> {
    specs
        .iter()
        .map(|spec| {
            let resource =
                realized
                    .get(&spec.source.resource)
                    .ok_or_else(|| Error::UnresolvedOutput {
                        output: spec.name.clone(),
                        resource: spec.source.resource.clone(),
                    })?;
            let raw = resource.attribute(&spec.source.attribute).ok_or_else(|| {
                Error::MissingAttribute {
                    resource: spec.source.resource.clone(),
                    attribute: spec.source.attribute.clone(),
                }
            })?;
            let value = match &spec.template {
                Some(template) => template.replace(TEMPLATE_PLACEHOLDER, raw),
                None => raw.to_string(),
            };
            Ok(Output {
                name: spec.name.clone(),
                description: spec.description.clone(),
                value,
            })
        })
        .collect()
}
