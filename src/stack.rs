//! A named set of resource declarations and outputs

use declarative::{
    DependencyGraph, DescriptorBuilder, OutputCollector, OutputSpec, ResourceDescriptor,
};

/// A stack: the unit that is planned and deployed together
///
/// Different layouts are different stacks, not different code paths.
#[derive(Debug, Clone, Default)]
pub struct Stack {
    name: String,
    description: String,
    descriptors: Vec<ResourceDescriptor>,
    outputs: Vec<OutputSpec>,
}

impl Stack {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            descriptors: Vec::new(),
            outputs: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Declarations in the order they were added
    pub fn descriptors(&self) -> &[ResourceDescriptor] {
        &self.descriptors
    }

    pub fn outputs(&self) -> &[OutputSpec] {
        &self.outputs
    }

    /// Look up a declaration by id
    pub fn get(&self, id: &str) -> Option<&ResourceDescriptor> {
        self.descriptors.iter().find(|d| d.id() == id)
    }

    /// Add an already built descriptor
    pub fn add(&mut self, descriptor: ResourceDescriptor) {
        self.descriptors.push(descriptor);
    }

    /// Build and add a descriptor
    pub fn declare(&mut self, builder: DescriptorBuilder) -> declarative::Result<()> {
        self.descriptors.push(builder.build()?);
        Ok(())
    }

    /// Declare a named output
    pub fn output(&mut self, spec: OutputSpec) {
        self.outputs.push(spec);
    }

    /// Build the dependency graph, rejecting duplicate ids
    pub fn build_graph(&self) -> declarative::Result<DependencyGraph> {
        let mut graph = DependencyGraph::new();
        for descriptor in &self.descriptors {
            graph.add(descriptor.clone())?;
        }
        graph.validate()?;
        Ok(graph)
    }

    /// Collector for the declared outputs, rejecting duplicate names
    pub fn output_collector(&self) -> declarative::Result<OutputCollector> {
        let mut collector = OutputCollector::new();
        for spec in &self.outputs {
            collector.add(spec.clone())?;
        }
        Ok(collector)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use declarative::{Error, Reference, ResourceKind};

    fn bucket(id: &str) -> DescriptorBuilder {
        ResourceDescriptor::builder(id, ResourceKind::Bucket).param("bucket_name", "artifact-store")
    }

    #[test]
    fn test_build_graph_rejects_duplicates() {
        let mut stack = Stack::new("dup", "");
        stack.declare(bucket("artifacts")).unwrap();
        stack.declare(bucket("artifacts")).unwrap();
        assert!(matches!(stack.build_graph(), Err(Error::DuplicateId(_))));
    }

    #[test]
    fn test_build_graph_rejects_dangling_reference() {
        let mut stack = Stack::new("dangling", "");
        stack
            .declare(
                ResourceDescriptor::builder("sg", ResourceKind::SecurityGroup)
                    .param("network", Reference::id_of("vpc")),
            )
            .unwrap();
        assert!(matches!(
            stack.build_graph(),
            Err(Error::UnknownReference { .. })
        ));
    }

    #[test]
    fn test_output_collector_rejects_duplicate_names() {
        let mut stack = Stack::new("outputs", "");
        stack.declare(bucket("artifacts")).unwrap();
        let spec = OutputSpec::new("BucketName", "", Reference::new("artifacts", "bucket_name"));
        stack.output(spec.clone());
        stack.output(spec);
        assert!(matches!(
            stack.output_collector(),
            Err(Error::DuplicateOutput(_))
        ));
    }

    #[test]
    fn test_get_and_declare_invalid() {
        let mut stack = Stack::new("s", "");
        stack.declare(bucket("artifacts")).unwrap();
        assert!(stack.get("artifacts").is_some());
        assert!(stack.get("missing").is_none());

        let invalid = ResourceDescriptor::builder("bad", ResourceKind::Bucket)
            .param("bucket_name", "NOT_VALID");
        assert!(stack.declare(invalid).is_err());
        assert_eq!(stack.descriptors().len(), 1);
    }
}
