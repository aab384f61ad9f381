//! Realizer - walks the dependency graph and provisions each descriptor

use crate::descriptor::ResourceDescriptor;
use crate::error::{Error, Result};
use crate::graph::DependencyGraph;
use crate::provisioner::{NoProgress, ProgressCallback, Provisioner};
use crate::types::{RealizeOptions, RealizedResource, Reference};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::HashMap;

/// Realized resources of one run, in realization order
#[derive(Debug, Clone, Default, Serialize)]
pub struct Realization {
    resources: Vec<RealizedResource>,
    #[serde(skip)]
    index: HashMap<String, usize>,
}

impl Realization {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a realized resource by descriptor id
    pub fn get(&self, id: &str) -> Option<&RealizedResource> {
        self.index.get(id).map(|&i| &self.resources[i])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Realized resources in realization order
    pub fn iter(&self) -> impl Iterator<Item = &RealizedResource> {
        self.resources.iter()
    }

    /// Descriptor ids in realization order
    pub fn ids(&self) -> Vec<&str> {
        self.resources.iter().map(|r| r.id.as_str()).collect()
    }

    /// Resolve a reference held by descriptor `from`
    ///
    /// Fails with [`Error::UnknownReference`] when the resource was never
    /// realized and [`Error::MissingAttribute`] when it lacks the attribute.
    pub fn resolve(&self, from: &str, reference: &Reference) -> Result<String> {
        let resource = self
            .get(&reference.resource)
            .ok_or_else(|| Error::UnknownReference {
                from: from.to_string(),
                to: reference.resource.clone(),
            })?;
        resource
            .attribute(&reference.attribute)
            .map(str::to_string)
            .ok_or_else(|| Error::MissingAttribute {
                resource: reference.resource.clone(),
                attribute: reference.attribute.clone(),
            })
    }

    /// Record a realized resource; the first record for an id wins
    pub fn insert(&mut self, resource: RealizedResource) {
        if self.index.contains_key(&resource.id) {
            return;
        }
        self.index.insert(resource.id.clone(), self.resources.len());
        self.resources.push(resource);
    }

    pub fn into_resources(self) -> Vec<RealizedResource> {
        self.resources
    }
}

impl FromIterator<RealizedResource> for Realization {
    fn from_iter<I: IntoIterator<Item = RealizedResource>>(iter: I) -> Self {
        let mut realization = Self::new();
        for resource in iter {
            realization.insert(resource);
        }
        realization
    }
}

/// Walks a [`DependencyGraph`] in topological order and hands every
/// descriptor to a [`Provisioner`]
///
/// # Example
///
/// ```
/// use declarative::{
///     DependencyGraph, MockProvisioner, Realizer, Reference, ResourceDescriptor, ResourceKind,
/// };
///
/// let mut graph = DependencyGraph::new();
/// graph.add(
///     ResourceDescriptor::builder("vpc", ResourceKind::Network)
///         .param("cidr", "10.0.0.0/16")
///         .build()?,
/// )?;
/// graph.add(
///     ResourceDescriptor::builder("web-sg", ResourceKind::SecurityGroup)
///         .param("network", Reference::id_of("vpc"))
///         .build()?,
/// )?;
///
/// let provisioner = MockProvisioner::new();
/// let realization = Realizer::default().run(&graph, &provisioner)?;
/// assert_eq!(realization.ids(), ["vpc", "web-sg"]);
/// # Ok::<(), declarative::Error>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct Realizer {
    options: RealizeOptions,
}

impl Realizer {
    pub fn new(options: RealizeOptions) -> Self {
        Self { options }
    }

    /// Realize every descriptor of `graph`
    pub fn run<P: Provisioner>(
        &self,
        graph: &DependencyGraph,
        provisioner: &P,
    ) -> Result<Realization> {
        self.run_with_progress(graph, provisioner, &mut NoProgress)
    }

    /// Realize every descriptor of `graph`, reporting to `progress`
    ///
    /// Stops at the first failure. With `jobs > 1` the members of one wave
    /// from [`DependencyGraph::waves`] are provisioned concurrently, so
    /// siblings of a failing descriptor in the same wave may still complete;
    /// they are reported as realized before the error is returned.
    pub fn run_with_progress<P, C>(
        &self,
        graph: &DependencyGraph,
        provisioner: &P,
        progress: &mut C,
    ) -> Result<Realization>
    where
        P: Provisioner,
        C: ProgressCallback,
    {
        if self.options.jobs <= 1 {
            run_sequential(graph, provisioner, progress)
        } else {
            run_waves(graph, provisioner, progress, self.options.jobs)
        }
    }
}

fn run_sequential<P, C>(
    graph: &DependencyGraph,
    provisioner: &P,
    progress: &mut C,
) -> Result<Realization>
where
    P: Provisioner,
    C: ProgressCallback,
{
    let order = graph.ordered()?;
    let mut realization = Realization::new();
    progress.on_start(order.len());
    log::info!("Realizing {} resources", order.len());

    for descriptor in order {
        progress.on_realizing(descriptor.id(), descriptor.kind());
        match realize_one(descriptor, &realization, provisioner) {
            Ok(resource) => {
                progress.on_realized(&resource);
                realization.insert(resource);
            }
            Err(e) => {
                log::warn!("Failed to realize '{}': {e}", descriptor.id());
                progress.on_failed(descriptor.id(), &e.to_string());
                return Err(e);
            }
        }
    }

    Ok(realization)
}

fn run_waves<P, C>(
    graph: &DependencyGraph,
    provisioner: &P,
    progress: &mut C,
    jobs: usize,
) -> Result<Realization>
where
    P: Provisioner,
    C: ProgressCallback,
{
    let waves = graph.waves()?;
    let total = waves.iter().map(Vec::len).sum();
    let mut realization = Realization::new();
    progress.on_start(total);
    log::info!(
        "Realizing {total} resources in {} waves with {jobs} jobs",
        waves.len()
    );

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(jobs)
        .build()
        .map_err(|e| Error::ThreadPool(e.to_string()))?;

    for wave in waves {
        for descriptor in &wave {
            progress.on_realizing(descriptor.id(), descriptor.kind());
        }

        // Substitution only reads earlier waves; each result fills its own slot
        let results: Vec<Result<RealizedResource>> = pool.install(|| {
            wave.par_iter()
                .map(|descriptor| realize_one(descriptor, &realization, provisioner))
                .collect()
        });

        let mut first_error = None;
        for (descriptor, result) in wave.iter().zip(results) {
            match result {
                Ok(resource) => {
                    progress.on_realized(&resource);
                    realization.insert(resource);
                }
                Err(e) => {
                    log::warn!("Failed to realize '{}': {e}", descriptor.id());
                    progress.on_failed(descriptor.id(), &e.to_string());
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }

        if let Some(e) = first_error {
            return Err(e);
        }
    }

    Ok(realization)
}

/// Substitute realized attributes into `descriptor` and provision it
fn realize_one<P: Provisioner>(
    descriptor: &ResourceDescriptor,
    realized: &Realization,
    provisioner: &P,
) -> Result<RealizedResource> {
    let resolved = descriptor.resolve(|reference| realized.resolve(descriptor.id(), reference))?;
    log::debug!("Provisioning {} '{}'", descriptor.kind(), descriptor.id());

    let resource = provisioner
        .create(&resolved)
        .map_err(|e| Error::provision(descriptor.id(), e))?;

    if resource.id != descriptor.id() {
        return Err(Error::provision(
            descriptor.id(),
            format!("provisioner returned resource '{}'", resource.id),
        ));
    }

    log::info!(
        "Realized {} '{}' as {}",
        descriptor.kind(),
        descriptor.id(),
        resource.provider_id
    );
    Ok(resource)
}
