//! Provisioner and progress traits
//!
//! These traits keep the core free of any cloud SDK or UI dependency:
//! resources are only ever created through an injected [`Provisioner`].

use crate::descriptor::ResourceDescriptor;
use crate::types::{RealizedResource, ResourceKind, ResourceStatus};
use anyhow::Result;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;

/// Capability that creates resources
///
/// Implementations wrap a cloud SDK or API. They receive descriptors whose
/// references have already been replaced by the realized attributes of their
/// dependencies. Retries and timeouts are the implementation's concern.
pub trait Provisioner: Send + Sync {
    /// Create the resource described by `descriptor`
    fn create(&self, descriptor: &ResourceDescriptor) -> Result<RealizedResource>;
}

impl<P: Provisioner + ?Sized> Provisioner for &P {
    fn create(&self, descriptor: &ResourceDescriptor) -> Result<RealizedResource> {
        (**self).create(descriptor)
    }
}

/// Progress callback for realization runs
///
/// Events arrive on the calling thread, in realization order.
pub trait ProgressCallback: Send {
    /// Called once before the first descriptor with the number of descriptors
    fn on_start(&mut self, total: usize);

    /// Called when a descriptor is handed to the provisioner
    fn on_realizing(&mut self, id: &str, kind: ResourceKind);

    /// Called when a descriptor has been realized
    fn on_realized(&mut self, resource: &RealizedResource);

    /// Called when realizing a descriptor failed
    fn on_failed(&mut self, id: &str, error: &str);
}

/// No-op progress callback
pub struct NoProgress;

impl ProgressCallback for NoProgress {
    fn on_start(&mut self, _total: usize) {}
    fn on_realizing(&mut self, _id: &str, _kind: ResourceKind) {}
    fn on_realized(&mut self, _resource: &RealizedResource) {}
    fn on_failed(&mut self, _id: &str, _error: &str) {}
}

/// Progress callback that tracks the lifecycle status of each descriptor
#[derive(Debug, Default)]
pub struct StatusTracker {
    statuses: BTreeMap<String, ResourceStatus>,
}

impl StatusTracker {
    /// Track every descriptor of `ids`, starting as declared
    pub fn new<'a>(ids: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            statuses: ids
                .into_iter()
                .map(|id| (id.to_string(), ResourceStatus::Declared))
                .collect(),
        }
    }

    pub fn status(&self, id: &str) -> Option<ResourceStatus> {
        self.statuses.get(id).copied()
    }

    /// Ids currently in `status`, sorted
    pub fn with_status(&self, status: ResourceStatus) -> Vec<&str> {
        self.statuses
            .iter()
            .filter(|(_, s)| **s == status)
            .map(|(id, _)| id.as_str())
            .collect()
    }
}

impl ProgressCallback for StatusTracker {
    fn on_start(&mut self, _total: usize) {}

    fn on_realizing(&mut self, id: &str, _kind: ResourceKind) {
        self.statuses.insert(id.to_string(), ResourceStatus::Realizing);
    }

    fn on_realized(&mut self, resource: &RealizedResource) {
        self.statuses.insert(resource.id.clone(), ResourceStatus::Realized);
    }

    fn on_failed(&mut self, id: &str, _error: &str) {
        self.statuses.insert(id.to_string(), ResourceStatus::Failed);
    }
}

/// In-memory provisioner for tests
///
/// Assigns `<kind>-<n>` identifiers, records every descriptor it receives
/// and fails on configured ids.
#[derive(Debug, Default)]
pub struct MockProvisioner {
    calls: Mutex<Vec<ResourceDescriptor>>,
    failures: HashSet<String>,
    attributes: HashMap<String, BTreeMap<String, String>>,
}

impl MockProvisioner {
    /// Create a new mock that succeeds for every descriptor
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail when asked to create `id`
    pub fn fail_on(mut self, id: impl Into<String>) -> Self {
        self.failures.insert(id.into());
        self
    }

    /// Report an extra attribute when `id` is created
    pub fn with_attribute(
        mut self,
        id: impl Into<String>,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.attributes
            .entry(id.into())
            .or_default()
            .insert(name.into(), value.into());
        self
    }

    /// Descriptors passed to `create`, in call order
    pub fn calls(&self) -> Vec<ResourceDescriptor> {
        self.calls
            .lock()
            .map(|c| c.clone())
            .unwrap_or_default()
    }

    /// Ids passed to `create`, in call order
    pub fn call_ids(&self) -> Vec<String> {
        self.calls()
            .iter()
            .map(|d| d.id().to_string())
            .collect()
    }
}

impl Provisioner for MockProvisioner {
    fn create(&self, descriptor: &ResourceDescriptor) -> Result<RealizedResource> {
        let n = {
            let mut calls = self
                .calls
                .lock()
                .map_err(|_| anyhow::anyhow!("mock provisioner lock poisoned"))?;
            calls.push(descriptor.clone());
            calls.len()
        };

        if self.failures.contains(descriptor.id()) {
            anyhow::bail!("simulated failure creating {}", descriptor.id());
        }

        let mut realized =
            RealizedResource::new(descriptor.id(), format!("{}-{n}", descriptor.kind()));
        if let Some(extra) = self.attributes.get(descriptor.id()) {
            for (name, value) in extra {
                realized = realized.with_attribute(name.clone(), value.clone());
            }
        }
        Ok(realized)
    }
}
