//! # Declarative
//!
//! A framework for declarative resource provisioning.
//!
//! This crate provides the core abstractions for declaring infrastructure
//! objects, ordering them by their dependencies and realizing them through
//! an injected provisioner.
//!
//! ## Core Concepts
//!
//! - **ResourceDescriptor**: Immutable declaration of one object (network,
//!   instance, bucket, role, ...) and the resources it references
//! - **DependencyGraph**: Owns descriptors and yields a deterministic
//!   topological realization order
//! - **Realizer**: Walks the order, substitutes realized attributes into
//!   dependents and calls the provisioner
//! - **OutputCollector**: Resolves named values from realized resources
//!
//! ## Example
//!
//! ```
//! use declarative::{
//!     DependencyGraph, MockProvisioner, OutputCollector, OutputSpec, Realizer, Reference,
//!     ResourceDescriptor, ResourceKind,
//! };
//!
//! let mut graph = DependencyGraph::new();
//! graph.add(
//!     ResourceDescriptor::builder("vpc", ResourceKind::Network)
//!         .param("cidr", "30.0.0.0/16")
//!         .build()?,
//! )?;
//! graph.add(
//!     ResourceDescriptor::builder("web-sg", ResourceKind::SecurityGroup)
//!         .param("network", Reference::id_of("vpc"))
//!         .build()?,
//! )?;
//!
//! let provisioner = MockProvisioner::new();
//! let realization = Realizer::default().run(&graph, &provisioner)?;
//!
//! let mut outputs = OutputCollector::new();
//! outputs.add(OutputSpec::new("VpcId", "Network id", Reference::id_of("vpc")))?;
//! let values = outputs.collect(&realization)?;
//! assert_eq!(values[0].value, "network-1");
//! # Ok::<(), declarative::Error>(())
//! ```
//!
//! ## Provider Traits
//!
//! The crate uses traits for dependency injection:
//!
//! - [`Provisioner`]: Creates resources (wraps a cloud SDK or API)
//! - [`ProgressCallback`]: Receives realization progress updates
//!
//! This allows the crate to be used and tested without any cloud SDK.

pub mod descriptor;
pub mod error;
pub mod graph;
pub mod outputs;
pub mod provisioner;
pub mod realizer;
pub mod types;

// Re-export main types at crate root
pub use descriptor::{DescriptorBuilder, ResourceDescriptor, parse_ipv4_cidr};
pub use error::{BoxError, Error, Result};
pub use graph::DependencyGraph;
pub use outputs::{OutputCollector, collect};
pub use provisioner::{MockProvisioner, NoProgress, ProgressCallback, Provisioner, StatusTracker};
pub use realizer::{Realization, Realizer};
pub use types::{
    Output, OutputSpec, Parameters, RealizeOptions, RealizedResource, Reference, ResourceKind,
    ResourceStatus, Value,
};
