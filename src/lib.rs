//! # stackwright
//!
//! Declarative cloud stacks: networks, instances, buckets, roles and
//! databases declared as data and realized in dependency order.
//!
//! Stacks come from TOML files ([`Stack::load`]) or built-in layouts
//! ([`layouts::web_app_stack`]). [`deploy::deploy`] realizes them through
//! any [`declarative::Provisioner`]; [`simulate::SimulatedProvisioner`]
//! runs entirely offline.
//!
//! ```
//! use stackwright::layouts::{StackSettings, web_app_stack};
//! use stackwright::simulate::SimulatedProvisioner;
//! use stackwright::{NoProgress, RealizeOptions, deploy};
//!
//! let stack = web_app_stack(&StackSettings::default())?;
//! let provisioner = SimulatedProvisioner::new(stack.name(), "us-east-1");
//! let report = deploy(&stack, &provisioner, &RealizeOptions::default(), &mut NoProgress)?;
//! assert!(report.output("DevLocation").unwrap().starts_with("http://"));
//! # Ok::<(), anyhow::Error>(())
//! ```

pub mod deploy;
pub mod layouts;
pub mod logging;
pub mod paths;
pub mod schema;
pub mod simulate;
pub mod stack;
pub mod state;

pub use declarative::{
    DependencyGraph, Error, NoProgress, Output, OutputSpec, ProgressCallback, Provisioner,
    RealizeOptions, RealizedResource, Reference, ResourceDescriptor, ResourceKind, Value,
};
pub use deploy::{DeployReport, Plan, deploy, deploy_recorded, plan};
pub use stack::Stack;
pub use state::{RealizedState, StateRecorder};
