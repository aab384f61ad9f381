//! Core types for declarative resource provisioning

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Category of infrastructure object a descriptor declares
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// Virtual network
    Network,
    /// Subnet carved out of a network
    Subnet,
    /// Firewall group attached to instances or databases
    SecurityGroup,
    /// Inbound rule of a security group
    IngressRule,
    /// Compute instance
    Instance,
    /// Object storage bucket
    Bucket,
    /// IAM role
    Role,
    /// IAM policy attached to roles
    Policy,
    /// Managed relational database instance
    Database,
}

impl ResourceKind {
    /// All kinds, in declaration order
    pub const ALL: [ResourceKind; 9] = [
        Self::Network,
        Self::Subnet,
        Self::SecurityGroup,
        Self::IngressRule,
        Self::Instance,
        Self::Bucket,
        Self::Role,
        Self::Policy,
        Self::Database,
    ];

    /// Stable snake_case name, matching the serialized form
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Subnet => "subnet",
            Self::SecurityGroup => "security_group",
            Self::IngressRule => "ingress_rule",
            Self::Instance => "instance",
            Self::Bucket => "bucket",
            Self::Role => "role",
            Self::Policy => "policy",
            Self::Database => "database",
        }
    }

    /// Parse a snake_case kind name
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == name)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reference to an attribute of another descriptor's realized resource
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Reference {
    /// Id of the referenced descriptor
    pub resource: String,
    /// Attribute of the realized resource; `id` is the provider identifier
    pub attribute: String,
}

impl Reference {
    /// Attribute name that resolves to the provider-assigned identifier
    pub const ID: &'static str = "id";

    /// Reference an arbitrary attribute
    pub fn new(resource: impl Into<String>, attribute: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            attribute: attribute.into(),
        }
    }

    /// Reference the provider identifier of a resource
    pub fn id_of(resource: impl Into<String>) -> Self {
        Self::new(resource, Self::ID)
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.resource, self.attribute)
    }
}

/// A parameter value: a scalar, a list, or a reference
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Value {
    String(String),
    Integer(i64),
    Bool(bool),
    List(Vec<Value>),
    Ref(Reference),
}

impl Value {
    /// Borrow as a string, if this is a string value
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_reference(&self) -> Option<&Reference> {
        match self {
            Self::Ref(r) => Some(r),
            _ => None,
        }
    }

    /// Push every reference contained in this value, depth first
    pub(crate) fn collect_refs<'a>(&'a self, out: &mut Vec<&'a Reference>) {
        match self {
            Self::Ref(r) => out.push(r),
            Self::List(items) => {
                for item in items {
                    item.collect_refs(out);
                }
            }
            _ => {}
        }
    }

    /// Human-readable type name used in validation messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::String(_) => "string",
            Self::Integer(_) => "integer",
            Self::Bool(_) => "bool",
            Self::List(_) => "list",
            Self::Ref(_) => "reference",
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<u16> for Value {
    fn from(value: u16) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<Reference> for Value {
    fn from(value: Reference) -> Self {
        Self::Ref(value)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(values: Vec<T>) -> Self {
        Self::List(values.into_iter().map(Into::into).collect())
    }
}

/// Named parameters of a descriptor, sorted for deterministic output
pub type Parameters = BTreeMap<String, Value>;

/// A resource that the provisioner has created
///
/// Built by a provisioner and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RealizedResource {
    /// Id of the descriptor this resource realizes
    pub id: String,
    /// Identifier assigned by the provider (e.g. `vpc-0abc...`)
    pub provider_id: String,
    /// Output attributes such as public addresses or ARNs
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl RealizedResource {
    pub fn new(id: impl Into<String>, provider_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            provider_id: provider_id.into(),
            attributes: BTreeMap::new(),
        }
    }

    /// Add an output attribute
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Look up an attribute; `id` always yields the provider identifier
    pub fn attribute(&self, name: &str) -> Option<&str> {
        if name == Reference::ID {
            return Some(&self.provider_id);
        }
        self.attributes.get(name).map(String::as_str)
    }
}

/// Where a descriptor is in its realization lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResourceStatus {
    /// Declared in the graph, not yet touched
    Declared,
    /// Handed to the provisioner
    Realizing,
    /// Provisioned successfully
    Realized,
    /// Provisioning failed; terminal
    Failed,
}

impl ResourceStatus {
    /// Whether no further transition is possible
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Realized | Self::Failed)
    }
}

/// Declaration of a named output value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputSpec {
    pub name: String,
    pub description: String,
    /// Attribute the value is read from
    pub source: Reference,
    /// Optional template; `{value}` is replaced by the attribute value
    #[serde(default)]
    pub template: Option<String>,
}

impl OutputSpec {
    pub fn new(name: impl Into<String>, description: impl Into<String>, source: Reference) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            source,
            template: None,
        }
    }

    /// Render the attribute value through a template such as `http://{value}`
    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = Some(template.into());
        self
    }
}

/// A resolved output value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Output {
    pub name: String,
    pub description: String,
    pub value: String,
}

/// Options for a realization run
#[derive(Debug, Clone)]
pub struct RealizeOptions {
    /// Number of parallel provisioner calls; 1 means a strictly sequential walk
    pub jobs: usize,
}

impl Default for RealizeOptions {
    fn default() -> Self {
        Self { jobs: 1 }
    }
}

impl RealizeOptions {
    pub fn with_jobs(jobs: usize) -> Self {
        Self { jobs: jobs.max(1) }
    }
}
