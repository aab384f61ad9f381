//! Resource descriptors
//!
//! A [`ResourceDescriptor`] is the immutable declaration of one
//! infrastructure object before it exists. Descriptors are validated when
//! built, so a graph only ever holds well-formed declarations.

use crate::error::{Error, Result};
use crate::types::{Parameters, Reference, ResourceKind, Value};
use regex::Regex;
use serde::Serialize;
use std::net::Ipv4Addr;
use std::sync::LazyLock;

static ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_.-]+$").expect("valid id regex"));

static BUCKET_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9][a-z0-9.-]{1,61}[a-z0-9]$").expect("valid bucket name regex")
});

static PRINCIPAL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9-]+\.amazonaws\.com$").expect("valid service principal regex")
});

static ACTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9-]+:[A-Za-z0-9*]+$").expect("valid policy action regex")
});

const SUBNET_TYPES: [&str; 3] = ["public", "private_isolated", "private_with_egress"];
const PROTOCOLS: [&str; 2] = ["tcp", "udp"];

/// Declaration of a single infrastructure object
///
/// # Example
///
/// ```
/// use declarative::{Reference, ResourceDescriptor, ResourceKind};
///
/// let sg = ResourceDescriptor::builder("web-sg", ResourceKind::SecurityGroup)
///     .param("network", Reference::id_of("vpc"))
///     .param("allow_all_outbound", true)
///     .build()?;
///
/// assert_eq!(sg.references(), ["vpc"]);
/// # Ok::<(), declarative::Error>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceDescriptor {
    id: String,
    kind: ResourceKind,
    parameters: Parameters,
    references: Vec<String>,
}

impl ResourceDescriptor {
    /// Start building a descriptor
    pub fn builder(id: impl Into<String>, kind: ResourceKind) -> DescriptorBuilder {
        DescriptorBuilder {
            id: id.into(),
            kind,
            parameters: Parameters::new(),
            depends_on: Vec::new(),
        }
    }

    /// Build and validate a descriptor from its parts
    ///
    /// `depends_on` lists ordering-only dependencies; ids named by
    /// references inside `parameters` are added after them.
    pub fn new(
        id: impl Into<String>,
        kind: ResourceKind,
        parameters: Parameters,
        depends_on: Vec<String>,
    ) -> Result<Self> {
        let id = id.into();

        let mut references: Vec<String> = Vec::new();
        let mut refs = Vec::new();
        for value in parameters.values() {
            value.collect_refs(&mut refs);
        }
        for dep in depends_on
            .into_iter()
            .chain(refs.into_iter().map(|r| r.resource.clone()))
        {
            if !references.contains(&dep) {
                references.push(dep);
            }
        }

        let descriptor = Self {
            id,
            kind,
            parameters,
            references,
        };
        descriptor.validate()?;
        Ok(descriptor)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    /// Look up a single parameter
    pub fn param(&self, name: &str) -> Option<&Value> {
        self.parameters.get(name)
    }

    /// Ids this descriptor depends on, in declaration order
    pub fn references(&self) -> &[String] {
        &self.references
    }

    /// Copy of this descriptor with every reference replaced by the string
    /// returned from `lookup`
    ///
    /// The copy keeps `references` so the provisioner can still see the
    /// dependency ids. It is not re-validated: a resolved descriptor no longer
    /// carries the references its kind requires.
    pub fn resolve<F>(&self, mut lookup: F) -> Result<Self>
    where
        F: FnMut(&Reference) -> Result<String>,
    {
        let mut parameters = Parameters::new();
        for (name, value) in &self.parameters {
            parameters.insert(name.clone(), substitute(value, &mut lookup)?);
        }
        Ok(Self {
            id: self.id.clone(),
            kind: self.kind,
            parameters,
            references: self.references.clone(),
        })
    }

    /// Whether any parameter still holds a reference
    pub fn has_unresolved_references(&self) -> bool {
        let mut refs = Vec::new();
        for value in self.parameters.values() {
            value.collect_refs(&mut refs);
        }
        !refs.is_empty()
    }

    fn validate(&self) -> Result<()> {
        if self.id.is_empty() || !ID_RE.is_match(&self.id) {
            return Err(Error::validation(
                &self.id,
                self.kind,
                "id must be non-empty and use only letters, digits, '-', '_' and '.'",
            ));
        }
        if self.references.iter().any(|r| r == &self.id) {
            return Err(Error::validation(
                &self.id,
                self.kind,
                "a resource cannot depend on itself",
            ));
        }

        let check = Checker { descriptor: self };
        match self.kind {
            ResourceKind::Network => {
                let prefix = check.cidr("cidr")?;
                if !(8..=28).contains(&prefix) {
                    return Err(check.fail(format!("network prefix /{prefix} outside /8../28")));
                }
                check.optional_int_in("max_azs", 1, 6)?;
            }
            ResourceKind::Subnet => {
                check.reference("network")?;
                check.one_of("subnet_type", &SUBNET_TYPES)?;
                check.int_in("cidr_mask", 16, 28)?;
            }
            ResourceKind::SecurityGroup => {
                check.reference("network")?;
                check.optional_bool("allow_all_outbound")?;
                check.optional_str("description")?;
            }
            ResourceKind::IngressRule => {
                check.reference("security_group")?;
                check.one_of("protocol", &PROTOCOLS)?;
                check.int_in("port", 0, 65535)?;
                if self.parameters.contains_key("peer") {
                    check.cidr("peer")?;
                }
                check.optional_str("description")?;
            }
            ResourceKind::Instance => {
                check.string("instance_type")?;
                check.reference("subnet")?;
                check.optional_reference("security_group")?;
                check.optional_reference("role")?;
                check.optional_strings("user_data")?;
                check.optional_str("key_name")?;
                check.optional_bool("source_dest_check")?;
            }
            ResourceKind::Bucket => {
                let name = check.string("bucket_name")?;
                if !BUCKET_RE.is_match(name) || name.contains("..") {
                    return Err(check.fail(format!("'{name}' is not a valid bucket name")));
                }
            }
            ResourceKind::Role => {
                let principal = check.string("assumed_by")?;
                if !PRINCIPAL_RE.is_match(principal) {
                    return Err(check.fail(format!(
                        "'{principal}' is not a service principal like 'ec2.amazonaws.com'"
                    )));
                }
                check.optional_strings("managed_policies")?;
            }
            ResourceKind::Policy => {
                let actions = check.non_empty_list("actions")?;
                for action in actions {
                    match action.as_str() {
                        Some(a) if ACTION_RE.is_match(a) => {}
                        _ => {
                            return Err(check.fail(format!(
                                "policy action {action:?} is not of the form 'service:Action'"
                            )));
                        }
                    }
                }
                let roles = check.non_empty_list("roles")?;
                if roles.iter().any(|r| r.as_reference().is_none()) {
                    return Err(check.fail("'roles' must only contain references"));
                }
            }
            ResourceKind::Database => {
                check.string("engine")?;
                check.string("instance_type")?;
                check.reference("subnet")?;
                if let Some(groups) = self.parameters.get("security_groups") {
                    let ok = groups
                        .as_list()
                        .is_some_and(|items| items.iter().all(|g| g.as_reference().is_some()));
                    if !ok {
                        return Err(check.fail("'security_groups' must be a list of references"));
                    }
                }
                check.optional_str("database_name")?;
            }
        }
        Ok(())
    }
}

/// Builder for [`ResourceDescriptor`]
#[derive(Debug, Clone)]
pub struct DescriptorBuilder {
    id: String,
    kind: ResourceKind,
    parameters: Parameters,
    depends_on: Vec<String>,
}

impl DescriptorBuilder {
    /// Set a parameter
    pub fn param(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.insert(name.into(), value.into());
        self
    }

    /// Add an ordering-only dependency
    pub fn depends_on(mut self, id: impl Into<String>) -> Self {
        self.depends_on.push(id.into());
        self
    }

    /// Validate and build the descriptor
    pub fn build(self) -> Result<ResourceDescriptor> {
        ResourceDescriptor::new(self.id, self.kind, self.parameters, self.depends_on)
    }
}

fn substitute<F>(value: &Value, lookup: &mut F) -> Result<Value>
where
    F: FnMut(&Reference) -> Result<String>,
{
    Ok(match value {
        Value::Ref(reference) => Value::String(lookup(reference)?),
        Value::List(items) => Value::List(
            items
                .iter()
                .map(|item| substitute(item, lookup))
                .collect::<Result<_>>()?,
        ),
        other => other.clone(),
    })
}

/// Parse `a.b.c.d/n` into its address and prefix length
pub fn parse_ipv4_cidr(cidr: &str) -> Option<(Ipv4Addr, u8)> {
    let (addr, prefix) = cidr.split_once('/')?;
    let addr: Ipv4Addr = addr.parse().ok()?;
    let prefix: u8 = prefix.parse().ok()?;
    (prefix <= 32).then_some((addr, prefix))
}

/// Parameter checks for one descriptor
struct Checker<'a> {
    descriptor: &'a ResourceDescriptor,
}

impl<'a> Checker<'a> {
    fn fail(&self, message: impl Into<String>) -> Error {
        Error::validation(&self.descriptor.id, self.descriptor.kind, message)
    }

    fn get(&self, name: &str) -> Result<&'a Value> {
        self.descriptor
            .parameters
            .get(name)
            .ok_or_else(|| self.fail(format!("missing required parameter '{name}'")))
    }

    fn wrong_type(&self, name: &str, expected: &str, found: &Value) -> Error {
        self.fail(format!(
            "parameter '{name}' must be a {expected}, found {}",
            found.type_name()
        ))
    }

    fn string(&self, name: &str) -> Result<&'a str> {
        let value = self.get(name)?;
        match value.as_str() {
            Some(s) if !s.trim().is_empty() => Ok(s),
            Some(_) => Err(self.fail(format!("parameter '{name}' must not be empty"))),
            None => Err(self.wrong_type(name, "string", value)),
        }
    }

    fn optional_str(&self, name: &str) -> Result<()> {
        match self.descriptor.parameters.get(name) {
            None | Some(Value::String(_)) => Ok(()),
            Some(other) => Err(self.wrong_type(name, "string", other)),
        }
    }

    fn optional_bool(&self, name: &str) -> Result<()> {
        match self.descriptor.parameters.get(name) {
            None | Some(Value::Bool(_)) => Ok(()),
            Some(other) => Err(self.wrong_type(name, "bool", other)),
        }
    }

    fn int_in(&self, name: &str, min: i64, max: i64) -> Result<i64> {
        let value = self.get(name)?;
        let n = value
            .as_integer()
            .ok_or_else(|| self.wrong_type(name, "integer", value))?;
        if !(min..=max).contains(&n) {
            return Err(self.fail(format!("parameter '{name}' = {n} outside {min}..={max}")));
        }
        Ok(n)
    }

    fn optional_int_in(&self, name: &str, min: i64, max: i64) -> Result<()> {
        if self.descriptor.parameters.contains_key(name) {
            self.int_in(name, min, max)?;
        }
        Ok(())
    }

    fn one_of(&self, name: &str, allowed: &[&str]) -> Result<&'a str> {
        let s = self.string(name)?;
        if !allowed.contains(&s) {
            return Err(self.fail(format!(
                "parameter '{name}' = '{s}' must be one of: {}",
                allowed.join(", ")
            )));
        }
        Ok(s)
    }

    fn cidr(&self, name: &str) -> Result<u8> {
        let s = self.string(name)?;
        parse_ipv4_cidr(s)
            .map(|(_, prefix)| prefix)
            .ok_or_else(|| self.fail(format!("parameter '{name}' = '{s}' is not an IPv4 CIDR")))
    }

    fn reference(&self, name: &str) -> Result<&'a Reference> {
        let value = self.get(name)?;
        value
            .as_reference()
            .ok_or_else(|| self.wrong_type(name, "reference", value))
    }

    fn optional_reference(&self, name: &str) -> Result<()> {
        if self.descriptor.parameters.contains_key(name) {
            self.reference(name)?;
        }
        Ok(())
    }

    fn non_empty_list(&self, name: &str) -> Result<&'a [Value]> {
        let value = self.get(name)?;
        let items = value
            .as_list()
            .ok_or_else(|| self.wrong_type(name, "list", value))?;
        if items.is_empty() {
            return Err(self.fail(format!("parameter '{name}' must not be empty")));
        }
        Ok(items)
    }

    fn optional_strings(&self, name: &str) -> Result<()> {
        match self.descriptor.parameters.get(name) {
            None => Ok(()),
            Some(Value::List(items)) if items.iter().all(|i| i.as_str().is_some()) => Ok(()),
            Some(other) => Err(self.wrong_type(name, "list of strings", other)),
        }
    }
}
