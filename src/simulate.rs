//! Offline provisioner that synthesizes realistic cloud identifiers
//!
//! Identifiers are derived from a BLAKE3 hash of the stack name and
//! descriptor id, so repeated deploys of the same stack produce the same
//! values.

use anyhow::{Result, bail};
use blake3::Hasher;
use declarative::{Provisioner, RealizedResource, ResourceDescriptor, ResourceKind, Value};
use std::collections::HashSet;

/// Hex characters in a synthesized identifier suffix
const ID_SUFFIX_LEN: usize = 17;

/// [`Provisioner`] that never leaves the process
#[derive(Debug, Clone)]
pub struct SimulatedProvisioner {
    stack: String,
    region: String,
    account: String,
    failures: HashSet<String>,
}

impl SimulatedProvisioner {
    pub fn new(stack: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            stack: stack.into(),
            region: region.into(),
            account: "123456789012".to_string(),
            failures: HashSet::new(),
        }
    }

    /// Account id used in ARNs
    pub fn with_account(mut self, account: impl Into<String>) -> Self {
        self.account = account.into();
        self
    }

    /// Fail when asked to create `id`
    pub fn fail_on(mut self, id: impl Into<String>) -> Self {
        self.failures.insert(id.into());
        self
    }

    fn digest(&self, id: &str) -> blake3::Hash {
        let mut hasher = Hasher::new();
        hasher.update(self.stack.as_bytes());
        hasher.update(b"/");
        hasher.update(id.as_bytes());
        hasher.finalize()
    }

    fn arn(&self, service: &str, resource: &str) -> String {
        format!("arn:aws:{service}::{}:{resource}", self.account)
    }

    fn public_dns_name(&self, octets: [u8; 4]) -> String {
        let [a, b, c, d] = octets;
        if self.region == "us-east-1" {
            format!("ec2-{a}-{b}-{c}-{d}.compute-1.amazonaws.com")
        } else {
            format!("ec2-{a}-{b}-{c}-{d}.{}.compute.amazonaws.com", self.region)
        }
    }
}

impl Provisioner for SimulatedProvisioner {
    fn create(&self, descriptor: &ResourceDescriptor) -> Result<RealizedResource> {
        let id = descriptor.id();
        if self.failures.contains(id) {
            bail!("simulated failure creating {} '{id}'", descriptor.kind());
        }

        let digest = self.digest(id);
        let hex = digest.to_hex();
        let suffix = &hex.as_str()[..ID_SUFFIX_LEN];
        let bytes = digest.as_bytes();
        let text = |name: &str| descriptor.param(name).and_then(Value::as_str);

        let resource = match descriptor.kind() {
            ResourceKind::Network => RealizedResource::new(id, format!("vpc-{suffix}"))
                .with_attribute("cidr", text("cidr").unwrap_or_default()),
            ResourceKind::Subnet => {
                let mask = descriptor
                    .param("cidr_mask")
                    .and_then(Value::as_integer)
                    .unwrap_or(24);
                RealizedResource::new(id, format!("subnet-{suffix}"))
                    .with_attribute("cidr", format!("10.{}.{}.0/{mask}", bytes[0], bytes[1]))
                    .with_attribute("availability_zone", format!("{}a", self.region))
            }
            ResourceKind::SecurityGroup => RealizedResource::new(id, format!("sg-{suffix}")),
            ResourceKind::IngressRule => RealizedResource::new(id, format!("sgr-{suffix}")),
            ResourceKind::Instance => {
                let public = [bytes[0].max(3), bytes[1], bytes[2], bytes[3]];
                RealizedResource::new(id, format!("i-{suffix}"))
                    .with_attribute("private_ip", format!("10.0.{}.{}", bytes[4], bytes[5].max(4)))
                    .with_attribute("public_ip", public.map(|o| o.to_string()).join("."))
                    .with_attribute("public_dns_name", self.public_dns_name(public))
            }
            ResourceKind::Bucket => {
                let name = text("bucket_name").unwrap_or(id);
                RealizedResource::new(id, name)
                    .with_attribute("bucket_name", name)
                    .with_attribute("arn", format!("arn:aws:s3:::{name}"))
            }
            ResourceKind::Role => {
                let name = format!("{}-{id}-{}", self.stack, &suffix[..8]);
                RealizedResource::new(id, name.clone())
                    .with_attribute("arn", self.arn("iam", &format!("role/{name}")))
            }
            ResourceKind::Policy => {
                let name = format!("{}-{id}-{}", self.stack, &suffix[..8]);
                RealizedResource::new(id, name.clone())
                    .with_attribute("arn", self.arn("iam", &format!("policy/{name}")))
            }
            ResourceKind::Database => {
                let identifier = text("instance_identifier").unwrap_or(id);
                let port = match text("engine") {
                    Some("postgres") => "5432",
                    _ => "3306",
                };
                RealizedResource::new(id, identifier)
                    .with_attribute(
                        "endpoint",
                        format!("{identifier}.{}.{}.rds.amazonaws.com", &suffix[..12], self.region),
                    )
                    .with_attribute("port", port)
            }
        };

        log::debug!("Simulated {} '{id}' as {}", descriptor.kind(), resource.provider_id);
        Ok(resource)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use declarative::Reference;

    fn instance() -> ResourceDescriptor {
        ResourceDescriptor::builder("dev-web", ResourceKind::Instance)
            .param("instance_type", "t3.small")
            .param("subnet", Reference::id_of("public-subnet"))
            .build()
            .unwrap()
    }

    #[test]
    fn test_identifiers_are_deterministic() {
        let a = SimulatedProvisioner::new("web", "us-east-1");
        let b = SimulatedProvisioner::new("web", "us-east-1");
        let other = SimulatedProvisioner::new("other", "us-east-1");

        let first = a.create(&instance()).unwrap();
        assert_eq!(first, b.create(&instance()).unwrap());
        assert_ne!(first.provider_id, other.create(&instance()).unwrap().provider_id);

        assert!(first.provider_id.starts_with("i-"));
        assert_eq!(first.provider_id.len(), 2 + ID_SUFFIX_LEN);
    }

    #[test]
    fn test_instance_attributes() {
        let provisioner = SimulatedProvisioner::new("web", "eu-west-1");
        let realized = provisioner.create(&instance()).unwrap();
        let dns = realized.attribute("public_dns_name").unwrap();
        assert!(dns.starts_with("ec2-"));
        assert!(dns.ends_with(".eu-west-1.compute.amazonaws.com"));
        assert!(realized.attribute("private_ip").unwrap().starts_with("10.0."));
    }

    #[test]
    fn test_bucket_and_role_attributes() {
        let provisioner =
            SimulatedProvisioner::new("web", "us-east-1").with_account("111122223333");

        let bucket = ResourceDescriptor::builder("artifacts", ResourceKind::Bucket)
            .param("bucket_name", "artifact-store")
            .build()
            .unwrap();
        let realized = provisioner.create(&bucket).unwrap();
        assert_eq!(realized.provider_id, "artifact-store");
        assert_eq!(realized.attribute("bucket_name"), Some("artifact-store"));
        assert_eq!(realized.attribute("arn"), Some("arn:aws:s3:::artifact-store"));

        let role = ResourceDescriptor::builder("build-role", ResourceKind::Role)
            .param("assumed_by", "codebuild.amazonaws.com")
            .build()
            .unwrap();
        let realized = provisioner.create(&role).unwrap();
        assert!(realized.provider_id.starts_with("web-build-role-"));
        assert!(
            realized
                .attribute("arn")
                .unwrap()
                .starts_with("arn:aws:iam::111122223333:role/web-build-role-")
        );
    }

    #[test]
    fn test_database_endpoint() {
        let provisioner = SimulatedProvisioner::new("web", "us-east-1");
        let database = ResourceDescriptor::builder("database", ResourceKind::Database)
            .param("engine", "mysql")
            .param("instance_type", "db.t3.small")
            .param("instance_identifier", "my-rds")
            .param("subnet", Reference::id_of("private-subnet"))
            .build()
            .unwrap();
        let realized = provisioner.create(&database).unwrap();
        assert_eq!(realized.provider_id, "my-rds");
        assert!(
            realized
                .attribute("endpoint")
                .unwrap()
                .ends_with(".us-east-1.rds.amazonaws.com")
        );
        assert_eq!(realized.attribute("port"), Some("3306"));
    }

    #[test]
    fn test_fail_on() {
        let provisioner = SimulatedProvisioner::new("web", "us-east-1").fail_on("dev-web");
        let err = provisioner.create(&instance()).unwrap_err();
        assert!(err.to_string().contains("simulated failure"));
    }
}
