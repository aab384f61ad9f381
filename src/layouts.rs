//! Built-in stack layouts
//!
//! [`web_app_stack`] declares a CodeDeploy-managed web application: an
//! artifact bucket, build and deploy roles, a network with a public and an
//! isolated subnet, development and production web servers, a bastion host
//! and a private routing instance. With [`StackSettings::with_database`] a
//! MySQL database is added in the isolated subnet.

use crate::stack::Stack;
use declarative::{OutputSpec, Reference, ResourceDescriptor, ResourceKind};
use serde::{Deserialize, Serialize};

/// Knobs of the web application layout
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StackSettings {
    /// Stack name, also used to derive simulated identifiers
    pub name: String,
    /// Region substituted into the CodeDeploy agent download URL
    pub region: String,
    /// Network address range
    pub cidr: String,
    /// Availability zones the network spans
    pub max_azs: i64,
    pub bucket_name: String,
    /// SSH key pair of the private routing instance
    pub key_name: String,
    /// Add a MySQL database in the isolated subnet
    pub with_database: bool,
}

impl Default for StackSettings {
    fn default() -> Self {
        Self {
            name: "ec2-rds-stack".to_string(),
            region: "us-east-1".to_string(),
            cidr: "30.0.0.0/16".to_string(),
            max_azs: 2,
            bucket_name: "myfirstbucket-typescript-artifact".to_string(),
            key_name: "temp".to_string(),
            with_database: false,
        }
    }
}

const WEB_INSTANCE_TYPE: &str = "t3.small";
const SMALL_INSTANCE_TYPE: &str = "t3.nano";
const EC2_PRINCIPAL: &str = "ec2.amazonaws.com";

const CODEDEPLOY_RPM: &str = "codedeploy-agent.noarch.rpm";

/// Commands that install and start the CodeDeploy agent
pub fn codedeploy_user_data(region: &str) -> Vec<String> {
    vec![
        "#!/bin/bash -ex".to_string(),
        "yum install -y aws-cli".to_string(),
        "yum install -y git".to_string(),
        "cd /home/ec2-user/".to_string(),
        format!("wget https://aws-codedeploy-{region}.s3.amazonaws.com/latest/{CODEDEPLOY_RPM}"),
        format!("yum -y install {CODEDEPLOY_RPM}"),
        "service codedeploy-agent start".to_string(),
    ]
}

/// Commands that enable kernel-level packet forwarding
pub fn routing_user_data() -> Vec<String> {
    vec![
        "#!/bin/bash".to_string(),
        "sysctl -w net.ipv4.ip_forward=1".to_string(),
        "sysctl -w net.ipv6.conf.all.forwarding=1".to_string(),
    ]
}

/// Declare the web application stack described by `settings`
pub fn web_app_stack(settings: &StackSettings) -> declarative::Result<Stack> {
    let mut stack = Stack::new(
        settings.name.clone(),
        "Web application servers deployed through CodeDeploy",
    );

    declare_build_pipeline(&mut stack, settings)?;
    declare_network(&mut stack, settings)?;
    declare_web_servers(&mut stack, settings)?;
    declare_bastion(&mut stack)?;
    declare_private_instance(&mut stack, settings)?;
    if settings.with_database {
        declare_database(&mut stack)?;
    }

    declare_outputs(&mut stack, settings);
    Ok(stack)
}

fn declare_build_pipeline(stack: &mut Stack, settings: &StackSettings) -> declarative::Result<()> {
    stack.declare(
        ResourceDescriptor::builder("artifacts", ResourceKind::Bucket)
            .param("bucket_name", settings.bucket_name.as_str())
            .param("versioned", false)
            .param("auto_delete_objects", true),
    )?;

    stack.declare(
        ResourceDescriptor::builder("build-role", ResourceKind::Role)
            .param("assumed_by", "codebuild.amazonaws.com"),
    )?;
    stack.declare(
        ResourceDescriptor::builder("build-policy", ResourceKind::Policy)
            .param(
                "actions",
                vec![
                    "codecommit:GitPull",
                    "logs:CreateLogGroup",
                    "logs:CreateLogStream",
                    "logs:PutLogEvents",
                    "s3:GetObject",
                    "s3:GetObjectVersion",
                    "s3:PutObject",
                    "ssm:GetParameters",
                ],
            )
            .param("resources", vec!["*"])
            .param("roles", vec![Reference::id_of("build-role")]),
    )?;

    stack.declare(
        ResourceDescriptor::builder("deploy-role", ResourceKind::Role)
            .param("assumed_by", "codedeploy.amazonaws.com")
            .param("managed_policies", vec!["service-role/AWSCodeDeployRole"]),
    )?;

    stack.declare(
        ResourceDescriptor::builder("web-instance-role", ResourceKind::Role)
            .param("assumed_by", EC2_PRINCIPAL)
            .param(
                "managed_policies",
                vec!["AWSCodeDeployReadOnlyAccess", "AmazonEC2ReadOnlyAccess"],
            ),
    )?;
    stack.declare(
        ResourceDescriptor::builder("deployment-instance-policy", ResourceKind::Policy)
            .param("actions", vec!["s3:GetObject"])
            .param("resources", vec!["*"])
            .param("roles", vec![Reference::id_of("web-instance-role")]),
    )
}

fn declare_network(stack: &mut Stack, settings: &StackSettings) -> declarative::Result<()> {
    stack.declare(
        ResourceDescriptor::builder("vpc", ResourceKind::Network)
            .param("cidr", settings.cidr.as_str())
            .param("max_azs", settings.max_azs),
    )?;
    stack.declare(
        ResourceDescriptor::builder("public-subnet", ResourceKind::Subnet)
            .param("network", Reference::id_of("vpc"))
            .param("name", "VPC-tsc-Public")
            .param("subnet_type", "public")
            .param("cidr_mask", 24),
    )?;
    stack.declare(
        ResourceDescriptor::builder("private-subnet", ResourceKind::Subnet)
            .param("network", Reference::id_of("vpc"))
            .param("name", "VPC-tsc-Private")
            .param("subnet_type", "private_isolated")
            .param("cidr_mask", 24),
    )?;

    declare_security_group(stack, "web-sg", None, &[(80, None), (22, None)])?;
    declare_security_group(stack, "db-sg", None, &[(443, None)])
}

/// Security group with one tcp ingress rule per port, open to any IPv4 peer
fn declare_security_group(
    stack: &mut Stack,
    id: &str,
    description: Option<&str>,
    ports: &[(u16, Option<&str>)],
) -> declarative::Result<()> {
    let mut group = ResourceDescriptor::builder(id, ResourceKind::SecurityGroup)
        .param("network", Reference::id_of("vpc"))
        .param("allow_all_outbound", true);
    if let Some(description) = description {
        group = group.param("description", description);
    }
    stack.declare(group)?;

    for (port, rule_description) in ports {
        let mut rule =
            ResourceDescriptor::builder(format!("{id}-{port}"), ResourceKind::IngressRule)
                .param("security_group", Reference::id_of(id))
                .param("protocol", "tcp")
                .param("port", *port)
                .param("peer", "0.0.0.0/0");
        if let Some(description) = rule_description {
            rule = rule.param("description", *description);
        }
        stack.declare(rule)?;
    }
    Ok(())
}

fn declare_web_servers(stack: &mut Stack, settings: &StackSettings) -> declarative::Result<()> {
    for (id, name) in [("dev-web", "DevWebApp01"), ("prd-web", "PrdWebApp01")] {
        stack.declare(
            ResourceDescriptor::builder(id, ResourceKind::Instance)
                .param("instance_name", name)
                .param("instance_type", WEB_INSTANCE_TYPE)
                .param("machine_image", "amazon-linux")
                .param("subnet", Reference::id_of("public-subnet"))
                .param("security_group", Reference::id_of("web-sg"))
                .param("role", Reference::id_of("web-instance-role"))
                .param("user_data", codedeploy_user_data(&settings.region)),
        )?;
    }
    Ok(())
}

fn declare_bastion(stack: &mut Stack) -> declarative::Result<()> {
    stack.declare(
        ResourceDescriptor::builder("bastion", ResourceKind::Instance)
            .param("instance_name", "BastionHost")
            .param("instance_type", SMALL_INSTANCE_TYPE)
            .param("machine_image", "amazon-linux-2")
            .param("subnet", Reference::id_of("public-subnet")),
    )?;
    declare_security_group(
        stack,
        "bastion-sg",
        Some("Allow access to ec2 instances"),
        &[
            (80, Some("Allows HTTP connection from bastion security group")),
            (22, Some("Allows SSH connection from bastion security group")),
        ],
    )
}

fn declare_private_instance(
    stack: &mut Stack,
    settings: &StackSettings,
) -> declarative::Result<()> {
    stack.declare(
        ResourceDescriptor::builder("private-instance-role", ResourceKind::Role)
            .param("assumed_by", EC2_PRINCIPAL),
    )?;
    stack.declare(
        ResourceDescriptor::builder("private-instance", ResourceKind::Instance)
            .param("instance_name", "privateInstance")
            .param("instance_type", SMALL_INSTANCE_TYPE)
            .param("machine_image", "amazon-linux-2")
            .param("subnet", Reference::id_of("private-subnet"))
            .param("security_group", Reference::id_of("bastion-sg"))
            .param("role", Reference::id_of("private-instance-role"))
            .param("source_dest_check", false)
            .param("key_name", settings.key_name.as_str())
            .param("user_data", routing_user_data()),
    )?;
    stack.declare(
        ResourceDescriptor::builder("private-instance-ssm-policy", ResourceKind::Policy)
            .param(
                "actions",
                vec![
                    "ssmmessages:*",
                    "ssm:UpdateInstanceInformation",
                    "ec2messages:*",
                ],
            )
            .param("resources", vec!["*"])
            .param("roles", vec![Reference::id_of("private-instance-role")]),
    )
}

fn declare_database(stack: &mut Stack) -> declarative::Result<()> {
    stack.declare(
        ResourceDescriptor::builder("database", ResourceKind::Database)
            .param("engine", "mysql")
            .param("engine_version", "8.0.25")
            .param("instance_type", "db.t3.small")
            .param("instance_identifier", "my-rds")
            .param("database_name", "RDSDB")
            .param("subnet", Reference::id_of("private-subnet"))
            .param("security_groups", vec![Reference::id_of("db-sg")]),
    )
}

fn declare_outputs(stack: &mut Stack, settings: &StackSettings) {
    stack.output(
        OutputSpec::new(
            "DevLocation",
            "Development web server location",
            Reference::new("dev-web", "public_dns_name"),
        )
        .with_template("http://{value}"),
    );
    stack.output(
        OutputSpec::new(
            "PrdLocation",
            "Production web server location",
            Reference::new("prd-web", "public_dns_name"),
        )
        .with_template("http://{value}"),
    );
    stack.output(OutputSpec::new(
        "BucketName",
        "Bucket for storing artifacts",
        Reference::new("artifacts", "bucket_name"),
    ));
    stack.output(OutputSpec::new(
        "BuildRoleArn",
        "Build role ARN",
        Reference::new("build-role", "arn"),
    ));
    stack.output(OutputSpec::new(
        "DeployRoleArn",
        "Deploy role ARN",
        Reference::new("deploy-role", "arn"),
    ));
    if settings.with_database {
        stack.output(OutputSpec::new(
            "DatabaseEndpoint",
            "Database endpoint address",
            Reference::new("database", "endpoint"),
        ));
    }
}
