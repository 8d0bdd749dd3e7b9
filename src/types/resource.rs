// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Typed resource declarations

use crate::cidr::Ipv4Cidr;
use crate::error::{Result, StackError};
use crate::types::handles::{AccessEntry, AuthenticationMode, ImageReference, LogType, SubnetKind};
use crate::types::iam::PolicyDocument;
use serde::{Serialize, Serializer};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Stack-qualified logical id of a declared resource
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId {
    pub stack: String,
    pub logical_id: String,
}

impl ResourceId {
    pub fn new(stack: &str, logical_id: &str) -> Self {
        Self {
            stack: stack.to_string(),
            logical_id: logical_id.to_string(),
        }
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.stack, self.logical_id)
    }
}

impl Serialize for ResourceId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// A declared resource and the resources it must wait for
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Resource {
    #[serde(skip)]
    pub id: ResourceId,
    #[serde(flatten)]
    pub spec: ResourceSpec,
    #[serde(skip_serializing_if = "BTreeSet::is_empty")]
    pub depends_on: BTreeSet<ResourceId>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
}

impl Resource {
    pub fn new(id: ResourceId, spec: ResourceSpec) -> Self {
        Self {
            id,
            spec,
            depends_on: BTreeSet::new(),
            tags: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum EndpointType {
    Gateway,
    Interface,
}

/// AWS services reachable through a VPC endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum EndpointService {
    S3,
    EcrDocker,
    CloudWatch,
}

impl EndpointService {
    pub fn short_name(&self) -> &'static str {
        match self {
            EndpointService::S3 => "s3",
            EndpointService::EcrDocker => "ecr.dkr",
            EndpointService::CloudWatch => "monitoring",
        }
    }

    pub fn service_name(&self, region: &str) -> String {
        format!("com.amazonaws.{}.{}", region, self.short_name())
    }

    pub fn endpoint_type(&self) -> EndpointType {
        match self {
            EndpointService::S3 => EndpointType::Gateway,
            EndpointService::EcrDocker | EndpointService::CloudWatch => EndpointType::Interface,
        }
    }

    /// Value of the `Name` tag on the endpoint
    pub fn name_tag(&self) -> &'static str {
        match self {
            EndpointService::S3 => "s3-ep",
            EndpointService::EcrDocker => "ecr-ep",
            EndpointService::CloudWatch => "cloudwatch-ep",
        }
    }

    pub fn logical_id(&self) -> &'static str {
        match self {
            EndpointService::S3 => "VpcS3Ep",
            EndpointService::EcrDocker => "EcrEp",
            EndpointService::CloudWatch => "CwEp",
        }
    }
}

impl FromStr for EndpointService {
    type Err = StackError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "s3" => Ok(EndpointService::S3),
            "ecr.dkr" => Ok(EndpointService::EcrDocker),
            "monitoring" | "cloudwatch" => Ok(EndpointService::CloudWatch),
            other => Err(StackError::UnknownEndpointService(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleAction {
    Allow,
    Deny,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Taint {
    pub key: String,
    pub value: String,
    pub effect: String,
}

/// Container image built from a local directory and pushed to the asset repository
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ImageAsset {
    pub directory: PathBuf,
    pub platform: String,
    /// SHA-256 over the build context, also used as the image tag
    pub asset_hash: String,
    pub image: ImageReference,
}

/// Kubernetes objects applied to the cluster as one unit
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Manifest {
    pub cluster_name: String,
    pub objects: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct HelmChart {
    pub cluster_name: String,
    pub chart: String,
    pub repository: String,
    pub release: String,
    pub namespace: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub create_namespace: bool,
    pub values: serde_json::Value,
}

impl HelmChart {
    /// OCI registries take the chart as part of the reference instead of `--repo`
    pub fn is_oci(&self) -> bool {
        self.repository.starts_with("oci://")
    }

    pub fn chart_ref(&self) -> String {
        if self.is_oci() {
            format!("{}/{}", self.repository.trim_end_matches('/'), self.chart)
        } else {
            self.chart.clone()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "Type", content = "Properties")]
#[serde(rename_all_fields = "PascalCase")]
pub enum ResourceSpec {
    #[serde(rename = "AWS::EC2::VPC")]
    Vpc {
        name: String,
        cidr_block: Ipv4Cidr,
        enable_dns_hostnames: bool,
        enable_dns_support: bool,
    },
    #[serde(rename = "AWS::EC2::Subnet")]
    Subnet {
        vpc: ResourceId,
        tier: String,
        kind: SubnetKind,
        availability_zone: String,
        cidr_block: Ipv4Cidr,
        map_public_ip_on_launch: bool,
    },
    #[serde(rename = "AWS::EC2::InternetGateway")]
    InternetGateway { vpc: ResourceId },
    #[serde(rename = "AWS::EC2::NatGateway")]
    NatGateway { subnet: ResourceId },
    #[serde(rename = "AWS::EC2::FlowLog")]
    FlowLog {
        vpc: ResourceId,
        traffic_type: String,
        log_destination_type: String,
    },
    #[serde(rename = "AWS::EC2::NetworkAclEntry")]
    NetworkAclEntry {
        vpc: ResourceId,
        name: String,
        rule_number: u16,
        protocol: u8,
        port: u16,
        cidr_block: Ipv4Cidr,
        egress: bool,
        rule_action: RuleAction,
    },
    #[serde(rename = "AWS::EC2::VPCEndpoint")]
    VpcEndpoint {
        vpc: ResourceId,
        service: EndpointService,
        service_name: String,
        vpc_endpoint_type: EndpointType,
        subnets: Vec<ResourceId>,
    },
    #[serde(rename = "AWS::IAM::Role")]
    IamRole {
        #[serde(skip_serializing_if = "Option::is_none")]
        role_name: Option<String>,
        assume_role_policy_document: PolicyDocument,
        managed_policy_arns: Vec<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        inline_policy: Option<PolicyDocument>,
    },
    #[serde(rename = "AWS::IAM::Policy")]
    IamPolicy {
        role: ResourceId,
        policy_document: PolicyDocument,
    },
    #[serde(rename = "AWS::KMS::Key")]
    KmsKey {
        alias: String,
        enable_key_rotation: bool,
        removal_policy: String,
    },
    #[serde(rename = "Custom::AWSCDK-EKS-Cluster")]
    EksCluster {
        name: String,
        version: String,
        default_capacity: u32,
        logging: Vec<LogType>,
        masters_role: ResourceId,
        secrets_encryption_key: ResourceId,
        vpc: ResourceId,
        subnets: Vec<ResourceId>,
    },
    #[serde(rename = "AWS::EKS::Nodegroup")]
    Nodegroup {
        cluster: ResourceId,
        nodegroup_name: String,
        instance_types: Vec<String>,
        min_size: u32,
        desired_size: u32,
        max_size: u32,
        disk_size: u32,
        ami_type: String,
        node_role: ResourceId,
        taints: Vec<Taint>,
    },
    #[serde(rename = "Custom::AuthModeUpdate")]
    AuthModeUpdate {
        cluster_name: String,
        authentication_mode: AuthenticationMode,
        /// Response field awaited before dependents proceed
        response_field: String,
    },
    #[serde(rename = "Asset::DockerImage")]
    ImageAsset(ImageAsset),
    #[serde(rename = "AWS::EKS::AccessEntry")]
    AccessEntry(AccessEntry),
    #[serde(rename = "Custom::AWSCDK-EKS-KubernetesResource")]
    Manifest(Manifest),
    #[serde(rename = "Custom::AWSCDK-EKS-HelmChart")]
    HelmChart(HelmChart),
}

impl ResourceSpec {
    /// Short type name used in logs
    pub fn type_name(&self) -> &'static str {
        match self {
            ResourceSpec::Vpc { .. } => "Vpc",
            ResourceSpec::Subnet { .. } => "Subnet",
            ResourceSpec::InternetGateway { .. } => "InternetGateway",
            ResourceSpec::NatGateway { .. } => "NatGateway",
            ResourceSpec::FlowLog { .. } => "FlowLog",
            ResourceSpec::NetworkAclEntry { .. } => "NetworkAclEntry",
            ResourceSpec::VpcEndpoint { .. } => "VpcEndpoint",
            ResourceSpec::IamRole { .. } => "IamRole",
            ResourceSpec::IamPolicy { .. } => "IamPolicy",
            ResourceSpec::KmsKey { .. } => "KmsKey",
            ResourceSpec::EksCluster { .. } => "EksCluster",
            ResourceSpec::Nodegroup { .. } => "Nodegroup",
            ResourceSpec::AuthModeUpdate { .. } => "AuthModeUpdate",
            ResourceSpec::ImageAsset(_) => "ImageAsset",
            ResourceSpec::AccessEntry(_) => "AccessEntry",
            ResourceSpec::Manifest(_) => "Manifest",
            ResourceSpec::HelmChart(_) => "HelmChart",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_service_parse() {
        assert_eq!("s3".parse::<EndpointService>().unwrap(), EndpointService::S3);
        assert_eq!(
            "ecr.dkr".parse::<EndpointService>().unwrap(),
            EndpointService::EcrDocker
        );
        assert_eq!(
            "monitoring".parse::<EndpointService>().unwrap(),
            EndpointService::CloudWatch
        );
    }

    #[test]
    fn test_endpoint_service_rejects_unknown() {
        let err = "dynamodb".parse::<EndpointService>().unwrap_err();
        assert!(matches!(err, StackError::UnknownEndpointService(name) if name == "dynamodb"));
    }

    #[test]
    fn test_endpoint_service_names() {
        assert_eq!(
            EndpointService::EcrDocker.service_name("eu-central-1"),
            "com.amazonaws.eu-central-1.ecr.dkr"
        );
        assert_eq!(EndpointService::S3.endpoint_type(), EndpointType::Gateway);
        assert_eq!(
            EndpointService::CloudWatch.endpoint_type(),
            EndpointType::Interface
        );
    }

    #[test]
    fn test_resource_id_display_and_serialize() {
        let id = ResourceId::new("VpcStack", "vpc-eks");
        assert_eq!(id.to_string(), "VpcStack/vpc-eks");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"VpcStack/vpc-eks\"");
    }

    #[test]
    fn test_resource_serializes_type_and_properties() {
        let mut resource = Resource::new(
            ResourceId::new("EksStack", "eksSecretEncryptionKey"),
            ResourceSpec::KmsKey {
                alias: "eksSecretEncryptionKey".to_string(),
                enable_key_rotation: true,
                removal_policy: "Destroy".to_string(),
            },
        );
        resource
            .depends_on
            .insert(ResourceId::new("VpcStack", "vpc-eks"));

        let value = serde_json::to_value(&resource).unwrap();
        assert_eq!(value["Type"], "AWS::KMS::Key");
        assert_eq!(value["Properties"]["EnableKeyRotation"], true);
        assert_eq!(value["DependsOn"][0], "VpcStack/vpc-eks");
        assert!(value.get("Tags").is_none());
    }

    #[test]
    fn test_helm_chart_ref() {
        let mut chart = HelmChart {
            cluster_name: "genai-cluster".to_string(),
            chart: "helm-controller".to_string(),
            repository: "oci://public.ecr.aws/l0g8r8j6/fluxcd".to_string(),
            release: "flux".to_string(),
            namespace: "flux-system".to_string(),
            version: None,
            create_namespace: true,
            values: serde_json::json!({}),
        };
        assert_eq!(
            chart.chart_ref(),
            "oci://public.ecr.aws/l0g8r8j6/fluxcd/helm-controller"
        );

        chart.repository = "https://helm.cilium.io/".to_string();
        assert!(!chart.is_oci());
        assert_eq!(chart.chart_ref(), "helm-controller");
    }
}
