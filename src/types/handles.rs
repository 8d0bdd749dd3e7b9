// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Artifacts handed from one stage to the next

use crate::cidr::Ipv4Cidr;
use crate::error::{Result, StackError};
use crate::types::resource::ResourceId;
use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SubnetKind {
    /// Private, with outbound traffic through a NAT gateway
    PrivateWithEgress,
    Public,
    /// Private, without any route to the internet
    PrivateIsolated,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubnetTierSpec {
    pub name: String,
    pub kind: SubnetKind,
    pub prefix_len: u8,
}

impl SubnetTierSpec {
    pub fn new(name: &str, kind: SubnetKind, prefix_len: u8) -> Self {
        Self {
            name: name.to_string(),
            kind,
            prefix_len,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subnet {
    pub id: ResourceId,
    pub availability_zone: String,
    pub cidr: Ipv4Cidr,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubnetTier {
    pub name: String,
    pub kind: SubnetKind,
    /// One subnet per availability zone
    pub subnets: Vec<Subnet>,
}

/// The provisioned VPC, read-only once the network stage has built it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkHandle {
    vpc: ResourceId,
    cidr: Ipv4Cidr,
    tiers: Vec<SubnetTier>,
}

impl NetworkHandle {
    pub(crate) fn new(vpc: ResourceId, cidr: Ipv4Cidr, tiers: Vec<SubnetTier>) -> Self {
        Self { vpc, cidr, tiers }
    }

    pub fn vpc(&self) -> &ResourceId {
        &self.vpc
    }

    pub fn cidr(&self) -> Ipv4Cidr {
        self.cidr
    }

    pub fn tiers(&self) -> &[SubnetTier] {
        &self.tiers
    }

    pub fn tier(&self, name: &str) -> Option<&SubnetTier> {
        self.tiers.iter().find(|t| t.name == name)
    }

    pub fn subnets(&self) -> impl Iterator<Item = &Subnet> {
        self.tiers.iter().flat_map(|t| t.subnets.iter())
    }

    pub fn subnets_of_kind(&self, kind: SubnetKind) -> impl Iterator<Item = &Subnet> {
        self.tiers
            .iter()
            .filter(move |t| t.kind == kind)
            .flat_map(|t| t.subnets.iter())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LogType {
    #[serde(rename = "api")]
    Api,
    #[serde(rename = "authenticator")]
    Authenticator,
    #[serde(rename = "audit")]
    Audit,
    #[serde(rename = "controllerManager")]
    ControllerManager,
    #[serde(rename = "scheduler")]
    Scheduler,
}

impl LogType {
    pub const ALL: [LogType; 5] = [
        LogType::Api,
        LogType::Authenticator,
        LogType::Audit,
        LogType::ControllerManager,
        LogType::Scheduler,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthenticationMode {
    /// Legacy aws-auth ConfigMap only
    ConfigMap,
    ApiAndConfigMap,
    Api,
}

impl AuthenticationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthenticationMode::ConfigMap => "CONFIG_MAP",
            AuthenticationMode::ApiAndConfigMap => "API_AND_CONFIG_MAP",
            AuthenticationMode::Api => "API",
        }
    }

    /// Whether access entries can be created under this mode
    pub fn supports_access_entries(&self) -> bool {
        !matches!(self, AuthenticationMode::ConfigMap)
    }
}

impl fmt::Display for AuthenticationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The provisioned cluster, shared with the image and workload stages
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterHandle {
    id: ResourceId,
    name: String,
    admin_role: ResourceId,
    logging: Vec<LogType>,
    network: Arc<NetworkHandle>,
    authentication_mode: AuthenticationMode,
    auth_update: Option<ResourceId>,
}

impl ClusterHandle {
    pub(crate) fn new(
        id: ResourceId,
        name: &str,
        admin_role: ResourceId,
        logging: Vec<LogType>,
        network: Arc<NetworkHandle>,
    ) -> Self {
        Self {
            id,
            name: name.to_string(),
            admin_role,
            logging,
            network,
            authentication_mode: AuthenticationMode::ConfigMap,
            auth_update: None,
        }
    }

    pub fn id(&self) -> &ResourceId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn admin_role(&self) -> &ResourceId {
        &self.admin_role
    }

    pub fn logging(&self) -> &[LogType] {
        &self.logging
    }

    pub fn network(&self) -> &NetworkHandle {
        &self.network
    }

    pub fn authentication_mode(&self) -> AuthenticationMode {
        self.authentication_mode
    }

    /// Record the one post-creation authentication mode upgrade.
    pub(crate) fn reconfigure(&mut self, update: ResourceId, mode: AuthenticationMode) -> Result<()> {
        if let Some(existing) = &self.auth_update {
            return Err(StackError::InvalidDependency(format!(
                "cluster {} already reconfigured by {}",
                self.name, existing
            )));
        }
        self.auth_update = Some(update);
        self.authentication_mode = mode;
        Ok(())
    }

    /// The resource every access entry on this cluster has to wait for
    pub fn access_entry_dependency(&self) -> Result<&ResourceId> {
        match &self.auth_update {
            Some(update) if self.authentication_mode.supports_access_entries() => Ok(update),
            _ => Err(StackError::InvalidDependency(format!(
                "cluster {} does not accept access entries in {} mode",
                self.name, self.authentication_mode
            ))),
        }
    }
}

/// A published container image: registry URI plus tag
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageReference {
    registry_uri: String,
    tag: String,
}

impl ImageReference {
    pub fn new(registry_uri: &str, tag: &str) -> Result<Self> {
        if registry_uri.is_empty() || registry_uri.contains(char::is_whitespace) {
            return Err(StackError::InvalidConfig(format!(
                "invalid registry uri '{}'",
                registry_uri
            )));
        }
        let tag_ok = !tag.is_empty()
            && tag.len() <= 128
            && tag
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '-');
        if !tag_ok {
            return Err(StackError::InvalidConfig(format!("invalid image tag '{}'", tag)));
        }
        Ok(Self {
            registry_uri: registry_uri.to_string(),
            tag: tag.to_string(),
        })
    }

    pub fn registry_uri(&self) -> &str {
        &self.registry_uri
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.registry_uri, self.tag)
    }
}

impl FromStr for ImageReference {
    type Err = StackError;

    fn from_str(s: &str) -> Result<Self> {
        // the tag separator is the last ':' after the last '/', a registry port may precede it
        let name_start = s.rfind('/').map_or(0, |i| i + 1);
        match s[name_start..].rfind(':') {
            Some(i) => Self::new(&s[..name_start + i], &s[name_start + i + 1..]),
            None => Err(StackError::InvalidConfig(format!(
                "image reference '{}' has no tag",
                s
            ))),
        }
    }
}

impl Serialize for ImageReference {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessScope {
    Cluster,
}

/// Binds a principal to a cluster access policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct AccessEntry {
    pub cluster_name: String,
    pub principal_arn: String,
    pub policy_arn: String,
    pub access_scope: AccessScope,
    pub kubernetes_groups: Vec<String>,
    #[serde(rename = "Type")]
    pub entry_type: String,
}

impl AccessEntry {
    pub fn cluster_admin(cluster_name: &str, principal_arn: &str) -> Self {
        Self {
            cluster_name: cluster_name.to_string(),
            principal_arn: principal_arn.to_string(),
            policy_arn: crate::constants::policies::CLUSTER_ADMIN_ACCESS_POLICY.to_string(),
            access_scope: AccessScope::Cluster,
            kubernetes_groups: vec![],
            entry_type: "STANDARD".to_string(),
        }
    }
}
