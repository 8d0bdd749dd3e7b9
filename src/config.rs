// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use crate::cidr::Ipv4Cidr;
use crate::error::{Result, StackError};
use crate::types::handles::{SubnetKind, SubnetTierSpec};
use crate::types::resource::EndpointService;
use anyhow::Context;
use std::collections::BTreeSet;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

/// Who may assume the cluster administrator role besides the EKS service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminRoleTrust {
    /// Any AWS principal. Needed for SSO permission-set roles, but grants
    /// assume-role to identities outside the account as well.
    AnyPrincipal,
    /// Only principals of the deploying account.
    Account,
}

impl FromStr for AdminRoleTrust {
    type Err = StackError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "any-principal" => Ok(AdminRoleTrust::AnyPrincipal),
            "account" => Ok(AdminRoleTrust::Account),
            other => Err(StackError::InvalidConfig(format!(
                "ADMIN_ROLE_TRUST must be 'any-principal' or 'account', got '{}'",
                other
            ))),
        }
    }
}

/// Deployment configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub account_id: String,
    pub region: String,
    /// Principal granted cluster-admin through an access entry
    pub admin_principal_arn: String,
    pub vpc_cidr: Ipv4Cidr,
    pub availability_zones: Vec<String>,
    pub subnet_tiers: Vec<SubnetTierSpec>,
    pub endpoints: Vec<EndpointService>,
    pub cluster_name: String,
    pub kubernetes_version: String,
    /// Foundation model the worker nodes may invoke
    pub model_id: String,
    pub build_context: PathBuf,
    pub manifest_template: PathBuf,
    pub admin_role_trust: AdminRoleTrust,
    /// Declare access entries for the admin role in the cluster stack
    pub admin_access_entries: bool,
    /// Also install the flux and kyverno-policies charts
    pub gitops_addons: bool,
}

impl Config {
    /// Configuration with defaults for everything but the account identity
    pub fn new(account_id: &str, region: &str, admin_principal_arn: &str) -> Self {
        Config {
            account_id: account_id.to_string(),
            region: region.to_string(),
            admin_principal_arn: admin_principal_arn.to_string(),
            vpc_cidr: Ipv4Cidr::DEFAULT_VPC_BLOCK,
            availability_zones: default_availability_zones(region),
            subnet_tiers: default_subnet_tiers(),
            endpoints: vec![
                EndpointService::S3,
                EndpointService::EcrDocker,
                EndpointService::CloudWatch,
            ],
            cluster_name: "genai-cluster".to_string(),
            kubernetes_version: "1.29".to_string(),
            model_id: "anthropic.claude-v2".to_string(),
            build_context: PathBuf::from("docker"),
            manifest_template: PathBuf::from("assets/streamlit.yaml"),
            admin_role_trust: AdminRoleTrust::AnyPrincipal,
            admin_access_entries: false,
            gitops_addons: false,
        }
    }

    /// Load configuration from environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration from any variable source; missing optional variables keep their defaults
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let account_id =
            lookup("AWS_ACCOUNT_ID").context("AWS_ACCOUNT_ID environment variable not set")?;
        let region = lookup("AWS_REGION").context("AWS_REGION environment variable not set")?;
        let admin_principal_arn = lookup("ADMIN_PRINCIPAL_ARN")
            .context("ADMIN_PRINCIPAL_ARN environment variable not set")?;

        let mut config = Config::new(&account_id, &region, &admin_principal_arn);

        if let Some(cidr) = lookup("VPC_CIDR") {
            config.vpc_cidr = cidr.parse()?;
        }
        if let Some(zones) = lookup("AVAILABILITY_ZONES") {
            config.availability_zones = split_list(&zones);
        }
        if let Some(endpoints) = lookup("VPC_ENDPOINTS") {
            config.endpoints = split_list(&endpoints)
                .iter()
                .map(|s| s.parse())
                .collect::<Result<Vec<_>>>()?;
        }
        if let Some(name) = lookup("CLUSTER_NAME") {
            config.cluster_name = name;
        }
        if let Some(version) = lookup("KUBERNETES_VERSION") {
            config.kubernetes_version = version;
        }
        if let Some(model) = lookup("MODEL_ID") {
            config.model_id = model;
        }
        if let Some(dir) = lookup("BUILD_CONTEXT") {
            config.build_context = PathBuf::from(dir);
        }
        if let Some(template) = lookup("MANIFEST_TEMPLATE") {
            config.manifest_template = PathBuf::from(template);
        }
        if let Some(trust) = lookup("ADMIN_ROLE_TRUST") {
            config.admin_role_trust = trust.parse()?;
        }
        if let Some(flag) = lookup("ADMIN_ACCESS_ENTRIES") {
            config.admin_access_entries = parse_flag("ADMIN_ACCESS_ENTRIES", &flag)?;
        }
        if let Some(flag) = lookup("GITOPS_ADDONS") {
            config.gitops_addons = parse_flag("GITOPS_ADDONS", &flag)?;
        }

        Ok(config)
    }

    /// Check the configuration once, before any stack is built
    pub fn validate(&self) -> Result<()> {
        if self.account_id.len() != 12 || !self.account_id.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid(format!(
                "account id '{}' must be 12 digits",
                self.account_id
            )));
        }

        let region_ok = !self.region.is_empty()
            && self.region.contains('-')
            && self
                .region
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
        if !region_ok {
            return Err(invalid(format!("region '{}' is malformed", self.region)));
        }

        if !self.admin_principal_arn.starts_with("arn:aws:iam::")
            || !(self.admin_principal_arn.contains(":role/")
                || self.admin_principal_arn.contains(":user/"))
        {
            return Err(invalid(format!(
                "admin principal '{}' is not an IAM role or user ARN",
                self.admin_principal_arn
            )));
        }

        if self.availability_zones.is_empty() {
            return Err(invalid("at least one availability zone is required"));
        }
        if let Some(az) = self
            .availability_zones
            .iter()
            .find(|az| !az.starts_with(&self.region))
        {
            return Err(invalid(format!(
                "availability zone '{}' is not in region {}",
                az, self.region
            )));
        }

        // VPC blocks must be between /16 and /28
        if !(16..=28).contains(&self.vpc_cidr.prefix_len()) {
            return Err(invalid(format!(
                "VPC block {} must be between /16 and /28",
                self.vpc_cidr
            )));
        }

        self.validate_subnet_tiers()?;

        let unique: BTreeSet<_> = self.endpoints.iter().collect();
        if unique.len() != self.endpoints.len() {
            return Err(invalid("duplicate VPC endpoint service"));
        }

        let name_ok = !self.cluster_name.is_empty()
            && self.cluster_name.len() <= 100
            && self
                .cluster_name
                .starts_with(|c: char| c.is_ascii_alphanumeric())
            && self
                .cluster_name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !name_ok {
            return Err(invalid(format!(
                "cluster name '{}' is malformed",
                self.cluster_name
            )));
        }

        let version_ok = self
            .kubernetes_version
            .split_once('.')
            .is_some_and(|(major, minor)| {
                !major.is_empty()
                    && !minor.is_empty()
                    && major.chars().all(|c| c.is_ascii_digit())
                    && minor.chars().all(|c| c.is_ascii_digit())
            });
        if !version_ok {
            return Err(invalid(format!(
                "kubernetes version '{}' must look like 1.29",
                self.kubernetes_version
            )));
        }

        if self.model_id.is_empty() || self.model_id.contains('*') {
            return Err(invalid(format!(
                "model id '{}' must name a single model",
                self.model_id
            )));
        }

        Ok(())
    }

    fn validate_subnet_tiers(&self) -> Result<()> {
        if self.subnet_tiers.is_empty() {
            return Err(invalid("at least one subnet tier is required"));
        }

        let mut names = BTreeSet::new();
        for tier in &self.subnet_tiers {
            if !names.insert(tier.name.as_str()) {
                return Err(invalid(format!("duplicate subnet tier '{}'", tier.name)));
            }
            // VPC subnets must be between /16 and /28
            if tier.prefix_len < self.vpc_cidr.prefix_len()
                || !(16..=28).contains(&tier.prefix_len)
            {
                return Err(invalid(format!(
                    "subnet tier '{}' prefix /{} must be between /{} and /28",
                    tier.name,
                    tier.prefix_len,
                    self.vpc_cidr.prefix_len().max(16)
                )));
            }
        }

        let needs_nat = self
            .subnet_tiers
            .iter()
            .any(|t| t.kind == SubnetKind::PrivateWithEgress);
        let has_public = self
            .subnet_tiers
            .iter()
            .any(|t| t.kind == SubnetKind::Public);
        if needs_nat && !has_public {
            return Err(invalid(
                "egress-capable private subnets need a public tier for NAT gateways",
            ));
        }

        Ok(())
    }
}

fn invalid(msg: impl Into<String>) -> StackError {
    StackError::InvalidConfig(msg.into())
}

/// Flags take exactly `true` or `false`
fn parse_flag(name: &str, value: &str) -> Result<bool> {
    match value.trim() {
        "true" => Ok(true),
        "false" => Ok(false),
        other => Err(invalid(format!(
            "{} must be 'true' or 'false', got '{}'",
            name, other
        ))),
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn default_availability_zones(region: &str) -> Vec<String> {
    ["a", "b", "c"]
        .iter()
        .map(|suffix| format!("{}{}", region, suffix))
        .collect()
}

fn default_subnet_tiers() -> Vec<SubnetTierSpec> {
    vec![
        SubnetTierSpec::new("EksPrivate", SubnetKind::PrivateWithEgress, 19),
        SubnetTierSpec::new("EksPublic", SubnetKind::Public, 27),
        SubnetTierSpec::new("EksOther", SubnetKind::PrivateWithEgress, 28),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const SSO_ROLE: &str =
        "arn:aws:iam::123456789012:role/aws-reserved/sso.amazonaws.com/AWSReservedSSO_Admin";

    fn make_config() -> Config {
        Config::new("123456789012", "eu-central-1", SSO_ROLE)
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = make_config();
        config.validate().unwrap();
        assert_eq!(config.vpc_cidr.to_string(), "10.0.0.0/16");
        assert_eq!(
            config.availability_zones,
            vec!["eu-central-1a", "eu-central-1b", "eu-central-1c"]
        );
        assert_eq!(config.subnet_tiers.len(), 3);
        assert_eq!(config.admin_role_trust, AdminRoleTrust::AnyPrincipal);
    }

    #[test]
    fn test_rejects_bad_account_id() {
        let mut config = make_config();
        config.account_id = "1234".to_string();
        assert!(matches!(
            config.validate(),
            Err(StackError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_rejects_bad_region() {
        let mut config = make_config();
        config.region = "EU Central".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_non_iam_principal() {
        let mut config = make_config();
        config.admin_principal_arn = "arn:aws:s3:::bucket".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_zone_outside_region() {
        let mut config = make_config();
        config.availability_zones = vec!["us-east-1a".to_string()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_duplicate_tier_names() {
        let mut config = make_config();
        config
            .subnet_tiers
            .push(SubnetTierSpec::new("EksPublic", SubnetKind::Public, 28));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_tier_prefix_out_of_range() {
        let mut config = make_config();
        config.subnet_tiers[0].prefix_len = 29;
        assert!(config.validate().is_err());

        config.subnet_tiers[0].prefix_len = 15;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_egress_without_public_tier() {
        let mut config = make_config();
        config.subnet_tiers.retain(|t| t.kind != SubnetKind::Public);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_isolated_tiers_need_no_public_tier() {
        let mut config = make_config();
        config.subnet_tiers = vec![SubnetTierSpec::new(
            "Isolated",
            SubnetKind::PrivateIsolated,
            20,
        )];
        config.validate().unwrap();
    }

    #[test]
    fn test_rejects_wildcard_model() {
        let mut config = make_config();
        config.model_id = "*".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_bad_kubernetes_version() {
        let mut config = make_config();
        config.kubernetes_version = "latest".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_duplicate_endpoints() {
        let mut config = make_config();
        config.endpoints.push(EndpointService::S3);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_admin_role_trust_parse() {
        assert_eq!(
            "account".parse::<AdminRoleTrust>().unwrap(),
            AdminRoleTrust::Account
        );
        assert_eq!(
            "any-principal".parse::<AdminRoleTrust>().unwrap(),
            AdminRoleTrust::AnyPrincipal
        );
        assert!("everyone".parse::<AdminRoleTrust>().is_err());
    }

    #[test]
    fn test_split_list() {
        assert_eq!(split_list(" s3, ecr.dkr ,,monitoring"), vec!["s3", "ecr.dkr", "monitoring"]);
    }

    fn make_vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        let mut vars: HashMap<String, String> = [
            ("AWS_ACCOUNT_ID", "123456789012"),
            ("AWS_REGION", "eu-central-1"),
            ("ADMIN_PRINCIPAL_ARN", SSO_ROLE),
        ]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        for (k, v) in pairs {
            vars.insert(k.to_string(), v.to_string());
        }
        vars
    }

    fn load(vars: &HashMap<String, String>) -> anyhow::Result<Config> {
        Config::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_rejects_vpc_block_out_of_range() {
        let mut config = make_config();
        config.vpc_cidr = "10.0.0.0/8".parse().unwrap();
        assert!(matches!(
            config.validate(),
            Err(StackError::InvalidConfig(msg)) if msg.contains("10.0.0.0/8")
        ));

        config.vpc_cidr = "10.0.0.0/29".parse().unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_lookup_defaults() {
        let config = load(&make_vars(&[])).unwrap();
        config.validate().unwrap();
        assert_eq!(config.cluster_name, "genai-cluster");
        assert!(!config.admin_access_entries);
        assert!(!config.gitops_addons);
    }

    #[test]
    fn test_from_lookup_overrides() {
        let vars = make_vars(&[
            ("VPC_CIDR", "10.1.0.0/16"),
            ("AVAILABILITY_ZONES", "eu-central-1a,eu-central-1b"),
            ("VPC_ENDPOINTS", "s3,ecr.dkr"),
            ("CLUSTER_NAME", "demo"),
            ("ADMIN_ROLE_TRUST", "account"),
            ("ADMIN_ACCESS_ENTRIES", "true"),
            ("GITOPS_ADDONS", "false"),
        ]);
        let config = load(&vars).unwrap();

        assert_eq!(config.vpc_cidr.to_string(), "10.1.0.0/16");
        assert_eq!(config.availability_zones.len(), 2);
        assert_eq!(
            config.endpoints,
            vec![EndpointService::S3, EndpointService::EcrDocker]
        );
        assert_eq!(config.cluster_name, "demo");
        assert_eq!(config.admin_role_trust, AdminRoleTrust::Account);
        assert!(config.admin_access_entries);
        assert!(!config.gitops_addons);
    }

    #[test]
    fn test_from_lookup_requires_account() {
        let mut vars = make_vars(&[]);
        vars.remove("AWS_ACCOUNT_ID");
        let err = load(&vars).unwrap_err();
        assert!(err.to_string().contains("AWS_ACCOUNT_ID"));
    }

    #[test]
    fn test_from_lookup_rejects_unknown_endpoint() {
        let err = load(&make_vars(&[("VPC_ENDPOINTS", "s3,dynamodb")])).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<StackError>(),
            Some(StackError::UnknownEndpointService(name)) if name == "dynamodb"
        ));
    }

    #[test]
    fn test_from_lookup_rejects_loose_flags() {
        for value in ["1", "TRUE", "yes", "ture"] {
            let err = load(&make_vars(&[("GITOPS_ADDONS", value)])).unwrap_err();
            assert!(matches!(
                err.downcast_ref::<StackError>(),
                Some(StackError::InvalidConfig(msg)) if msg.contains("GITOPS_ADDONS")
            ));
        }
    }
}
