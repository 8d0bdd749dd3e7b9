// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! EKS stack: admin identity, secrets key, cluster, worker nodes and the
//! authentication mode upgrade that unlocks access entries.

use crate::config::{AdminRoleTrust, Config};
use crate::constants::{nodegroup, policies};
use crate::error::Result;
use crate::plan::Stack;
use crate::types::handles::{AuthenticationMode, LogType};
use crate::types::iam::{managed_policy_arn, PolicyDocument, Principal, Statement};
use crate::types::resource::Taint;
use crate::types::{AccessEntry, ClusterHandle, NetworkHandle, ResourceSpec, StageDescriptor};
use std::sync::Arc;
use tracing::{info, instrument, warn};

pub const ADMIN_ROLE_NAME: &str = "aws-eks-admin";
pub const AUTH_MODE_UPDATE: &str = "AuthModeEnabler";
/// Awaited on the update call before any access entry may reference the cluster
pub const AUTH_MODE_RESPONSE_FIELD: &str = "update.status";

pub fn role_arn(account_id: &str, role_name: &str) -> String {
    format!("arn:aws:iam::{}:role/{}", account_id, role_name)
}

/// The one model the worker nodes may invoke
pub fn model_arn(region: &str, model_id: &str) -> String {
    format!("arn:aws:bedrock:{}::foundation-model/{}", region, model_id)
}

fn admin_role(config: &Config) -> ResourceSpec {
    let federated = match config.admin_role_trust {
        AdminRoleTrust::AnyPrincipal => {
            warn!(
                "Role {} is assumable by any principal, set ADMIN_ROLE_TRUST=account to restrict it",
                ADMIN_ROLE_NAME
            );
            Principal::any()
        }
        AdminRoleTrust::Account => Principal::account(&config.account_id),
    };

    ResourceSpec::IamRole {
        role_name: Some(ADMIN_ROLE_NAME.to_string()),
        assume_role_policy_document: PolicyDocument::new(vec![
            Statement::assume_role(Principal::service("eks.amazonaws.com")),
            Statement::assume_role(federated),
        ]),
        managed_policy_arns: vec![managed_policy_arn(policies::ADMINISTRATOR_ACCESS)],
        inline_policy: None,
    }
}

fn instance_role(config: &Config) -> ResourceSpec {
    ResourceSpec::IamRole {
        role_name: None,
        assume_role_policy_document: PolicyDocument::new(vec![Statement::assume_role(
            Principal::service("ec2.amazonaws.com"),
        )]),
        managed_policy_arns: [
            policies::EKS_WORKER_NODE,
            policies::EKS_CNI,
            policies::ECR_READ_ONLY,
            policies::SSM_MANAGED_INSTANCE_CORE,
        ]
        .iter()
        .map(|p| managed_policy_arn(p))
        .collect(),
        inline_policy: Some(PolicyDocument::new(vec![Statement::allow(
            &[policies::INVOKE_MODEL_ACTION],
            vec![model_arn(&config.region, &config.model_id)],
        )])),
    }
}

#[instrument(skip(config, network), fields(cluster = %config.cluster_name))]
pub fn provision(
    config: &Config,
    network: Arc<NetworkHandle>,
) -> Result<(Stack, Arc<ClusterHandle>)> {
    let mut stack = Stack::new(StageDescriptor::cluster());

    let admin = stack.add("eks-admin", admin_role(config))?;

    let key = stack.add(
        "eksSecretEncryptionKey",
        ResourceSpec::KmsKey {
            alias: "eksSecretEncryptionKey".to_string(),
            enable_key_rotation: true,
            removal_policy: "Destroy".to_string(),
        },
    )?;

    let subnets: Vec<_> = network.subnets().map(|s| s.id.clone()).collect();
    let cluster = stack.add(
        "EksCluster",
        ResourceSpec::EksCluster {
            name: config.cluster_name.clone(),
            version: config.kubernetes_version.clone(),
            default_capacity: 0,
            logging: LogType::ALL.to_vec(),
            masters_role: admin.clone(),
            secrets_encryption_key: key.clone(),
            vpc: network.vpc().clone(),
            subnets: subnets.clone(),
        },
    )?;
    stack.add_dependency(&cluster, &admin)?;
    stack.add_dependency(&cluster, &key)?;
    stack.add_dependency(&cluster, network.vpc())?;
    for subnet in &subnets {
        stack.add_dependency(&cluster, subnet)?;
    }

    // the role the cluster generates for itself; the admin identity may assume it
    let cluster_admin_name = format!("{}-admin", config.cluster_name);
    let cluster_admin = stack.add(
        "ClusterAdminRole",
        ResourceSpec::IamRole {
            role_name: Some(cluster_admin_name.clone()),
            assume_role_policy_document: PolicyDocument::new(vec![Statement::assume_role(
                Principal::account(&config.account_id),
            )]),
            managed_policy_arns: vec![],
            inline_policy: None,
        },
    )?;
    stack.add_dependency(&cluster_admin, &cluster)?;

    let assume = stack.add(
        "eksAdminAssumeClusterAdmin",
        ResourceSpec::IamPolicy {
            role: admin.clone(),
            policy_document: PolicyDocument::new(vec![Statement::allow(
                &["sts:AssumeRole"],
                vec![role_arn(&config.account_id, &cluster_admin_name)],
            )]),
        },
    )?;
    stack.add_dependency(&assume, &admin)?;
    stack.add_dependency(&assume, &cluster_admin)?;

    let node_role = stack.add("InstanceRole", instance_role(config))?;

    let nodes = stack.add(
        nodegroup::NAME,
        ResourceSpec::Nodegroup {
            cluster: cluster.clone(),
            nodegroup_name: nodegroup::NAME.to_string(),
            instance_types: vec![nodegroup::INSTANCE_TYPE.to_string()],
            min_size: nodegroup::MIN_SIZE,
            desired_size: nodegroup::DESIRED_SIZE,
            max_size: nodegroup::MAX_SIZE,
            disk_size: nodegroup::DISK_SIZE_GIB,
            ami_type: "BOTTLEROCKET_x86_64".to_string(),
            node_role: node_role.clone(),
            // keeps workload pods off a node until its cilium agent is up
            taints: vec![Taint {
                key: nodegroup::CILIUM_TAINT_KEY.to_string(),
                value: "true".to_string(),
                effect: "NO_EXECUTE".to_string(),
            }],
        },
    )?;
    stack.add_dependency(&nodes, &cluster)?;
    stack.add_dependency(&nodes, &node_role)?;

    let auth_update = stack.add(
        AUTH_MODE_UPDATE,
        ResourceSpec::AuthModeUpdate {
            cluster_name: config.cluster_name.clone(),
            authentication_mode: AuthenticationMode::ApiAndConfigMap,
            response_field: AUTH_MODE_RESPONSE_FIELD.to_string(),
        },
    )?;
    stack.add_dependency(&auth_update, &cluster)?;

    let mut handle = ClusterHandle::new(
        cluster.clone(),
        &config.cluster_name,
        admin.clone(),
        LogType::ALL.to_vec(),
        network,
    );
    handle.reconfigure(auth_update.clone(), AuthenticationMode::ApiAndConfigMap)?;

    if config.admin_access_entries {
        let entry = stack.add(
            "AdminAccessEntry",
            ResourceSpec::AccessEntry(AccessEntry::cluster_admin(
                &config.cluster_name,
                &role_arn(&config.account_id, ADMIN_ROLE_NAME),
            )),
        )?;
        stack.add_dependency(&entry, handle.access_entry_dependency()?)?;
        stack.add_dependency(&entry, &admin)?;
    }

    info!(
        "Cluster stack declared {} resources for {}",
        stack.resources().len(),
        config.cluster_name
    );

    Ok((stack, Arc::new(handle)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stacks::network;
    use crate::types::iam::Effect;
    use crate::types::Resource;

    fn make_config() -> Config {
        Config::new(
            "123456789012",
            "eu-central-1",
            "arn:aws:iam::123456789012:role/admin",
        )
    }

    fn make_stack(config: &Config) -> (Stack, Arc<ClusterHandle>) {
        let (_, network) = network::provision(config).unwrap();
        provision(config, network).unwrap()
    }

    fn find<'a>(stack: &'a Stack, logical_id: &str) -> &'a Resource {
        stack
            .resources()
            .iter()
            .find(|r| r.id.logical_id == logical_id)
            .unwrap()
    }

    #[test]
    fn test_cluster_settings() {
        let config = make_config();
        let (stack, handle) = make_stack(&config);

        match &find(&stack, "EksCluster").spec {
            ResourceSpec::EksCluster {
                name,
                version,
                default_capacity,
                logging,
                masters_role,
                subnets,
                ..
            } => {
                assert_eq!(name, "genai-cluster");
                assert_eq!(version, "1.29");
                assert_eq!(*default_capacity, 0);
                assert_eq!(logging.len(), 5);
                assert_eq!(masters_role.logical_id, "eks-admin");
                assert_eq!(subnets.len(), 9);
            }
            other => panic!("unexpected {:?}", other),
        }

        assert_eq!(handle.name(), "genai-cluster");
        assert_eq!(handle.logging(), &LogType::ALL);
        assert_eq!(handle.admin_role().logical_id, "eks-admin");
    }

    #[test]
    fn test_admin_role_trusts_any_principal_by_default() {
        let config = make_config();
        let (stack, _) = make_stack(&config);

        match &find(&stack, "eks-admin").spec {
            ResourceSpec::IamRole {
                role_name,
                assume_role_policy_document,
                managed_policy_arns,
                ..
            } => {
                assert_eq!(role_name.as_deref(), Some(ADMIN_ROLE_NAME));
                let principals: Vec<_> = assume_role_policy_document
                    .statement
                    .iter()
                    .filter_map(|s| s.principal.as_ref())
                    .collect();
                assert_eq!(principals.len(), 2);
                assert!(principals.iter().any(|p| p.is_any()));
                assert_eq!(
                    managed_policy_arns,
                    &vec!["arn:aws:iam::aws:policy/AdministratorAccess".to_string()]
                );
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_admin_role_restricted_to_account() {
        let mut config = make_config();
        config.admin_role_trust = AdminRoleTrust::Account;
        let (stack, _) = make_stack(&config);

        let ResourceSpec::IamRole {
            assume_role_policy_document,
            ..
        } = &find(&stack, "eks-admin").spec
        else {
            panic!("eks-admin is not a role");
        };
        assert!(assume_role_policy_document
            .statement
            .iter()
            .filter_map(|s| s.principal.as_ref())
            .all(|p| !p.is_any()));
    }

    #[test]
    fn test_instance_role_scoped_to_one_model() {
        let config = make_config();
        let (stack, _) = make_stack(&config);

        let ResourceSpec::IamRole {
            managed_policy_arns,
            inline_policy,
            ..
        } = &find(&stack, "InstanceRole").spec
        else {
            panic!("InstanceRole is not a role");
        };
        assert_eq!(managed_policy_arns.len(), 4);
        assert!(!managed_policy_arns.iter().any(|p| p.ends_with("AdministratorAccess")));

        let statement = &inline_policy.as_ref().unwrap().statement[0];
        assert_eq!(statement.effect, Effect::Allow);
        assert_eq!(statement.action, vec!["bedrock:InvokeModel"]);
        assert_eq!(
            statement.resource,
            vec!["arn:aws:bedrock:eu-central-1::foundation-model/anthropic.claude-v2"]
        );
        assert!(!statement.has_wildcard_resource());
    }

    #[test]
    fn test_nodegroup_tainted_until_networking_ready() {
        let config = make_config();
        let (stack, _) = make_stack(&config);

        let node_group = find(&stack, nodegroup::NAME);
        match &node_group.spec {
            ResourceSpec::Nodegroup {
                min_size,
                disk_size,
                ami_type,
                taints,
                ..
            } => {
                assert_eq!(*min_size, 1);
                assert_eq!(*disk_size, 100);
                assert_eq!(ami_type, "BOTTLEROCKET_x86_64");
                assert_eq!(taints[0].key, "node.cilium.io/agent-not-ready");
                assert_eq!(taints[0].effect, "NO_EXECUTE");
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(node_group
            .depends_on
            .iter()
            .any(|d| d.logical_id == "EksCluster"));
    }

    #[test]
    fn test_auth_mode_update_after_cluster() {
        let config = make_config();
        let (stack, handle) = make_stack(&config);

        let update = find(&stack, AUTH_MODE_UPDATE);
        assert!(update.depends_on.contains(handle.id()));
        assert!(matches!(
            &update.spec,
            ResourceSpec::AuthModeUpdate { authentication_mode, response_field, .. }
                if *authentication_mode == AuthenticationMode::ApiAndConfigMap
                    && response_field == "update.status"
        ));

        assert_eq!(
            handle.authentication_mode(),
            AuthenticationMode::ApiAndConfigMap
        );
        assert_eq!(handle.access_entry_dependency().unwrap(), &update.id);
    }

    #[test]
    fn test_admin_access_entry_behind_flag() {
        let mut config = make_config();
        let (stack, _) = make_stack(&config);
        assert!(stack
            .resources()
            .iter()
            .all(|r| !matches!(r.spec, ResourceSpec::AccessEntry(_))));

        config.admin_access_entries = true;
        let (stack, _) = make_stack(&config);
        let entry = find(&stack, "AdminAccessEntry");
        assert!(entry
            .depends_on
            .iter()
            .any(|d| d.logical_id == AUTH_MODE_UPDATE));
        match &entry.spec {
            ResourceSpec::AccessEntry(entry) => {
                assert_eq!(entry.principal_arn, "arn:aws:iam::123456789012:role/aws-eks-admin")
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
