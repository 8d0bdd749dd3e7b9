// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! VPC stack: address plan, subnet tiers, flow logs, ACL deny rules and service endpoints

use crate::cidr::{Ipv4Cidr, SubnetAllocator};
use crate::config::Config;
use crate::constants::nacl;
use crate::error::{Result, StackError};
use crate::plan::Stack;
use crate::types::handles::{Subnet, SubnetKind, SubnetTier};
use crate::types::resource::{EndpointType, RuleAction};
use crate::types::{NetworkHandle, ResourceId, ResourceSpec, StageDescriptor};
use std::net::Ipv4Addr;
use std::sync::Arc;
use tracing::{debug, info, instrument};

const VPC_NAME: &str = "vpc-eks";
const TCP: u8 = 6;

/// A tier's name and kind with one (zone, block) pair per availability zone
pub type TierAllocation = (String, SubnetKind, Vec<(String, Ipv4Cidr)>);

/// Carve every tier out of the VPC block, one subnet per availability zone.
/// Runs before anything is declared so a bad address plan leaves no partial network.
pub fn allocate_tiers(config: &Config) -> Result<Vec<TierAllocation>> {
    let mut allocator = SubnetAllocator::new(config.vpc_cidr);
    let mut tiers = Vec::with_capacity(config.subnet_tiers.len());
    let mut allocated: Vec<Ipv4Cidr> = Vec::new();

    for tier in &config.subnet_tiers {
        let mut subnets = Vec::with_capacity(config.availability_zones.len());
        for az in &config.availability_zones {
            let cidr = allocator.allocate(tier.prefix_len)?;
            if !config.vpc_cidr.contains(&cidr) || allocated.iter().any(|c| c.overlaps(&cidr)) {
                return Err(StackError::SubnetAllocation(format!(
                    "subnet {} of tier {} overlaps or leaves {}",
                    cidr, tier.name, config.vpc_cidr
                )));
            }
            allocated.push(cidr);
            subnets.push((az.clone(), cidr));
        }
        tiers.push((tier.name.clone(), tier.kind, subnets));
    }

    Ok(tiers)
}

#[instrument(skip(config), fields(cidr = %config.vpc_cidr))]
pub fn provision(config: &Config) -> Result<(Stack, Arc<NetworkHandle>)> {
    let allocation = allocate_tiers(config)?;
    let any_ipv4 = Ipv4Cidr::new(Ipv4Addr::UNSPECIFIED, 0)?;

    let mut stack = Stack::new(StageDescriptor::network());

    let vpc = stack.add(
        VPC_NAME,
        ResourceSpec::Vpc {
            name: VPC_NAME.to_string(),
            cidr_block: config.vpc_cidr,
            enable_dns_hostnames: true,
            enable_dns_support: true,
        },
    )?;
    stack.tag_resource(&vpc, "Name", VPC_NAME)?;

    let has_public = allocation.iter().any(|(_, kind, _)| *kind == SubnetKind::Public);
    let igw = if has_public {
        let igw = stack.add("IGW", ResourceSpec::InternetGateway { vpc: vpc.clone() })?;
        stack.add_dependency(&igw, &vpc)?;
        Some(igw)
    } else {
        None
    };

    let mut tiers = Vec::with_capacity(allocation.len());
    for (tier_name, kind, cidrs) in allocation {
        let mut subnets = Vec::with_capacity(cidrs.len());
        for (i, (az, cidr)) in cidrs.into_iter().enumerate() {
            let logical_id = format!("{}Subnet{}", tier_name, i + 1);
            let id = stack.add(
                &logical_id,
                ResourceSpec::Subnet {
                    vpc: vpc.clone(),
                    tier: tier_name.clone(),
                    kind,
                    availability_zone: az.clone(),
                    cidr_block: cidr,
                    map_public_ip_on_launch: kind == SubnetKind::Public,
                },
            )?;
            stack.add_dependency(&id, &vpc)?;
            stack.tag_resource(&id, "Name", &format!("{}/{}", VPC_NAME, logical_id))?;
            debug!("Subnet {} in {}: {}", logical_id, az, cidr);
            subnets.push(Subnet {
                id,
                availability_zone: az,
                cidr,
            });
        }
        tiers.push(SubnetTier {
            name: tier_name,
            kind,
            subnets,
        });
    }

    // one NAT gateway per zone, in the first public tier
    let needs_nat = tiers.iter().any(|t| t.kind == SubnetKind::PrivateWithEgress);
    if let (true, Some(igw), Some(public)) = (
        needs_nat,
        &igw,
        tiers.iter().find(|t| t.kind == SubnetKind::Public),
    ) {
        for subnet in &public.subnets {
            let nat = stack.add(
                &format!("{}NATGateway", subnet.id.logical_id),
                ResourceSpec::NatGateway {
                    subnet: subnet.id.clone(),
                },
            )?;
            stack.add_dependency(&nat, &subnet.id)?;
            stack.add_dependency(&nat, igw)?;
        }
    }

    let flow_log = stack.add(
        "eksVpcFlowlogs",
        ResourceSpec::FlowLog {
            vpc: vpc.clone(),
            traffic_type: "ALL".to_string(),
            log_destination_type: "cloud-watch-logs".to_string(),
        },
    )?;
    stack.add_dependency(&flow_log, &vpc)?;

    for (name, rule_number, port) in [
        ("Block_ssh", nacl::SSH_RULE_NUMBER, nacl::SSH_PORT),
        ("Block_Rdp", nacl::RDP_RULE_NUMBER, nacl::RDP_PORT),
    ] {
        let entry = stack.add(
            name,
            ResourceSpec::NetworkAclEntry {
                vpc: vpc.clone(),
                name: name.to_string(),
                rule_number,
                protocol: TCP,
                port,
                cidr_block: any_ipv4,
                egress: false,
                rule_action: RuleAction::Deny,
            },
        )?;
        stack.add_dependency(&entry, &vpc)?;
    }

    let all_subnets: Vec<ResourceId> = tiers
        .iter()
        .flat_map(|t| t.subnets.iter().map(|s| s.id.clone()))
        .collect();
    let private_subnets: Vec<ResourceId> = tiers
        .iter()
        .find(|t| t.kind != SubnetKind::Public)
        .map(|t| t.subnets.iter().map(|s| s.id.clone()).collect())
        .unwrap_or_default();

    for service in &config.endpoints {
        let subnets = match service.endpoint_type() {
            EndpointType::Gateway => all_subnets.clone(),
            EndpointType::Interface => private_subnets.clone(),
        };
        let endpoint = stack.add(
            service.logical_id(),
            ResourceSpec::VpcEndpoint {
                vpc: vpc.clone(),
                service: *service,
                service_name: service.service_name(&config.region),
                vpc_endpoint_type: service.endpoint_type(),
                subnets: subnets.clone(),
            },
        )?;
        stack.add_dependency(&endpoint, &vpc)?;
        for subnet in &subnets {
            stack.add_dependency(&endpoint, subnet)?;
        }
        stack.tag_resource(&endpoint, "Name", service.name_tag())?;
    }

    info!(
        "Network stack declared {} resources across {} tiers",
        stack.resources().len(),
        tiers.len()
    );

    let handle = NetworkHandle::new(vpc, config.vpc_cidr, tiers);
    Ok((stack, Arc::new(handle)))
}
