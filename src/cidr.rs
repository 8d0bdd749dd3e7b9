// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! IPv4 CIDR blocks and sequential subnet carving

use crate::error::{Result, StackError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

/// An IPv4 network in CIDR notation. Host bits are always zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Ipv4Cidr {
    network: Ipv4Addr,
    prefix_len: u8,
}

impl Ipv4Cidr {
    /// Default VPC address block, 10.0.0.0/16
    pub const DEFAULT_VPC_BLOCK: Ipv4Cidr = Ipv4Cidr {
        network: Ipv4Addr::new(10, 0, 0, 0),
        prefix_len: 16,
    };

    pub fn new(network: Ipv4Addr, prefix_len: u8) -> Result<Self> {
        if prefix_len > 32 {
            return Err(StackError::InvalidCidr(format!(
                "{}/{}: prefix length must be at most 32",
                network, prefix_len
            )));
        }
        let cidr = Self {
            network,
            prefix_len,
        };
        if u32::from(network) & !cidr.mask() != 0 {
            return Err(StackError::InvalidCidr(format!(
                "{}/{}: address has host bits set",
                network, prefix_len
            )));
        }
        Ok(cidr)
    }

    pub fn network(&self) -> Ipv4Addr {
        self.network
    }

    pub fn prefix_len(&self) -> u8 {
        self.prefix_len
    }

    /// Number of addresses in the block
    pub fn size(&self) -> u64 {
        1u64 << (32 - u32::from(self.prefix_len))
    }

    fn mask(&self) -> u32 {
        if self.prefix_len == 0 {
            0
        } else {
            u32::MAX << (32 - u32::from(self.prefix_len))
        }
    }

    fn start(&self) -> u64 {
        u64::from(u32::from(self.network))
    }

    /// One past the last address of the block
    fn end(&self) -> u64 {
        self.start() + self.size()
    }

    /// Whether `other` lies entirely inside this block
    pub fn contains(&self, other: &Ipv4Cidr) -> bool {
        other.start() >= self.start() && other.end() <= self.end()
    }

    pub fn overlaps(&self, other: &Ipv4Cidr) -> bool {
        self.start() < other.end() && other.start() < self.end()
    }
}

impl fmt::Display for Ipv4Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.prefix_len)
    }
}

impl FromStr for Ipv4Cidr {
    type Err = StackError;

    fn from_str(s: &str) -> Result<Self> {
        let Some((addr, prefix)) = s.trim().split_once('/') else {
            return Err(StackError::InvalidCidr(format!(
                "{}: expected <address>/<prefix>",
                s
            )));
        };
        let network: Ipv4Addr = addr
            .parse()
            .map_err(|e| StackError::InvalidCidr(format!("{}: {}", s, e)))?;
        let prefix_len: u8 = prefix
            .parse()
            .map_err(|e| StackError::InvalidCidr(format!("{}: {}", s, e)))?;
        Self::new(network, prefix_len)
    }
}

impl TryFrom<String> for Ipv4Cidr {
    type Error = StackError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Ipv4Cidr> for String {
    fn from(value: Ipv4Cidr) -> Self {
        value.to_string()
    }
}

/// Carves consecutive, naturally aligned subnets out of a parent block.
///
/// Every allocation starts at the first address after the previous one that
/// is aligned to the requested size, so allocations never overlap and never
/// leave the parent block.
#[derive(Debug)]
pub struct SubnetAllocator {
    block: Ipv4Cidr,
    next: u64,
}

impl SubnetAllocator {
    pub fn new(block: Ipv4Cidr) -> Self {
        Self {
            next: block.start(),
            block,
        }
    }

    pub fn allocate(&mut self, prefix_len: u8) -> Result<Ipv4Cidr> {
        if prefix_len < self.block.prefix_len || prefix_len > 32 {
            return Err(StackError::SubnetAllocation(format!(
                "prefix length /{} does not fit in {}",
                prefix_len, self.block
            )));
        }

        let size = 1u64 << (32 - u32::from(prefix_len));
        let start = self.next.div_ceil(size) * size;
        if start + size > self.block.end() {
            return Err(StackError::SubnetAllocation(format!(
                "address space of {} exhausted while allocating a /{}",
                self.block, prefix_len
            )));
        }

        self.next = start + size;
        // start < 2^32 because it lies inside the parent block
        Ipv4Cidr::new(Ipv4Addr::from(start as u32), prefix_len)
    }
}
