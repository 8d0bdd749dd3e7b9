// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
pub mod cidr;
pub mod config;
pub mod constants;
pub mod deploy;
pub mod error;
pub mod kubernetes;
pub mod plan;
pub mod stacks;
pub mod types;

#[cfg(test)]
pub mod test_utils;
