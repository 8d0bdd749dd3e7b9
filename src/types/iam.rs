// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! IAM policy documents, serialized in the AWS JSON policy grammar

use serde::Serialize;

pub const POLICY_VERSION: &str = "2012-10-17";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct PolicyDocument {
    pub version: String,
    pub statement: Vec<Statement>,
}

impl PolicyDocument {
    pub fn new(statement: Vec<Statement>) -> Self {
        Self {
            version: POLICY_VERSION.to_string(),
            statement,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Effect {
    Allow,
    Deny,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Principal {
    #[serde(rename = "Service")]
    Service(String),
    /// An account, role or user ARN, or `*` for any principal
    #[serde(rename = "AWS")]
    Aws(String),
}

impl Principal {
    pub fn service(name: &str) -> Self {
        Principal::Service(name.to_string())
    }

    pub fn any() -> Self {
        Principal::Aws("*".to_string())
    }

    pub fn account(account_id: &str) -> Self {
        Principal::Aws(format!("arn:aws:iam::{}:root", account_id))
    }

    pub fn is_any(&self) -> bool {
        matches!(self, Principal::Aws(arn) if arn == "*")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Statement {
    pub effect: Effect,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub principal: Option<Principal>,
    pub action: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub resource: Vec<String>,
}

impl Statement {
    pub fn allow(actions: &[&str], resources: Vec<String>) -> Self {
        Self {
            effect: Effect::Allow,
            principal: None,
            action: actions.iter().map(|a| a.to_string()).collect(),
            resource: resources,
        }
    }

    /// Trust statement letting `principal` assume the role it is attached to
    pub fn assume_role(principal: Principal) -> Self {
        Self {
            effect: Effect::Allow,
            principal: Some(principal),
            action: vec!["sts:AssumeRole".to_string()],
            resource: vec![],
        }
    }

    pub fn has_wildcard_resource(&self) -> bool {
        self.resource.iter().any(|r| r.contains('*'))
    }
}

/// ARN of an AWS managed policy
pub fn managed_policy_arn(name: &str) -> String {
    format!("arn:aws:iam::aws:policy/{}", name)
}
