// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

/// Field manager used for server-side apply
pub const FIELD_MANAGER: &str = "genai-stacks";

/// Token replaced by the image reference in the manifest template
pub const IMAGE_PLACEHOLDER: &str = "__IMAGE__";

/// Stack names, in deployment order
pub mod stacks {
    pub const NETWORK: &str = "VpcStack";
    pub const CLUSTER: &str = "EksStack";
    pub const IMAGE: &str = "EcrStack";
    pub const WORKLOAD: &str = "WorkloadDeployStack";
}

/// Network ACL deny rules on the default ACL.
/// Lower rule numbers are evaluated first.
pub mod nacl {
    pub const SSH_PORT: u16 = 22;
    pub const SSH_RULE_NUMBER: u16 = 98;
    pub const RDP_PORT: u16 = 3389;
    pub const RDP_RULE_NUMBER: u16 = 99;
}

/// AWS managed policy and access policy identifiers
pub mod policies {
    pub const ADMINISTRATOR_ACCESS: &str = "AdministratorAccess";
    pub const EKS_WORKER_NODE: &str = "AmazonEKSWorkerNodePolicy";
    pub const EKS_CNI: &str = "AmazonEKS_CNI_Policy";
    pub const ECR_READ_ONLY: &str = "AmazonEC2ContainerRegistryReadOnly";
    pub const SSM_MANAGED_INSTANCE_CORE: &str = "AmazonSSMManagedInstanceCore";
    pub const CLUSTER_ADMIN_ACCESS_POLICY: &str =
        "arn:aws:eks::aws:cluster-access-policy/AmazonEKSClusterAdminPolicy";
    pub const INVOKE_MODEL_ACTION: &str = "bedrock:InvokeModel";
}

/// Worker capacity defaults
pub mod nodegroup {
    pub const NAME: &str = "custom-node-group";
    pub const INSTANCE_TYPE: &str = "t3a.xlarge";
    pub const MIN_SIZE: u32 = 1;
    pub const DESIRED_SIZE: u32 = 2;
    pub const MAX_SIZE: u32 = 2;
    pub const DISK_SIZE_GIB: u32 = 100;
    /// Keeps workload pods off a node until the Cilium agent is up
    pub const CILIUM_TAINT_KEY: &str = "node.cilium.io/agent-not-ready";
}

/// Image asset publishing
pub mod assets {
    pub const PLATFORM: &str = "linux/amd64";
    pub const QUALIFIER: &str = "hnb659fds";
}

/// Polling configuration for long-running EKS operations
pub mod polling {
    /// Initial polling interval in seconds
    pub const POLL_INTERVAL_SECS: u64 = 10;
    /// Maximum polling interval in seconds (exponential backoff cap)
    pub const POLL_MAX_INTERVAL_SECS: u64 = 60;
    /// Give up on an authentication mode update after this many seconds
    pub const AUTH_MODE_TIMEOUT_SECS: u64 = 900;
    /// Give up waiting for the cluster to become active after this many seconds
    pub const CLUSTER_ACTIVE_TIMEOUT_SECS: u64 = 1800;
}
