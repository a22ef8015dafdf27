//! Stack naming and stack outputs
//!
//! The bastion stack is named after its network placement so that repeated
//! invocations against the same security group and subnet reuse one stack.

use crate::defaults::STACK_NAME_PREFIX;

/// Stack output holding the scaling group name
pub const OUTPUT_AUTOSCALING_GROUP: &str = "AutoScalingGroup";

/// Stack output holding the control function name
pub const OUTPUT_CONTROL_FUNCTION: &str = "ControlLambdaFunction";

/// Template parameter receiving the security group id
pub const PARAM_SECURITY_GROUP: &str = "SecurityGroupId";

/// Template parameter receiving the subnet id
pub const PARAM_SUBNET: &str = "SubnetId";

/// Network placement of the bastion instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    pub security_group_id: String,
    pub subnet_id: String,
}

impl Placement {
    pub fn new(security_group_id: impl Into<String>, subnet_id: impl Into<String>) -> Self {
        Self {
            security_group_id: security_group_id.into(),
            subnet_id: subnet_id.into(),
        }
    }

    /// Deterministic stack name, e.g. `rdscli-0abc-0def` for `sg-0abc` / `subnet-0def`
    pub fn stack_name(&self) -> String {
        let sg = strip_id_prefix(&self.security_group_id, "sg-");
        let subnet = strip_id_prefix(&self.subnet_id, "subnet-");
        format!("{STACK_NAME_PREFIX}-{sg}-{subnet}")
    }

    /// Template parameters for this placement
    pub fn stack_parameters(&self) -> Vec<(String, String)> {
        vec![
            (
                PARAM_SECURITY_GROUP.to_string(),
                self.security_group_id.clone(),
            ),
            (PARAM_SUBNET.to_string(), self.subnet_id.clone()),
        ]
    }
}

fn strip_id_prefix<'a>(id: &'a str, prefix: &str) -> &'a str {
    id.trim().strip_prefix(prefix).unwrap_or(id.trim())
}
