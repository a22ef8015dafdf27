//! AWS client modules for the client
//!
//! This module provides wrappers around AWS SDK clients for:
//! - CloudFormation: Bastion stack lifecycle, outputs and events
//! - AutoScaling: In-service instance discovery
//! - SSM: Remote commands on the instance
//! - Lambda: Control function invocation
//! - Secrets Manager: Database credentials
//! - STS: Account ID lookup

pub mod account;
pub mod autoscaling;
pub mod cloudformation;
pub mod context;
pub mod error;
pub mod lambda;
pub mod secrets;
pub mod ssm;

pub use account::{AccountId, get_current_account_id};
pub use autoscaling::GroupClient;
pub use cloudformation::StackClient;
pub use context::{AwsContext, FromAwsContext};
pub use error::{AwsError, classify_aws_error, classify_sdk_error};
pub use lambda::ControlInvoker;
pub use secrets::{DbCredentials, SecretsClient};
pub use ssm::{CommandError, CommandOutput, RemoteCommand, SsmCommandRunner};
