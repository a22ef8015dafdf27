//! Integration tests against a real AWS account
//!
//! These tests only read; they never create resources. They require AWS
//! credentials and are ignored by default.
//! Run with: AWS_PROFILE=sandbox cargo nextest run --test aws_integration --run-ignored all

use anyhow::Result;
use rdscli::acquire::GroupInstances;
use rdscli::aws::{AwsContext, FromAwsContext, GroupClient, StackClient, get_current_account_id};
use rdscli::reconcile::{Reconciler, StackOperations};
use rdscli_test_utils::aws::{get_test_region, missing_stack_name};
use std::time::Duration;

async fn context() -> AwsContext {
    AwsContext::new(&get_test_region()).await
}

#[tokio::test]
#[ignore]
async fn test_account_id_is_twelve_digits() -> Result<()> {
    let ctx = context().await;
    let account = get_current_account_id(&ctx.sts_client()).await?;

    assert_eq!(account.as_str().len(), 12);
    assert!(account.as_str().chars().all(|c| c.is_ascii_digit()));
    Ok(())
}

#[tokio::test]
#[ignore]
async fn test_missing_stack_has_no_status() -> Result<()> {
    let ctx = context().await;
    let stacks = StackClient::from_context(&ctx);

    assert_eq!(stacks.status(&missing_stack_name()).await?, None);
    Ok(())
}

#[tokio::test]
#[ignore]
async fn test_destroying_missing_stack_is_noop() -> Result<()> {
    let ctx = context().await;
    let reconciler = Reconciler::new(StackClient::from_context(&ctx), Duration::from_secs(30));

    assert!(!reconciler.destroy(&missing_stack_name()).await?);
    Ok(())
}

#[tokio::test]
#[ignore]
async fn test_outputs_of_missing_stack_is_error() {
    let ctx = context().await;
    let name = missing_stack_name();
    let err = StackClient::from_context(&ctx)
        .outputs(&name)
        .await
        .unwrap_err();

    assert_eq!(err.to_string(), format!("Stack {name} does not exist"));
}

#[tokio::test]
#[ignore]
async fn test_missing_scaling_group_is_error() {
    let ctx = context().await;
    let err = GroupClient::from_context(&ctx)
        .list_instances(&missing_stack_name())
        .await
        .unwrap_err();

    assert!(
        err.to_string().contains("Wrong number of scaling groups"),
        "{err:#}"
    );
}
