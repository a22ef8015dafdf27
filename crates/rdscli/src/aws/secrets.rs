//! Database credentials from Secrets Manager

use crate::aws::context::{AwsContext, FromAwsContext};
use anyhow::{Context, Result};
use aws_sdk_secretsmanager::Client;
use rdscli_common::defaults::default_db_port;
use serde::Deserialize;
use std::fmt;

/// Credentials secret as stored for an RDS instance
#[derive(Clone, Deserialize)]
pub struct DbCredentials {
    pub host: String,
    pub username: String,
    pub password: String,
    pub dbname: String,
    #[serde(default = "default_db_port")]
    pub port: u16,
}

impl fmt::Debug for DbCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbCredentials")
            .field("host", &self.host)
            .field("username", &self.username)
            .field("password", &"...")
            .field("dbname", &self.dbname)
            .field("port", &self.port)
            .finish()
    }
}

impl DbCredentials {
    pub fn from_json(secret: &str) -> Result<Self> {
        serde_json::from_str(secret).context("Secret is not valid database credentials JSON")
    }
}

/// Secrets Manager client
#[derive(Debug, Clone)]
pub struct SecretsClient {
    client: Client,
}

impl FromAwsContext for SecretsClient {
    fn from_context(ctx: &AwsContext) -> Self {
        Self {
            client: ctx.secrets_client(),
        }
    }
}

impl SecretsClient {
    pub async fn db_credentials(&self, secret: &str) -> Result<DbCredentials> {
        let response = self
            .client
            .get_secret_value()
            .secret_id(secret)
            .send()
            .await
            .with_context(|| format!("Failed to read secret {secret}"))?;

        let value = response
            .secret_string()
            .with_context(|| format!("Secret {secret} has no string value"))?;

        DbCredentials::from_json(value).with_context(|| format!("Failed to parse secret {secret}"))
    }
}
