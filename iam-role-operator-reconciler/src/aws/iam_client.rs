//! AWS IAM client wrapper for role and inline policy operations
//!
//! One [`AwsIamRoleStore`] is built per process and shared by every reconcile.

use std::collections::BTreeSet;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_iam::error::ProvideErrorMetadata;
use aws_sdk_iam::types::Tag;
use aws_sdk_iam::Client as IamClient;
use log::{debug, info};

use crate::aws::{
    AwsError, AwsResult, RemoteRole, RemoteRoleStore, ROLE_OWNER_TAG, ROLE_OWNER_TAG_VALUE,
};

#[derive(Debug, Clone)]
pub struct AwsIamRoleStore {
    client: IamClient,
}

impl AwsIamRoleStore {
    pub fn new(client: IamClient) -> Self {
        Self { client }
    }

    /// Build a store from the default credential provider chain.
    ///
    /// `region` overrides whatever the environment resolves.
    pub async fn from_env(region: Option<&str>) -> AwsResult<Self> {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = region {
            if region.trim().is_empty() {
                return Err(AwsError::ConfigError("region must not be empty".to_string()));
            }
            loader = loader.region(aws_config::Region::new(region.to_string()));
        }
        let config = loader.load().await;
        if config.region().is_none() {
            return Err(AwsError::ConfigError(
                "no AWS region configured; set `region` in the config file or AWS_REGION"
                    .to_string(),
            ));
        }
        Ok(Self::new(IamClient::new(&config)))
    }
}

/// Failure text for an SDK error: the service's error code and message.
///
/// Per-request metadata such as the request id is left out, so the same
/// failure always reads the same when it is written to status.
pub(crate) fn describe_error<E>(err: &E) -> String
where
    E: ProvideErrorMetadata + std::error::Error,
{
    match (err.code(), err.message()) {
        (Some(code), Some(message)) => format!("{code}: {message}"),
        (Some(code), None) => code.to_string(),
        (None, _) => match err.source() {
            Some(source) => format!("{err}: {source}"),
            None => err.to_string(),
        },
    }
}

/// Whether a tag set contains the operator's ownership tag (key match only).
pub(crate) fn is_owner_tagged(tags: &[Tag]) -> bool {
    tags.iter().any(|tag| tag.key() == ROLE_OWNER_TAG)
}

#[async_trait]
impl RemoteRoleStore for AwsIamRoleStore {
    async fn find(&self, role_name: &str) -> AwsResult<Option<RemoteRole>> {
        match self.client.get_role().role_name(role_name).send().await {
            Ok(output) => {
                let role = output.role().ok_or_else(|| {
                    AwsError::iam("GetRole", role_name, "response did not include a role")
                })?;
                Ok(Some(RemoteRole {
                    name: role.role_name().to_string(),
                    owned: is_owner_tagged(role.tags()),
                }))
            }
            Err(e)
                if e.as_service_error()
                    .is_some_and(|se| se.is_no_such_entity_exception()) =>
            {
                debug!("IAM role {role_name} does not exist");
                Ok(None)
            }
            Err(e) => Err(AwsError::iam(
                "GetRole",
                role_name,
                describe_error(&e),
            )),
        }
    }

    async fn create(&self, role_name: &str, trust_policy: &str) -> AwsResult<()> {
        let owner_tag = Tag::builder()
            .key(ROLE_OWNER_TAG)
            .value(ROLE_OWNER_TAG_VALUE)
            .build()
            .map_err(|e| AwsError::iam("CreateRole", role_name, e.to_string()))?;

        info!("Creating IAM role {role_name}");
        self.client
            .create_role()
            .role_name(role_name)
            .assume_role_policy_document(trust_policy)
            .tags(owner_tag)
            .send()
            .await
            .map_err(|e| {
                AwsError::iam("CreateRole", role_name, describe_error(&e))
            })?;
        Ok(())
    }

    async fn update_trust_policy(&self, role_name: &str, trust_policy: &str) -> AwsResult<()> {
        info!("Updating trust policy of IAM role {role_name}");
        self.client
            .update_assume_role_policy()
            .role_name(role_name)
            .policy_document(trust_policy)
            .send()
            .await
            .map_err(|e| {
                AwsError::iam(
                    "UpdateAssumeRolePolicy",
                    role_name,
                    describe_error(&e),
                )
            })?;
        Ok(())
    }

    async fn list_inline_policy_names(&self, role_name: &str) -> AwsResult<BTreeSet<String>> {
        debug!("Listing inline policies of IAM role {role_name}");
        let names = self
            .client
            .list_role_policies()
            .role_name(role_name)
            .into_paginator()
            .items()
            .send()
            .try_collect()
            .await
            .map_err(|e| {
                AwsError::iam(
                    "ListRolePolicies",
                    role_name,
                    describe_error(&e),
                )
            })?;
        Ok(names.into_iter().collect())
    }

    async fn put(&self, role_name: &str, policy_name: &str, document: &str) -> AwsResult<()> {
        info!("Putting inline policy {policy_name} on IAM role {role_name}");
        self.client
            .put_role_policy()
            .role_name(role_name)
            .policy_name(policy_name)
            .policy_document(document)
            .send()
            .await
            .map_err(|e| {
                AwsError::iam(
                    "PutRolePolicy",
                    role_name,
                    format!(
                        "policy '{policy_name}': {}",
                        describe_error(&e)
                    ),
                )
            })?;
        Ok(())
    }

    async fn delete(&self, role_name: &str, policy_name: &str) -> AwsResult<()> {
        info!("Deleting inline policy {policy_name} from IAM role {role_name}");
        match self
            .client
            .delete_role_policy()
            .role_name(role_name)
            .policy_name(policy_name)
            .send()
            .await
        {
            Ok(_) => Ok(()),
            Err(e)
                if e.as_service_error()
                    .is_some_and(|se| se.is_no_such_entity_exception()) =>
            {
                debug!("Inline policy {policy_name} already absent from {role_name}");
                Ok(())
            }
            Err(e) => Err(AwsError::iam(
                "DeleteRolePolicy",
                role_name,
                format!("policy '{policy_name}': {}", describe_error(&e)),
            )),
        }
    }

    async fn delete_role(&self, role_name: &str) -> AwsResult<()> {
        info!("Deleting IAM role {role_name}");
        match self.client.delete_role().role_name(role_name).send().await {
            Ok(_) => Ok(()),
            Err(e)
                if e.as_service_error()
                    .is_some_and(|se| se.is_no_such_entity_exception()) =>
            {
                debug!("IAM role {role_name} already absent");
                Ok(())
            }
            Err(e) => Err(AwsError::iam(
                "DeleteRole",
                role_name,
                describe_error(&e),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_iam::error::ErrorMetadata;

    fn throttled(request_id: &str) -> ErrorMetadata {
        ErrorMetadata::builder()
            .code("Throttling")
            .message("Rate exceeded")
            .custom("aws_request_id", request_id)
            .build()
    }

    fn tag(key: &str, value: &str) -> Tag {
        Tag::builder().key(key).value(value).build().unwrap()
    }

    #[test]
    fn test_owner_tag_detected_by_key() {
        let tags = vec![tag("team", "payments"), tag(ROLE_OWNER_TAG, "true")];
        assert!(is_owner_tagged(&tags));
    }

    #[test]
    fn test_owner_tag_value_is_not_checked() {
        assert!(is_owner_tagged(&[tag(ROLE_OWNER_TAG, "false")]));
    }

    #[test]
    fn test_missing_owner_tag() {
        assert!(!is_owner_tagged(&[]));
        assert!(!is_owner_tagged(&[tag("iam.roleoperator.io/other", "true")]));
    }

    #[test]
    fn test_error_text_ignores_request_id() {
        let first = describe_error(&throttled("8d1c2a7e-0001"));
        let second = describe_error(&throttled("8d1c2a7e-0002"));
        assert_eq!(first, "Throttling: Rate exceeded");
        assert_eq!(first, second);
    }

    #[test]
    fn test_error_text_with_code_only() {
        let err = ErrorMetadata::builder().code("AccessDenied").build();
        assert_eq!(describe_error(&err), "AccessDenied");
    }
}
