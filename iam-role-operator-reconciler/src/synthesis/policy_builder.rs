//! Builders for the trust policy and inline policies of a managed role.

use std::collections::{BTreeMap, BTreeSet};

use crate::aws::policy_naming::{build_inline_policy_name, NameAffixes};
use crate::types::{Effect, OneOrMany, PolicyDocument, PolicyStatement, Statement};

pub const ASSUME_ROLE_WITH_WEB_IDENTITY: &str = "sts:AssumeRoleWithWebIdentity";

/// Subject claim Kubernetes puts in projected service account tokens.
pub fn service_account_subject(namespace: &str, service_account: &str) -> String {
    format!("system:serviceaccount:{namespace}:{service_account}")
}

/// Condition key matching the `sub` claim of tokens issued by `issuer_url`.
pub fn subject_condition_key(issuer_url: &str) -> String {
    let host = issuer_url.strip_prefix("https://").unwrap_or(issuer_url);
    format!("{host}:sub")
}

/// Build the trust policy letting the given service accounts assume the role
/// through the cluster's OIDC provider.
pub fn build_trust_policy(
    service_accounts: &[String],
    namespace: &str,
    issuer_url: &str,
    provider_arn: &str,
) -> PolicyDocument {
    let mut seen = BTreeSet::new();
    let subjects: Vec<String> = service_accounts
        .iter()
        .map(|sa| service_account_subject(namespace, sa))
        .filter(|subject| seen.insert(subject.clone()))
        .collect();

    let principal = BTreeMap::from([("Federated".to_string(), provider_arn.to_string())]);
    let condition = BTreeMap::from([(
        "StringLike".to_string(),
        BTreeMap::from([(subject_condition_key(issuer_url), subjects)]),
    )]);

    PolicyDocument::new(vec![PolicyStatement {
        effect: Effect::Allow,
        principal: Some(principal),
        action: OneOrMany::Single(ASSUME_ROLE_WITH_WEB_IDENTITY.to_string()),
        resource: None,
        condition: Some(condition),
    }])
}

/// Build one inline policy per statement group, keyed by policy name.
pub fn build_inline_policies(
    statements_by_group: &BTreeMap<String, Vec<Statement>>,
    affixes: &NameAffixes,
) -> BTreeMap<String, PolicyDocument> {
    statements_by_group
        .iter()
        .map(|(group, statements)| {
            let document = PolicyDocument::new(statements.iter().map(allow_statement).collect());
            (build_inline_policy_name(affixes, group), document)
        })
        .collect()
}

fn allow_statement(statement: &Statement) -> PolicyStatement {
    PolicyStatement {
        effect: Effect::Allow,
        principal: None,
        action: OneOrMany::from_set(&statement.actions),
        resource: Some(OneOrMany::from_set(&statement.resources)),
        condition: None,
    }
}
