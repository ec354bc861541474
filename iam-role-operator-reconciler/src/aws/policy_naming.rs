//! Naming of remote IAM roles and inline policies.

use serde::{Deserialize, Serialize};

/// Prefix and suffix wrapped around a base name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NameAffixes {
    pub prefix: String,
    pub suffix: String,
}

impl NameAffixes {
    pub fn new(prefix: impl Into<String>, suffix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            suffix: suffix.into(),
        }
    }

    pub fn apply(&self, base: &str) -> String {
        format!("{}{}{}", self.prefix, base, self.suffix)
    }
}

/// IAM role name for a desired-state record.
pub fn build_role_name(affixes: &NameAffixes, record_name: &str) -> String {
    affixes.apply(record_name)
}

/// Inline policy name for a statement group.
pub fn build_inline_policy_name(affixes: &NameAffixes, group_key: &str) -> String {
    affixes.apply(group_key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_name_wraps_record_name() {
        let affixes = NameAffixes::new("eks-prod-", "-eu-west-1");
        assert_eq!(build_role_name(&affixes, "billing"), "eks-prod-billing-eu-west-1");
    }

    #[test]
    fn test_empty_affixes_keep_base_name() {
        let affixes = NameAffixes::default();
        assert_eq!(build_inline_policy_name(&affixes, "s3"), "s3");
    }
}
