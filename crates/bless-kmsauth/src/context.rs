// ABOUTME: AuthContext, the identity claim bound into a token's KMS encryption context.
// ABOUTME: V1 carries from/to; V2 adds a user type and a versioned username.

use crate::error::{KmsAuthError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// KMS encryption context. Ordered so equality and serialization are stable.
pub type KmsContext = BTreeMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenVersion {
    V1 = 1,
    V2 = 2,
}

/// Who the token speaks for (`from`) and who may accept it (`to`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "version", rename_all = "lowercase")]
pub enum AuthContext {
    V1 {
        from: String,
        to: String,
    },
    V2 {
        from: String,
        to: String,
        user_type: String,
    },
}

impl AuthContext {
    pub fn v1(from: impl Into<String>, to: impl Into<String>) -> Self {
        AuthContext::V1 {
            from: from.into(),
            to: to.into(),
        }
    }

    pub fn v2(from: impl Into<String>, to: impl Into<String>, user_type: impl Into<String>) -> Self {
        AuthContext::V2 {
            from: from.into(),
            to: to.into(),
            user_type: user_type.into(),
        }
    }

    pub fn version(&self) -> TokenVersion {
        match self {
            AuthContext::V1 { .. } => TokenVersion::V1,
            AuthContext::V2 { .. } => TokenVersion::V2,
        }
    }

    /// Every field is required.
    pub fn validate(&self) -> Result<()> {
        let (from, to, user_type) = match self {
            AuthContext::V1 { from, to } => (from, to, None),
            AuthContext::V2 {
                from,
                to,
                user_type,
            } => (from, to, Some(user_type)),
        };
        if from.is_empty() {
            return Err(KmsAuthError::MissingField("from"));
        }
        if to.is_empty() {
            return Err(KmsAuthError::MissingField("to"));
        }
        if user_type.is_some_and(|u| u.is_empty()) {
            return Err(KmsAuthError::MissingField("user_type"));
        }
        Ok(())
    }

    /// Username the signer sees: `from` for V1, `2/<user_type>/<from>` for V2.
    pub fn username(&self) -> String {
        match self {
            AuthContext::V1 { from, .. } => from.clone(),
            AuthContext::V2 {
                from, user_type, ..
            } => format!("{}/{}/{}", TokenVersion::V2 as u8, user_type, from),
        }
    }

    pub fn kms_context(&self) -> KmsContext {
        let mut context = KmsContext::new();
        match self {
            AuthContext::V1 { from, to } => {
                context.insert("from".to_string(), from.clone());
                context.insert("to".to_string(), to.clone());
            }
            AuthContext::V2 {
                from,
                to,
                user_type,
            } => {
                context.insert("from".to_string(), from.clone());
                context.insert("to".to_string(), to.clone());
                context.insert("user".to_string(), user_type.clone());
            }
        }
        context
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_v1_username_and_context() {
        let ctx = AuthContext::v1("alice", "bless");
        assert_eq!(ctx.username(), "alice");
        assert_eq!(ctx.version(), TokenVersion::V1);

        let kms = ctx.kms_context();
        assert_eq!(kms.len(), 2);
        assert_eq!(kms["from"], "alice");
        assert_eq!(kms["to"], "bless");
    }

    #[test]
    fn test_v2_username_and_context() {
        let ctx = AuthContext::v2("alice", "bless", "user");
        assert_eq!(ctx.username(), "2/user/alice");

        let kms = ctx.kms_context();
        assert_eq!(kms.len(), 3);
        assert_eq!(kms["user"], "user");
    }

    #[test]
    fn test_validate_rejects_empty_fields() {
        assert!(AuthContext::v2("alice", "bless", "user").validate().is_ok());
        assert!(matches!(
            AuthContext::v1("", "bless").validate(),
            Err(KmsAuthError::MissingField("from"))
        ));
        assert!(matches!(
            AuthContext::v1("alice", "").validate(),
            Err(KmsAuthError::MissingField("to"))
        ));
        assert!(matches!(
            AuthContext::v2("alice", "bless", "").validate(),
            Err(KmsAuthError::MissingField("user_type"))
        ));
    }

    #[test]
    fn test_context_changes_with_any_field() {
        let base = AuthContext::v2("alice", "bless", "user").kms_context();
        assert_ne!(base, AuthContext::v2("bob", "bless", "user").kms_context());
        assert_ne!(base, AuthContext::v2("alice", "other", "user").kms_context());
        assert_ne!(base, AuthContext::v2("alice", "bless", "service").kms_context());
    }
}
