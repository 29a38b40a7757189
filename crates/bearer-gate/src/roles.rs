//! Request-scoped role lookup.

use std::collections::BTreeSet;
use std::sync::Arc;

use once_cell::sync::OnceCell;

use crate::claims::{ClaimPath, ClaimValue, find_claim, load_roles};
use crate::verifier::VerifiedToken;

/// Answers role-membership questions for one verified token.
///
/// The role set is computed on first use and kept for the life of the helper, which is
/// owned by a single request.
#[derive(Debug)]
pub struct RolesHelper {
    token: Arc<VerifiedToken>,
    roles_claim: Option<ClaimPath>,
    roles: OnceCell<BTreeSet<String>>,
}

impl RolesHelper {
    /// Create a helper over `token`. `None` or an empty path disables role lookup.
    pub fn new(token: Arc<VerifiedToken>, roles_claim: Option<ClaimPath>) -> Self {
        Self {
            token,
            roles_claim: roles_claim.filter(|p| !p.is_empty()),
            roles: OnceCell::new(),
        }
    }

    /// Exact, case-sensitive membership test. Always false without a roles claim path.
    pub fn is_user_in_role(&self, role: &str) -> bool {
        self.roles().is_some_and(|roles| roles.contains(role))
    }

    /// The normalized role set, or `None` when no roles claim is configured.
    pub fn roles(&self) -> Option<&BTreeSet<String>> {
        let path = self.roles_claim.as_ref()?;
        Some(self.roles.get_or_init(|| {
            let raw = find_claim(self.token.claims(), path);
            load_roles(ClaimValue::from(raw))
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn token(claims: serde_json::Value) -> Arc<VerifiedToken> {
        Arc::new(VerifiedToken::from_claims_value("raw", claims).unwrap())
    }

    #[test]
    fn no_roles_path_means_never_in_role() {
        let t = token(json!({"roles": "admin"}));
        let helper = RolesHelper::new(t.clone(), None);
        assert!(!helper.is_user_in_role("admin"));
        let helper = RolesHelper::new(t, Some(ClaimPath::default()));
        assert!(!helper.is_user_in_role("admin"));
        assert!(helper.roles().is_none());
    }

    #[test]
    fn nested_roles_are_found() {
        let t = token(json!({"realm_access": {"roles": ["user", "admin"]}}));
        let helper = RolesHelper::new(t, Some(ClaimPath::parse("realm_access.roles")));
        assert!(helper.is_user_in_role("admin"));
        assert!(helper.is_user_in_role("user"));
        assert!(!helper.is_user_in_role("Admin"));
        assert!(!helper.is_user_in_role("adm*"));
    }

    #[test]
    fn role_set_is_computed_once() {
        let t = token(json!({"roles": "a,b"}));
        let helper = RolesHelper::new(t, Some(ClaimPath::parse("roles")));
        assert!(std::ptr::eq(helper.roles().unwrap(), helper.roles().unwrap()));
    }

    #[test]
    fn missing_claim_caches_empty_set() {
        let t = token(json!({"sub": "x"}));
        let helper = RolesHelper::new(t, Some(ClaimPath::parse("roles")));
        assert!(!helper.is_user_in_role("x"));
        assert_eq!(helper.roles.get().map(BTreeSet::len), Some(0));
    }
}
