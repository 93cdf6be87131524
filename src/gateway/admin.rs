//! Admin privilege check.

use parley_core::{
    message::{Privilege, ADMIN_ROLE},
    traits::UserStore,
};
use std::sync::Arc;
use tracing::{debug, warn};

/// Looks up senders in the user store and exempts admins from throttling.
/// Any lookup failure yields "not admin".
pub struct AdminCheck {
    users: Arc<dyn UserStore>,
    domain_suffix: String,
}

impl AdminCheck {
    pub fn new(users: Arc<dyn UserStore>, domain_suffix: impl Into<String>) -> Self {
        Self {
            users,
            domain_suffix: domain_suffix.into(),
        }
    }

    /// Canonical address: bare numbers get the domain suffix, a leading `+` is dropped.
    pub fn normalize_address(&self, address: &str) -> String {
        let trimmed = address.trim();
        if trimmed.contains('@') {
            return trimmed.to_string();
        }
        let bare = trimmed.trim_start_matches('+');
        format!("{bare}{}", self.domain_suffix)
    }

    pub async fn is_admin(&self, address: &str) -> bool {
        if address.trim().is_empty() {
            return false;
        }
        let canonical = self.normalize_address(address);
        match self.users.get_user_by_address(&canonical).await {
            Ok(Some(user)) => user.role == ADMIN_ROLE,
            Ok(None) => {
                debug!("admin check: unknown user {canonical}");
                false
            }
            Err(e) => {
                warn!("admin check failed for {canonical}, applying rate limits: {e}");
                false
            }
        }
    }

    pub async fn privilege_for(&self, address: &str) -> Privilege {
        if self.is_admin(address).await {
            Privilege::Admin
        } else {
            Privilege::Standard
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parley_core::{config::MemoryConfig, error::ParleyError, message::UserRecord};
    use parley_memory::Store;

    struct DownUsers;

    #[async_trait]
    impl UserStore for DownUsers {
        async fn get_user_by_address(
            &self,
            _address: &str,
        ) -> Result<Option<UserRecord>, ParleyError> {
            Err(ParleyError::Store("connection refused".into()))
        }
    }

    async fn check_with_admin() -> AdminCheck {
        let store = Store::new(&MemoryConfig {
            db_path: ":memory:".into(),
        })
        .await
        .unwrap();
        store
            .upsert_user("5511999887766@c.us", Some("Owner"), "admin")
            .await
            .unwrap();
        store
            .upsert_user("5511000000000@c.us", None, "user")
            .await
            .unwrap();
        AdminCheck::new(Arc::new(store), "@c.us")
    }

    #[test]
    fn test_normalize_address() {
        let check = AdminCheck::new(Arc::new(DownUsers), "@c.us");
        assert_eq!(check.normalize_address("5511999887766"), "5511999887766@c.us");
        assert_eq!(check.normalize_address("+5511999887766 "), "5511999887766@c.us");
        assert_eq!(
            check.normalize_address("5511999887766@c.us"),
            "5511999887766@c.us"
        );
        assert_eq!(
            check.normalize_address("120363001234567890@g.us"),
            "120363001234567890@g.us"
        );
    }

    #[tokio::test]
    async fn test_admin_role_detected_with_or_without_suffix() {
        let check = check_with_admin().await;
        assert!(check.is_admin("5511999887766").await);
        assert!(check.is_admin("5511999887766@c.us").await);
        assert_eq!(
            check.privilege_for("5511999887766").await,
            Privilege::Admin
        );
    }

    #[tokio::test]
    async fn test_non_admin_and_unknown() {
        let check = check_with_admin().await;
        assert!(!check.is_admin("5511000000000").await);
        assert!(!check.is_admin("5599999999999").await);
        assert!(!check.is_admin("").await);
    }

    #[tokio::test]
    async fn test_store_failure_is_not_admin() {
        let check = AdminCheck::new(Arc::new(DownUsers), "@c.us");
        assert_eq!(
            check.privilege_for("5511999887766").await,
            Privilege::Standard
        );
    }
}
