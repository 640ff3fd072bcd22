//! Who may drive genesis, ticks, and pausing.
//!
//! Deployments differ only in how the administrator is resolved: a fixed
//! identity compared directly, or a transferable capability handle. Both sit
//! behind [`AuthorityResolver`].

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{MarketError, MarketResult};
use crate::types::ParticipantId;

pub trait AuthorityResolver: Send + Sync {
    fn is_admin(&self, caller: &ParticipantId) -> bool;

    /// # Errors
    ///
    /// Returns `Unauthorized` when `caller` is not an administrator.
    fn authorize(&self, caller: &ParticipantId) -> MarketResult<()> {
        if self.is_admin(caller) {
            Ok(())
        } else {
            Err(MarketError::Unauthorized(caller.to_string()))
        }
    }
}

/// Compares the caller against one configured identity.
#[derive(Debug, Clone)]
pub struct FixedAdmin {
    admin: ParticipantId,
}

impl FixedAdmin {
    #[must_use]
    pub fn new(admin: impl Into<ParticipantId>) -> Self {
        Self {
            admin: admin.into(),
        }
    }

    #[must_use]
    pub fn admin(&self) -> &ParticipantId {
        &self.admin
    }
}

impl AuthorityResolver for FixedAdmin {
    fn is_admin(&self, caller: &ParticipantId) -> bool {
        *caller == self.admin
    }
}

/// Handle proving admin rights. Whoever currently holds it is the admin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AdminCap(u64);

impl AdminCap {
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.0
    }
}

#[derive(Debug, Default)]
struct Registry {
    next_id: u64,
    holders: HashMap<AdminCap, ParticipantId>,
}

/// Resolves admins through issued capability handles. Clones share the registry.
#[derive(Debug, Clone, Default)]
pub struct CapabilityRegistry {
    inner: Arc<RwLock<Registry>>,
}

impl CapabilityRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mints a fresh capability held by `holder`.
    pub fn issue(&self, holder: impl Into<ParticipantId>) -> AdminCap {
        let mut registry = self.inner.write();
        let cap = AdminCap(registry.next_id);
        registry.next_id += 1;
        registry.holders.insert(cap, holder.into());
        cap
    }

    /// Moves `cap` to a new holder. Only the current holder may do so.
    ///
    /// # Errors
    ///
    /// Returns `Unauthorized` if `from` does not hold `cap`.
    pub fn transfer(
        &self,
        cap: AdminCap,
        from: &ParticipantId,
        to: impl Into<ParticipantId>,
    ) -> MarketResult<()> {
        let mut registry = self.inner.write();
        match registry.holders.get_mut(&cap) {
            Some(holder) if holder == from => {
                *holder = to.into();
                Ok(())
            }
            _ => Err(MarketError::Unauthorized(from.to_string())),
        }
    }

    /// Destroys a capability; returns whether it existed.
    pub fn revoke(&self, cap: AdminCap) -> bool {
        self.inner.write().holders.remove(&cap).is_some()
    }

    #[must_use]
    pub fn holder(&self, cap: AdminCap) -> Option<ParticipantId> {
        self.inner.read().holders.get(&cap).cloned()
    }
}

impl AuthorityResolver for CapabilityRegistry {
    fn is_admin(&self, caller: &ParticipantId) -> bool {
        self.inner
            .read()
            .holders
            .values()
            .any(|holder| holder == caller)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_admin_compares_identity() {
        let resolver = FixedAdmin::new("admin");
        assert!(resolver.authorize(&"admin".into()).is_ok());
        assert_eq!(
            resolver.authorize(&"mallory".into()),
            Err(MarketError::Unauthorized("mallory".to_string()))
        );
    }

    #[test]
    fn capability_follows_holder() {
        let registry = CapabilityRegistry::new();
        let cap = registry.issue("alice");
        assert!(registry.is_admin(&"alice".into()));
        assert!(!registry.is_admin(&"bob".into()));

        registry.transfer(cap, &"alice".into(), "bob").unwrap();
        assert!(!registry.is_admin(&"alice".into()));
        assert!(registry.is_admin(&"bob".into()));
        assert_eq!(registry.holder(cap), Some("bob".into()));
    }

    #[test]
    fn only_holder_can_transfer() {
        let registry = CapabilityRegistry::new();
        let cap = registry.issue("alice");

        assert!(registry.transfer(cap, &"bob".into(), "bob").is_err());
        assert_eq!(registry.holder(cap), Some("alice".into()));
    }

    #[test]
    fn revoked_capability_grants_nothing() {
        let registry = CapabilityRegistry::new();
        let cap = registry.issue("alice");

        assert!(registry.revoke(cap));
        assert!(!registry.revoke(cap));
        assert!(!registry.is_admin(&"alice".into()));
    }

    #[test]
    fn resolvers_are_interchangeable() {
        let registry = CapabilityRegistry::new();
        registry.issue("ops");
        let resolvers: Vec<Box<dyn AuthorityResolver>> =
            vec![Box::new(FixedAdmin::new("ops")), Box::new(registry)];

        for resolver in &resolvers {
            assert!(resolver.is_admin(&"ops".into()));
            assert!(!resolver.is_admin(&"guest".into()));
        }
    }
}
