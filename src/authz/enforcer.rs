use std::sync::Arc;

use arc_swap::ArcSwap;
use sea_orm::DatabaseConnection;
use tokio::sync::Mutex;

use crate::authz::errors::AuthzError;
use crate::authz::store;
use crate::authz::types::{Permission, PolicyKind, PolicyRule, PolicySet};

/// Evaluates `permit(user, obj, act)` over an in-memory snapshot of the policy table.
///
/// Reads load the current snapshot without locking. Mutations are serialized by
/// `write_lock`, written through to storage first and only then published, so a
/// storage failure leaves the visible policy untouched.
#[derive(Clone)]
pub struct Enforcer {
    db: DatabaseConnection,
    snapshot: Arc<ArcSwap<PolicySet>>,
    write_lock: Arc<Mutex<()>>,
}

impl std::fmt::Debug for Enforcer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Enforcer")
            .field("rules", &self.snapshot.load().len())
            .finish()
    }
}

impl Enforcer {
    /// Loads every stored tuple and builds the first snapshot.
    pub async fn load(db: DatabaseConnection) -> Result<Self, AuthzError> {
        let rules = store::load_rules(&db).await?;
        let set = PolicySet::from_rules(&rules);
        tracing::info!(rules = set.len(), "Loaded authorization policies");
        Ok(Self {
            db,
            snapshot: Arc::new(ArcSwap::from_pointee(set)),
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    pub fn enforce(&self, user: &str, obj: &str, act: &str) -> bool {
        let allowed = self.snapshot.load().permit(user, obj, act);
        tracing::trace!(user, obj, act, allowed, "enforce");
        allowed
    }

    pub fn get_roles_for_user(&self, user: &str) -> Vec<String> {
        self.snapshot.load().roles_for(user)
    }

    pub fn has_role(&self, user: &str, role: &str) -> bool {
        self.snapshot.load().has_role(user, role)
    }

    pub fn get_role_permissions(&self, role: &str) -> Vec<Permission> {
        self.snapshot.load().role_permissions(role)
    }

    pub fn get_direct_permissions(&self, user: &str) -> Vec<Permission> {
        self.snapshot.load().direct_permissions(user)
    }

    /// Every action the user holds, through roles or directly.
    pub fn get_actions_for_user(&self, user: &str) -> Vec<String> {
        self.snapshot.load().actions_for(user)
    }

    /// Stored tuples of `kind` whose fields from `index` on match `values`.
    pub fn get_filtered_policy(
        &self,
        kind: PolicyKind,
        index: usize,
        values: &[&str],
    ) -> Vec<PolicyRule> {
        let mut rules: Vec<PolicyRule> = self
            .snapshot
            .load()
            .rules()
            .filter(|rule| rule.matches_filter(kind, index, values))
            .collect();
        rules.sort();
        rules
    }

    pub async fn add_role_for_user(&self, user: &str, role: &str) -> Result<bool, AuthzError> {
        self.add_rule(PolicyRule::grant(user, role)).await
    }

    /// Removes every role grant of the user.
    pub async fn delete_roles_for_user(&self, user: &str) -> Result<bool, AuthzError> {
        self.remove_matching(|rule| rule.matches_filter(PolicyKind::Grant, 0, &[user]))
            .await
    }

    pub async fn add_policy(&self, role: &str, obj: &str, act: &str) -> Result<bool, AuthzError> {
        self.add_rule(PolicyRule::role_permission(role, obj, act))
            .await
    }

    /// Removes role permissions whose fields, starting at `index`, equal `values`.
    /// Empty strings in `values` match any field.
    pub async fn remove_filtered_policy(
        &self,
        index: usize,
        values: &[&str],
    ) -> Result<bool, AuthzError> {
        self.remove_matching(|rule| rule.matches_filter(PolicyKind::RolePermission, index, values))
            .await
    }

    pub async fn add_direct_permission(
        &self,
        user: &str,
        obj: &str,
        act: &str,
    ) -> Result<bool, AuthzError> {
        self.add_rule(PolicyRule::direct_permission(user, obj, act))
            .await
    }

    pub async fn remove_direct_permission(
        &self,
        user: &str,
        obj: &str,
        act: &str,
    ) -> Result<bool, AuthzError> {
        let target = PolicyRule::direct_permission(user, obj, act);
        self.remove_matching(|rule| *rule == target).await
    }

    /// Replaces the user's role grants with `roles` in one step.
    pub async fn set_roles_for_user(&self, user: &str, roles: &[&str]) -> Result<(), AuthzError> {
        let _guard = self.write_lock.lock().await;
        let current = self.snapshot.load_full();

        let removed: Vec<PolicyRule> = current
            .rules()
            .filter(|rule| rule.matches_filter(PolicyKind::Grant, 0, &[user]))
            .collect();
        let added: Vec<PolicyRule> = roles
            .iter()
            .map(|role| PolicyRule::grant(user, role))
            .collect();

        store::apply_changes(&self.db, &removed, &added).await?;

        let mut next = (*current).clone();
        next.retain(|rule| !removed.contains(rule));
        for rule in &added {
            next.insert(rule);
        }
        self.snapshot.store(Arc::new(next));
        tracing::info!(user, roles = ?roles, "Replaced role grants");
        Ok(())
    }

    /// Rewrites storage from the in-memory snapshot, then rebuilds the
    /// snapshot from what was stored.
    pub async fn save_policy(&self) -> Result<(), AuthzError> {
        let _guard = self.write_lock.lock().await;
        let rules: Vec<PolicyRule> = self.snapshot.load().rules().collect();
        store::replace_all(&self.db, &rules).await?;

        let stored = store::load_rules(&self.db).await?;
        self.snapshot.store(Arc::new(PolicySet::from_rules(&stored)));
        tracing::debug!(rules = stored.len(), "Saved and reloaded authorization policies");
        Ok(())
    }

    async fn add_rule(&self, rule: PolicyRule) -> Result<bool, AuthzError> {
        let _guard = self.write_lock.lock().await;
        let current = self.snapshot.load_full();
        if current.contains(&rule) {
            return Ok(false);
        }

        store::insert_rule(&self.db, &rule).await?;

        let mut next = (*current).clone();
        next.insert(&rule);
        self.snapshot.store(Arc::new(next));
        tracing::debug!(ptype = %rule.kind, v0 = %rule.v0, v1 = %rule.v1, v2 = %rule.v2, "Added policy");
        Ok(true)
    }

    async fn remove_matching(
        &self,
        predicate: impl Fn(&PolicyRule) -> bool,
    ) -> Result<bool, AuthzError> {
        let _guard = self.write_lock.lock().await;
        let current = self.snapshot.load_full();
        let doomed: Vec<PolicyRule> = current.rules().filter(|rule| predicate(rule)).collect();
        if doomed.is_empty() {
            return Ok(false);
        }

        store::apply_changes(&self.db, &doomed, &[]).await?;

        let mut next = (*current).clone();
        next.retain(|rule| !predicate(rule));
        self.snapshot.store(Arc::new(next));
        tracing::debug!(removed = doomed.len(), "Removed policies");
        Ok(true)
    }
}
