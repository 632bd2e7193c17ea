use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// Matches any value in the `obj` or `act` position of a stored rule.
pub const WILDCARD: &str = "*";

/// Policy namespace of a stored tuple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PolicyKind {
    /// `(user, role)`
    Grant,
    /// `(role, obj, act)`
    RolePermission,
    /// `(user, obj, act)`
    DirectPermission,
}

impl PolicyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyKind::Grant => "g",
            PolicyKind::RolePermission => "p",
            PolicyKind::DirectPermission => "p2",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "g" => Some(PolicyKind::Grant),
            "p" => Some(PolicyKind::RolePermission),
            "p2" => Some(PolicyKind::DirectPermission),
            _ => None,
        }
    }
}

impl std::fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An `(obj, act)` pair, either requested or stored (stored pairs may hold `*`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Permission {
    pub obj: String,
    pub act: String,
}

impl Permission {
    pub fn new(obj: impl Into<String>, act: impl Into<String>) -> Self {
        Self {
            obj: obj.into(),
            act: act.into(),
        }
    }

    /// Whether this stored pair covers the concrete request `(obj, act)`.
    pub fn covers(&self, obj: &str, act: &str) -> bool {
        matches(obj, &self.obj) && matches(act, &self.act)
    }
}

impl std::fmt::Display for Permission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.obj, self.act)
    }
}

/// `match(x, y) ⇔ y = x ∨ y = "*"`; the request side never carries wildcards.
pub fn matches(requested: &str, stored: &str) -> bool {
    stored == WILDCARD || stored == requested
}

/// One persisted tuple. `v2` is empty for grants.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PolicyRule {
    pub kind: PolicyKind,
    pub v0: String,
    pub v1: String,
    pub v2: String,
}

impl PolicyRule {
    pub fn grant(user: &str, role: &str) -> Self {
        Self {
            kind: PolicyKind::Grant,
            v0: user.to_string(),
            v1: role.to_string(),
            v2: String::new(),
        }
    }

    pub fn role_permission(role: &str, obj: &str, act: &str) -> Self {
        Self {
            kind: PolicyKind::RolePermission,
            v0: role.to_string(),
            v1: obj.to_string(),
            v2: act.to_string(),
        }
    }

    pub fn direct_permission(user: &str, obj: &str, act: &str) -> Self {
        Self {
            kind: PolicyKind::DirectPermission,
            v0: user.to_string(),
            v1: obj.to_string(),
            v2: act.to_string(),
        }
    }

    pub fn field(&self, index: usize) -> Option<&str> {
        match index {
            0 => Some(&self.v0),
            1 => Some(&self.v1),
            2 => Some(&self.v2),
            _ => None,
        }
    }

    /// Filtered match: `values[i]` constrains field `index + i`; empty values match anything.
    pub fn matches_filter(&self, kind: PolicyKind, index: usize, values: &[&str]) -> bool {
        self.kind == kind
            && values.iter().enumerate().all(|(i, value)| {
                value.is_empty() || self.field(index + i).is_some_and(|field| field == *value)
            })
    }
}

/// Immutable, indexed view of every policy tuple.
#[derive(Debug, Clone, Default)]
pub struct PolicySet {
    /// user -> roles
    grants: HashMap<String, BTreeSet<String>>,
    /// role -> permissions
    role_permissions: HashMap<String, BTreeSet<Permission>>,
    /// user -> direct permissions
    direct_permissions: HashMap<String, BTreeSet<Permission>>,
}

impl PolicySet {
    pub fn from_rules<'a>(rules: impl IntoIterator<Item = &'a PolicyRule>) -> Self {
        let mut set = Self::default();
        for rule in rules {
            set.insert(rule);
        }
        set
    }

    /// Returns false when the tuple was already present.
    pub fn insert(&mut self, rule: &PolicyRule) -> bool {
        match rule.kind {
            PolicyKind::Grant => self
                .grants
                .entry(rule.v0.clone())
                .or_default()
                .insert(rule.v1.clone()),
            PolicyKind::RolePermission => self
                .role_permissions
                .entry(rule.v0.clone())
                .or_default()
                .insert(Permission::new(&rule.v1, &rule.v2)),
            PolicyKind::DirectPermission => self
                .direct_permissions
                .entry(rule.v0.clone())
                .or_default()
                .insert(Permission::new(&rule.v1, &rule.v2)),
        }
    }

    pub fn contains(&self, rule: &PolicyRule) -> bool {
        match rule.kind {
            PolicyKind::Grant => self
                .grants
                .get(&rule.v0)
                .is_some_and(|roles| roles.contains(&rule.v1)),
            PolicyKind::RolePermission => self
                .role_permissions
                .get(&rule.v0)
                .is_some_and(|perms| perms.contains(&Permission::new(&rule.v1, &rule.v2))),
            PolicyKind::DirectPermission => self
                .direct_permissions
                .get(&rule.v0)
                .is_some_and(|perms| perms.contains(&Permission::new(&rule.v1, &rule.v2))),
        }
    }

    /// Drops every tuple satisfying `keep == false`; returns how many went away.
    pub fn retain(&mut self, mut keep: impl FnMut(&PolicyRule) -> bool) -> usize {
        let before = self.len();
        let rules: Vec<PolicyRule> = self.rules().filter(|rule| keep(rule)).collect();
        *self = Self::from_rules(&rules);
        before - self.len()
    }

    pub fn len(&self) -> usize {
        self.grants.values().map(BTreeSet::len).sum::<usize>()
            + self.role_permissions.values().map(BTreeSet::len).sum::<usize>()
            + self.direct_permissions.values().map(BTreeSet::len).sum::<usize>()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every tuple, flattened back to rows.
    pub fn rules(&self) -> impl Iterator<Item = PolicyRule> + '_ {
        let grants = self.grants.iter().flat_map(|(user, roles)| {
            roles.iter().map(move |role| PolicyRule::grant(user, role))
        });
        let role_perms = self.role_permissions.iter().flat_map(|(role, perms)| {
            perms
                .iter()
                .map(move |p| PolicyRule::role_permission(role, &p.obj, &p.act))
        });
        let direct = self.direct_permissions.iter().flat_map(|(user, perms)| {
            perms
                .iter()
                .map(move |p| PolicyRule::direct_permission(user, &p.obj, &p.act))
        });
        grants.chain(role_perms).chain(direct)
    }

    /// `permit(u, o, a)`: a granted role covers `(o, a)`, or a direct permission does.
    pub fn permit(&self, user: &str, obj: &str, act: &str) -> bool {
        let via_role = self.grants.get(user).is_some_and(|roles| {
            roles.iter().any(|role| {
                self.role_permissions
                    .get(role)
                    .is_some_and(|perms| perms.iter().any(|p| p.covers(obj, act)))
            })
        });
        via_role
            || self
                .direct_permissions
                .get(user)
                .is_some_and(|perms| perms.iter().any(|p| p.covers(obj, act)))
    }

    pub fn roles_for(&self, user: &str) -> Vec<String> {
        self.grants
            .get(user)
            .map(|roles| roles.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn has_role(&self, user: &str, role: &str) -> bool {
        self.grants
            .get(user)
            .is_some_and(|roles| roles.contains(role))
    }

    pub fn role_permissions(&self, role: &str) -> Vec<Permission> {
        self.role_permissions
            .get(role)
            .map(|perms| perms.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn direct_permissions(&self, user: &str) -> Vec<Permission> {
        self.direct_permissions
            .get(user)
            .map(|perms| perms.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Actions the user holds through roles or directly, deduplicated and sorted.
    pub fn actions_for(&self, user: &str) -> Vec<String> {
        let mut actions = BTreeSet::new();
        for role in self.roles_for(user) {
            for perm in self.role_permissions(&role) {
                actions.insert(perm.act);
            }
        }
        for perm in self.direct_permissions(user) {
            actions.insert(perm.act);
        }
        actions.into_iter().collect()
    }
}
