//! Centralized authorization predicate
//!
//! Every privileged operation funnels through [`is_authorized`] with an
//! enumerated capability instead of re-deriving role logic at each call
//! site.

use crate::core_membership::community::CommunityConfig;
use crate::core_membership::types::{MemberId, RoleId};

/// What an operation requires of the acting member
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// Change community configuration (timeouts, roles, blocklist, rally)
    AdministerConfig,
    /// Inspect and revoke membership records
    ModerateMembers,
    /// Trigger a rally
    TriggerRally,
}

/// The acting member, as reported by the platform
#[derive(Debug, Clone)]
pub struct Actor {
    pub member: MemberId,
    pub roles: Vec<RoleId>,
    /// Platform-level community management permission
    pub manages_community: bool,
    /// Platform-level member moderation permission
    pub moderates_members: bool,
}

impl Actor {
    pub fn holds_any(&self, roles: &[RoleId]) -> bool {
        roles.iter().any(|r| self.roles.contains(r))
    }
}

/// Whether `actor` may exercise `capability` in the community `config`
/// belongs to.
///
/// Community managers are the super-authority: they pass every check.
pub fn is_authorized(actor: &Actor, config: &CommunityConfig, capability: Capability) -> bool {
    if actor.manages_community {
        return true;
    }

    match capability {
        Capability::AdministerConfig => false,
        Capability::ModerateMembers => actor.moderates_members,
        Capability::TriggerRally => actor.holds_any(&config.rally_allowed_roles),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_membership::types::CommunityId;

    fn actor(roles: &[&str]) -> Actor {
        Actor {
            member: MemberId::new("m1"),
            roles: roles.iter().map(|r| RoleId::new(*r)).collect(),
            manages_community: false,
            moderates_members: false,
        }
    }

    fn config_with_rally_roles(roles: &[&str]) -> CommunityConfig {
        let mut config = CommunityConfig::defaults(CommunityId::new("c1"));
        config.rally_allowed_roles = roles.iter().map(|r| RoleId::new(*r)).collect();
        config
    }

    #[test]
    fn test_manager_passes_everything() {
        let mut manager = actor(&[]);
        manager.manages_community = true;
        let config = config_with_rally_roles(&[]);

        assert!(is_authorized(&manager, &config, Capability::AdministerConfig));
        assert!(is_authorized(&manager, &config, Capability::ModerateMembers));
        assert!(is_authorized(&manager, &config, Capability::TriggerRally));
    }

    #[test]
    fn test_moderator_cannot_administer() {
        let mut moderator = actor(&[]);
        moderator.moderates_members = true;
        let config = config_with_rally_roles(&[]);

        assert!(is_authorized(&moderator, &config, Capability::ModerateMembers));
        assert!(!is_authorized(&moderator, &config, Capability::AdministerConfig));
    }

    #[test]
    fn test_rally_requires_allowed_role() {
        let config = config_with_rally_roles(&["officers"]);

        assert!(is_authorized(&actor(&["officers"]), &config, Capability::TriggerRally));
        assert!(!is_authorized(&actor(&["members"]), &config, Capability::TriggerRally));
        // Empty allow-list denies everyone without the platform permission
        let empty = config_with_rally_roles(&[]);
        assert!(!is_authorized(&actor(&["officers"]), &empty, Capability::TriggerRally));
    }
}
