//! Deny-list evaluation for organization affiliations

use super::record::OrgAffiliation;

/// Decide whether a set of org affiliations trips the community deny-list.
///
/// Tags are compared case-insensitively. An empty deny-list never flags.
pub fn is_blocked(orgs: &[OrgAffiliation], blocklist: &[String]) -> bool {
    if blocklist.is_empty() {
        return false;
    }

    orgs.iter().any(|org| {
        blocklist
            .iter()
            .any(|blocked| blocked.eq_ignore_ascii_case(&org.tag))
    })
}
