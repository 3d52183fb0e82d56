//! Who may sign at which tier
use super::threshold::Tier;
use std::collections::HashMap;
use std::sync::Arc;

/// Authorization collaborator. Actors arrive already authenticated; this only
/// answers whether one may sign the given tier.
pub trait TierAuthorizer {
    fn is_authorized(&self, actor: &str, tier: Tier) -> bool;
}

impl<T: TierAuthorizer + ?Sized> TierAuthorizer for Arc<T> {
    fn is_authorized(&self, actor: &str, tier: Tier) -> bool {
        (**self).is_authorized(actor, tier)
    }
}

/// Every authenticated actor may sign every tier.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl TierAuthorizer for AllowAll {
    fn is_authorized(&self, _actor: &str, _tier: Tier) -> bool {
        true
    }
}

/// Actor to highest tier they may sign. A Tier 3 signer may also sign Tier 2.
#[derive(Debug, Clone, Default)]
pub struct ApproverRoster {
    grants: HashMap<String, Tier>,
}

impl ApproverRoster {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn grant(mut self, actor: &str, tier: Tier) -> Self {
        self.grants.insert(actor.trim().to_string(), tier);
        self
    }
    pub fn highest_tier(&self, actor: &str) -> Option<Tier> {
        self.grants.get(actor.trim()).copied()
    }
}

impl TierAuthorizer for ApproverRoster {
    fn is_authorized(&self, actor: &str, tier: Tier) -> bool {
        self.highest_tier(actor).is_some_and(|granted| granted >= tier)
    }
}

impl<'a> FromIterator<(&'a str, Tier)> for ApproverRoster {
    fn from_iter<I: IntoIterator<Item = (&'a str, Tier)>>(iter: I) -> Self {
        iter.into_iter()
            .fold(Self::new(), |roster, (actor, tier)| roster.grant(actor, tier))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn higher_tier_covers_lower() {
        let roster: ApproverRoster = [("mgr", Tier::Tier2), ("owner", Tier::Tier3)]
            .into_iter()
            .collect();

        assert!(roster.is_authorized("mgr", Tier::Tier2));
        assert!(!roster.is_authorized("mgr", Tier::Tier3));
        assert!(roster.is_authorized("owner", Tier::Tier2));
        assert!(!roster.is_authorized("stranger", Tier::Tier2));
    }
}
