//! Shared state for the HTTP surface

use crate::core_link::LinkService;
use crate::core_membership::lifecycle::MembershipLifecycle;
use crate::core_membership::onboarding::Onboarding;
use crate::core_membership::storage::MembershipStore;
use crate::gateway::Gateway;
use std::sync::Arc;

/// State shared across HTTP requests
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<MembershipStore>,
    pub lifecycle: MembershipLifecycle,
    pub link: Arc<LinkService>,
    pub gateway: Arc<dyn Gateway>,
    pub onboarding: Arc<Onboarding>,
}

impl AppState {
    pub fn new(
        store: Arc<MembershipStore>,
        link: Arc<LinkService>,
        gateway: Arc<dyn Gateway>,
        onboarding: Arc<Onboarding>,
    ) -> Self {
        let lifecycle = MembershipLifecycle::new(store.clone());
        Self {
            store,
            lifecycle,
            link,
            gateway,
            onboarding,
        }
    }
}
