//! Identity Link Protocol
//!
//! OAuth-style authorization-code exchange with PKCE against the external
//! identity provider. Correlation tokens bind the provider's callback to
//! the (member, community) pair that initiated the link; they are
//! single-use and expire after ten minutes. PKCE verifiers are held only
//! in process memory.

pub mod error;
pub mod pkce;
pub mod provider;
pub mod service;
pub mod token;

pub use error::LinkError;
pub use pkce::VerifierCache;
pub use provider::{HttpIdentityProvider, IdentityProvider, ProfileResult, ProviderSettings};
pub use service::LinkService;
pub use token::{LinkState, LINK_STATE_TTL};
