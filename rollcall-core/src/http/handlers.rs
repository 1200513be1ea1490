//! HTTP handlers for the identity link endpoints and the join webhook
//!
//! Error detail is logged server-side only; members see short HTML pages.
//! Access credentials never reach a log line.

use super::state::AppState;
use crate::core_link::{LinkError, ProfileResult};
use crate::core_membership::blocklist;
use crate::core_membership::lifecycle::LifecycleError;
use crate::core_membership::record::{ExternalIdentity, MembershipRecord, MembershipStatus};
use crate::core_membership::types::{CommunityId, MemberId};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
    Json,
};
use metrics::counter;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Debug, Deserialize)]
pub struct StartParams {
    community: String,
    member: String,
}

#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    code: String,
    state: String,
}

#[derive(Debug, Deserialize)]
pub struct JoinEvent {
    community: String,
    member: String,
}

fn page(title: &str, body: &str) -> Html<String> {
    Html(format!(
        "<html><body style=\"font-family:sans-serif;text-align:center;padding:2em\">\
         <h1>{}</h1><p>{}</p></body></html>",
        title, body
    ))
}

/// GET /auth/start - begin the identity link round trip
pub async fn auth_start(
    State(state): State<Arc<AppState>>,
    Query(params): Query<StartParams>,
) -> Response {
    let member = MemberId::new(params.member);
    let community = CommunityId::new(params.community);

    // A record must exist before the redirect so the timeout clock is
    // anchored even for members who verify before the join event lands
    if let Err(e) = state.lifecycle.ensure_record(&member, &community) {
        error!(%member, %community, error = %e, "Could not ensure membership record");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            page("Verification Failed", "Something went wrong. Please try again later."),
        )
            .into_response();
    }

    match state.link.begin_authorization(&member, &community) {
        Ok(url) => {
            counter!("link.started").increment(1);
            Redirect::to(&url).into_response()
        }
        Err(e) => {
            error!(%member, %community, error = %e, "Could not begin authorization");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                page("Verification Failed", "Something went wrong. Please try again later."),
            )
                .into_response()
        }
    }
}

/// GET /auth/callback - provider redirect target
pub async fn auth_callback(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CallbackParams>,
) -> Response {
    let (link, profile) = match state
        .link
        .complete_authorization(&params.code, &params.state)
        .await
    {
        Ok(result) => result,
        Err(e) => return link_error_response(e),
    };

    let identity = match profile {
        ProfileResult::Linked(identity) => identity,
        ProfileResult::NotLinked => {
            info!(member = %link.member, "Identity has no linked game account");
            return (
                StatusCode::OK,
                page(
                    "No Game Account Linked",
                    "Your identity was confirmed, but it has no game account \
                     linked upstream. Link one with the identity provider, then \
                     request a new verification link.",
                ),
            )
                .into_response();
        }
    };

    let config = match state.store.community_config_or_default(&link.community) {
        Ok(config) => config,
        Err(e) => {
            error!(community = %link.community, error = %e, "Could not load community config");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                page("Verification Failed", "Something went wrong. Please try again later."),
            )
                .into_response();
        }
    };

    let blocked = blocklist::is_blocked(&identity.orgs, &config.blocklist);

    let record = match state
        .lifecycle
        .apply_identity_result(&link.member, &link.community, &identity, blocked)
    {
        Ok(record) => record,
        Err(LifecycleError::AlreadyVerified) => {
            // Informational, not an error: surface the handle on file
            let handle = state
                .lifecycle
                .lookup(&link.member, &link.community)
                .ok()
                .flatten()
                .and_then(|r| r.handle)
                .unwrap_or_default();
            return (
                StatusCode::OK,
                page(
                    "Already Verified",
                    &format!("You are already verified as <strong>{}</strong>.", handle),
                ),
            )
                .into_response();
        }
        Err(e) => {
            error!(member = %link.member, error = %e, "Could not commit identity result");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                page("Verification Failed", "Something went wrong. Please try again later."),
            )
                .into_response();
        }
    };

    counter!("link.completed").increment(1);
    if blocked {
        counter!("link.flagged").increment(1);
    }

    // Post-transition side effects are best-effort; the record change
    // above already committed
    finish_verification(&state, &record, &identity, &config).await;

    if record.status == MembershipStatus::Flagged {
        (
            StatusCode::OK,
            page(
                "Flagged for Review",
                &format!(
                    "Game account <strong>{}</strong> has been linked, but your \
                     membership has been flagged for moderator review.",
                    identity.handle
                ),
            ),
        )
            .into_response()
    } else {
        (
            StatusCode::OK,
            page(
                "Verified!",
                &format!(
                    "Game account <strong>{}</strong> has been linked. You now \
                     have full access. You can close this tab.",
                    identity.handle
                ),
            ),
        )
            .into_response()
    }
}

fn link_error_response(error: LinkError) -> Response {
    match error {
        LinkError::InvalidState => (
            StatusCode::BAD_REQUEST,
            page(
                "Invalid Verification Link",
                "This link is invalid or was already used. Request a new one \
                 from the community.",
            ),
        )
            .into_response(),
        LinkError::ExpiredState => (
            StatusCode::BAD_REQUEST,
            page(
                "Verification Link Expired",
                "This link has expired. Request a new one from the community \
                 and try again.",
            ),
        )
            .into_response(),
        LinkError::Upstream { status } => {
            error!(status, "Identity provider rejected the exchange");
            counter!("link.failed").increment(1);
            (
                StatusCode::BAD_GATEWAY,
                page(
                    "Verification Failed",
                    "The identity provider could not complete the verification. \
                     Please try again or contact a moderator.",
                ),
            )
                .into_response()
        }
        LinkError::Provider(detail) => {
            error!(%detail, "Identity provider unreachable");
            counter!("link.failed").increment(1);
            (
                StatusCode::BAD_GATEWAY,
                page(
                    "Verification Failed",
                    "The identity provider could not complete the verification. \
                     Please try again or contact a moderator.",
                ),
            )
                .into_response()
        }
        LinkError::Storage(e) => {
            error!(error = %e, "Storage failure during callback");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                page("Verification Failed", "Something went wrong. Please try again later."),
            )
                .into_response()
        }
    }
}

/// Role grant, member notification and audit entry after a committed
/// identity result. All best-effort.
async fn finish_verification(
    state: &AppState,
    record: &MembershipRecord,
    identity: &ExternalIdentity,
    config: &crate::core_membership::community::CommunityConfig,
) {
    let member = &record.member;
    let community = &record.community;
    let verified = record.status == MembershipStatus::Verified;

    if verified {
        if let Some(role) = &config.verified_role {
            if let Err(e) = state.gateway.grant_role(community, member, role).await {
                warn!(%member, %community, error = %e, "Could not grant verified role");
            }
        }
    }

    let notice = if verified {
        format!(
            "Your game account {} has been verified! You now have full access.",
            identity.handle
        )
    } else {
        format!(
            "Your game account {} has been linked, but your membership has been \
             flagged for moderator review due to org membership.",
            identity.handle
        )
    };
    if let Err(e) = state.gateway.send_direct(member, &notice).await {
        warn!(%member, error = %e, "Could not notify member after verification");
    }

    if let Some(log_channel) = &config.log_channel {
        let org_list = if identity.orgs.is_empty() {
            "None".to_string()
        } else {
            identity
                .orgs
                .iter()
                .map(|o| format!("{} [{}]", o.name, o.tag))
                .collect::<Vec<_>>()
                .join(", ")
        };
        let audit = format!(
            "{}: {} linked game account {} (record #{}). Orgs: {}. Account created: {}.",
            if verified { "Verified" } else { "FLAGGED" },
            member,
            identity.handle,
            identity.record_id,
            org_list,
            identity.account_created,
        );
        if let Err(e) = state.gateway.send_channel(community, log_channel, &audit).await {
            warn!(%community, error = %e, "Could not write verification audit entry");
        }
    }
}

/// POST /events/member-join - membership-join notification from the
/// platform adapter
pub async fn member_join(
    State(state): State<Arc<AppState>>,
    Json(event): Json<JoinEvent>,
) -> Response {
    let member = MemberId::new(event.member);
    let community = CommunityId::new(event.community);

    match state.onboarding.handle_member_join(&member, &community).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => {
            error!(%member, %community, error = %e, "Could not process join event");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
