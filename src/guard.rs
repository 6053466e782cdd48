use log::{error, info};

use crate::gateway::{Gateway, TokenStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectReason {
    InvalidLink,
    LinkUsed,
    TokenCheckFailed,
    Completed,
}

impl RedirectReason {
    pub fn code(&self) -> &'static str {
        match self {
            RedirectReason::InvalidLink => "invalid_link",
            RedirectReason::LinkUsed => "link_used",
            RedirectReason::TokenCheckFailed => "token_check_failed",
            RedirectReason::Completed => "completed",
        }
    }
}

/// Terminal outcome: the session ends and the candidate lands on the
/// thank-you page with the reason attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirect {
    pub interview_id: String,
    pub candidate_id: String,
    pub reason: RedirectReason,
}

impl Redirect {
    pub fn new(
        interview_id: impl Into<String>,
        candidate_id: impl Into<String>,
        reason: RedirectReason,
    ) -> Self {
        Self {
            interview_id: interview_id.into(),
            candidate_id: candidate_id.into(),
            reason,
        }
    }

    pub fn to_url(&self, base: &str) -> String {
        format!(
            "{base}?id={}&cid={}&reason={}",
            urlencoding::encode(&self.interview_id),
            urlencoding::encode(&self.candidate_id),
            self.reason.code()
        )
    }
}

#[derive(Debug)]
pub enum GuardDecision {
    Proceed,
    Redirect(Redirect),
}

/// Single-use link enforcement at session start. The token check fails
/// open by default: a backend outage should not lock candidates out of an
/// interview they were invited to.
pub struct SessionGuard {
    fail_closed: bool,
}

impl SessionGuard {
    pub fn new(fail_closed: bool) -> Self {
        Self { fail_closed }
    }

    pub async fn authorize<G: Gateway>(
        &self,
        gateway: &G,
        interview_id: &str,
        candidate_id: &str,
        token: Option<&str>,
    ) -> GuardDecision {
        let redirect =
            |reason| GuardDecision::Redirect(Redirect::new(interview_id, candidate_id, reason));

        let Some(token) = token.filter(|t| !t.is_empty()) else {
            return redirect(RedirectReason::InvalidLink);
        };

        match gateway.consume_token(token).await {
            Ok(TokenStatus::Accepted) => GuardDecision::Proceed,
            Ok(TokenStatus::Rejected) => redirect(RedirectReason::LinkUsed),
            Err(err) => {
                error!("token check failed: {err}");
                if self.fail_closed {
                    redirect(RedirectReason::TokenCheckFailed)
                } else {
                    info!("proceeding despite token check failure");
                    GuardDecision::Proceed
                }
            }
        }
    }
}
