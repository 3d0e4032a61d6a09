//! # authgate
//!
//! `authgate` sits in front of a web front-end and decides, for every inbound
//! request, whether it may reach the front-end or must be redirected.
//!
//! ## Access classes
//!
//! - **Protected** (`/dashboard` and below by default): needs a live session,
//!   otherwise the visitor is sent to the login page.
//! - **Login** (`/login`): only for visitors without a session; signed-in
//!   visitors are sent to the dashboard.
//! - **Root** (`/`): dispatches to the dashboard or the login page.
//! - Everything else passes through untouched.
//!
//! ## Sessions
//!
//! The session token travels in a cookie (`access_token` by default) and is
//! checked against the backend's auth status endpoint with a short timeout.
//! A failed check never surfaces as an error page: protected paths fail
//! closed (redirect to login), the login page fails open (shows the form).
//!
//! ## Library API
//!
//! The binary only uses [`api::ApiClient::check_status`] through the
//! session verifier. [`api::ApiClient::status`], [`api::ApiClient::login`],
//! [`api::ApiClient::logout`] and [`api::ApiError::login_redirect`] are for
//! Rust front-end callers that talk to the same backend: they share the
//! cookie handling and the rule that a `401` from the status endpoint is not
//! a reason to send the user to the login page.
//!
//! Setting `AUTHGATE_ENABLE_AUTH=false` turns enforcement off for local and
//! demo setups: `/` and `/login` land on the dashboard, everything else passes.

pub mod api;
pub mod authgate;
pub mod cli;
pub mod gate;
pub mod session;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);
