//! Authentication gate.
//!
//! Every inbound request is classified by path and resolved to exactly one
//! [`Decision`] before any route runs. The policy is a pure table over
//! (path class, token presence, verifier outcome); the only I/O is at most one
//! call to a [`SessionVerifier`] per request.

pub mod middleware;
pub mod verifier;

pub use self::middleware::{auth_gate, GateState};
pub use self::verifier::{HttpSessionVerifier, SessionVerifier, Verification};

use crate::session::SessionToken;
use tracing::debug;

pub const DEFAULT_LOGIN_PATH: &str = "/login";
pub const DEFAULT_LANDING_PATH: &str = "/dashboard";

/// Parse the enforcement flag: only the exact string `false` turns the gate off.
#[must_use]
pub fn enforcement_enabled(value: Option<&str>) -> bool {
    value != Some("false")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathClass {
    /// Requires a valid session.
    Protected,
    /// Login page; only for visitors without a session.
    AuthOnly,
    /// `/`, dispatches to login or landing.
    Root,
    /// Everything else.
    Public,
}

impl PathClass {
    #[must_use]
    pub const fn needs_verification(self) -> bool {
        !matches!(self, Self::Public)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Redirect(String),
}

#[derive(Debug, Clone)]
pub struct RequestContext {
    pub path: String,
    pub token: Option<SessionToken>,
}

impl RequestContext {
    #[must_use]
    pub fn new(path: &str, token: Option<SessionToken>) -> Self {
        Self {
            path: path.to_string(),
            token,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateConfig {
    pub enforce: bool,
    pub login_path: String,
    pub landing_path: String,
    pub protected_prefixes: Vec<String>,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            enforce: true,
            login_path: DEFAULT_LOGIN_PATH.to_string(),
            landing_path: DEFAULT_LANDING_PATH.to_string(),
            protected_prefixes: vec![DEFAULT_LANDING_PATH.to_string()],
        }
    }
}

impl GateConfig {
    #[must_use]
    pub fn new(enforce: bool) -> Self {
        Self {
            enforce,
            ..Self::default()
        }
    }

    /// Classify a raw request path. The path is canonicalized first, so
    /// `/%64ashboard`, `//dashboard` and `/x/../dashboard` land in the same
    /// class as `/dashboard`.
    #[must_use]
    pub fn classify(&self, path: &str) -> PathClass {
        let path = canonical_path(path);
        let path = path.as_str();
        if path == "/" {
            PathClass::Root
        } else if is_under(path, &self.login_path) {
            PathClass::AuthOnly
        } else if self
            .protected_prefixes
            .iter()
            .any(|prefix| is_under(path, prefix))
        {
            PathClass::Protected
        } else {
            PathClass::Public
        }
    }

    /// Policy table. `verification` is `None` when no token was presented.
    #[must_use]
    pub fn resolve(&self, class: PathClass, verification: Option<Verification>) -> Decision {
        if !self.enforce {
            return match class {
                PathClass::Root | PathClass::AuthOnly => self.to_landing(),
                PathClass::Protected | PathClass::Public => Decision::Allow,
            };
        }

        let valid = verification.is_some_and(Verification::is_valid);

        match class {
            PathClass::Protected if valid => Decision::Allow,
            PathClass::Protected => self.to_login(),
            // Verifier failures on the login page fall back to showing the form.
            PathClass::AuthOnly if valid => self.to_landing(),
            PathClass::AuthOnly => Decision::Allow,
            PathClass::Root if valid => self.to_landing(),
            PathClass::Root => self.to_login(),
            PathClass::Public => Decision::Allow,
        }
    }

    fn to_login(&self) -> Decision {
        Decision::Redirect(self.login_path.clone())
    }

    fn to_landing(&self) -> Decision {
        Decision::Redirect(self.landing_path.clone())
    }
}

/// Decide what to do with a request. Never fails; calls `verifier` at most once.
pub async fn decide<V: SessionVerifier>(
    config: &GateConfig,
    ctx: &RequestContext,
    verifier: &V,
) -> Decision {
    let class = config.classify(&ctx.path);

    let verification = match &ctx.token {
        Some(token) if config.enforce && class.needs_verification() => {
            Some(verifier.verify(token).await)
        }
        _ => None,
    };

    let decision = config.resolve(class, verification);

    debug!(
        path = %ctx.path,
        ?class,
        has_token = ctx.token.is_some(),
        ?verification,
        ?decision,
        "gate decision"
    );

    decision
}

/// Path as the front-end router sees it: percent escapes decoded once, empty
/// and `.` segments dropped, `..` resolved. A backslash counts as a separator.
/// The result has no trailing slash unless it is `/`.
#[must_use]
pub fn canonical_path(raw: &str) -> String {
    let decoded = urlencoding::decode_binary(raw.as_bytes());
    let decoded = String::from_utf8_lossy(&decoded);

    let mut segments: Vec<&str> = Vec::new();
    for segment in decoded.split(['/', '\\']) {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            segment => segments.push(segment),
        }
    }

    format!("/{}", segments.join("/"))
}

// Segment-aware prefix match: `/dashboard/x` is under `/dashboard`, `/dashboards` is not.
pub(crate) fn is_under(path: &str, prefix: &str) -> bool {
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        return false;
    }

    path.strip_prefix(prefix)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
}
