use crate::{
    api::STATUS_PATH,
    gate::{
        canonical_path, enforcement_enabled, is_under, DEFAULT_LANDING_PATH, DEFAULT_LOGIN_PATH,
    },
    session::DEFAULT_SESSION_COOKIE,
};
use anyhow::{anyhow, Result};
use clap::{Arg, ArgAction, ArgMatches, Command};
use regex::Regex;
use std::time::Duration;

pub const ARG_ENABLE_AUTH: &str = "enable-auth";
pub const ARG_SESSION_COOKIE: &str = "session-cookie";
pub const ARG_LOGIN_PATH: &str = "login-path";
pub const ARG_LANDING_PATH: &str = "landing-path";
pub const ARG_PROTECTED_PATH: &str = "protected-path";
pub const ARG_STATUS_PATH: &str = "status-path";
pub const ARG_VERIFY_TIMEOUT: &str = "verify-timeout";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    pub enforce: bool,
    pub session_cookie: String,
    pub login_path: String,
    pub landing_path: String,
    pub protected_paths: Vec<String>,
    pub status_path: String,
    pub verify_timeout: Duration,
}

impl Options {
    /// Parse gate arguments from matches.
    ///
    /// # Errors
    /// Returns an error if a path or the cookie name is malformed, or if the
    /// login and landing paths would redirect into each other.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let read = |id: &str| -> Result<String> {
            matches
                .get_one::<String>(id)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .ok_or_else(|| anyhow!("missing required argument: --{id}"))
        };

        let read_path = |id: &str| -> Result<String> {
            let path = read(id)?;
            if valid_path(&path) {
                Ok(path)
            } else {
                Err(anyhow!("invalid path for --{id}: {path}"))
            }
        };

        let session_cookie = read(ARG_SESSION_COOKIE)?;
        if !valid_cookie_name(&session_cookie) {
            return Err(anyhow!(
                "invalid cookie name for --{ARG_SESSION_COOKIE}: {session_cookie}"
            ));
        }

        let login_path = read_path(ARG_LOGIN_PATH)?;
        let landing_path = read_path(ARG_LANDING_PATH)?;

        if is_root(&login_path) || is_root(&landing_path) {
            return Err(anyhow!(
                "--{ARG_LOGIN_PATH} and --{ARG_LANDING_PATH} cannot be the root path"
            ));
        }

        // A landing page inside the login area redirects to itself.
        if is_under(&landing_path, &login_path) {
            return Err(anyhow!(
                "--{ARG_LANDING_PATH} {landing_path} cannot be the login page or below it ({login_path})"
            ));
        }

        let protected_paths = matches
            .get_many::<String>(ARG_PROTECTED_PATH)
            .map(|values| {
                values
                    .map(|v| v.trim().to_string())
                    .filter(|v| !v.is_empty())
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();

        if let Some(bad) = protected_paths
            .iter()
            .find(|p| !valid_path(p) || is_root(p))
        {
            return Err(anyhow!("invalid path for --{ARG_PROTECTED_PATH}: {bad}"));
        }

        let verify_timeout = matches
            .get_one::<u64>(ARG_VERIFY_TIMEOUT)
            .copied()
            .map_or(crate::gate::verifier::DEFAULT_VERIFY_TIMEOUT, Duration::from_secs);

        Ok(Self {
            enforce: enforcement_enabled(
                matches.get_one::<String>(ARG_ENABLE_AUTH).map(String::as_str),
            ),
            session_cookie,
            login_path,
            landing_path,
            protected_paths,
            status_path: read_path(ARG_STATUS_PATH)?,
            verify_timeout,
        })
    }
}

/// Absolute, canonical URL path made of RFC 3986 path characters. A single
/// trailing slash is allowed.
#[must_use]
pub fn valid_path(path: &str) -> bool {
    Regex::new(r"^/[A-Za-z0-9._~!$&'()*+,;=:@%/-]*$").map_or(false, |re| re.is_match(path))
        && (path == "/" || canonical_path(path) == path.strip_suffix('/').unwrap_or(path))
}

fn is_root(path: &str) -> bool {
    path.trim_end_matches('/').is_empty()
}

/// RFC 7230 token.
#[must_use]
pub fn valid_cookie_name(name: &str) -> bool {
    Regex::new(r"^[!#$%&'*+.^_`|~0-9A-Za-z-]+$").map_or(false, |re| re.is_match(name))
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_ENABLE_AUTH)
                .long(ARG_ENABLE_AUTH)
                .help("Enforce authentication; only the exact value \"false\" disables it")
                .env("AUTHGATE_ENABLE_AUTH")
                .default_value("true"),
        )
        .arg(
            Arg::new(ARG_SESSION_COOKIE)
                .long(ARG_SESSION_COOKIE)
                .help("Name of the cookie carrying the session token")
                .env("AUTHGATE_SESSION_COOKIE")
                .default_value(DEFAULT_SESSION_COOKIE),
        )
        .arg(
            Arg::new(ARG_LOGIN_PATH)
                .long(ARG_LOGIN_PATH)
                .help("Login page path")
                .env("AUTHGATE_LOGIN_PATH")
                .default_value(DEFAULT_LOGIN_PATH),
        )
        .arg(
            Arg::new(ARG_LANDING_PATH)
                .long(ARG_LANDING_PATH)
                .help("Default landing path for signed-in users")
                .env("AUTHGATE_LANDING_PATH")
                .default_value(DEFAULT_LANDING_PATH),
        )
        .arg(
            Arg::new(ARG_PROTECTED_PATH)
                .long(ARG_PROTECTED_PATH)
                .help("Path prefix that requires a session, repeat or comma separate for more")
                .env("AUTHGATE_PROTECTED_PATHS")
                .action(ArgAction::Append)
                .value_delimiter(',')
                .default_value(DEFAULT_LANDING_PATH),
        )
        .arg(
            Arg::new(ARG_STATUS_PATH)
                .long(ARG_STATUS_PATH)
                .help("Backend auth status endpoint used to verify sessions")
                .env("AUTHGATE_STATUS_PATH")
                .default_value(STATUS_PATH),
        )
        .arg(
            Arg::new(ARG_VERIFY_TIMEOUT)
                .long(ARG_VERIFY_TIMEOUT)
                .help("Session verification timeout in seconds")
                .env("AUTHGATE_VERIFY_TIMEOUT")
                .default_value("5")
                .value_parser(clap::value_parser!(u64).range(1..=60)),
        )
}
