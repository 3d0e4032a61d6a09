//! Map validated CLI arguments to the action the binary runs.

use crate::cli::actions::{server::Args, Action};
use crate::cli::commands::{gate, ARG_API_URL, ARG_PORT, ARG_UPSTREAM_URL};
use anyhow::{Context, Result};

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>(ARG_PORT).copied().unwrap_or(8080);
    let upstream_url = matches
        .get_one::<String>(ARG_UPSTREAM_URL)
        .cloned()
        .context("missing required argument: --upstream-url")?;
    let api_url = matches
        .get_one::<String>(ARG_API_URL)
        .cloned()
        .context("missing required argument: --api-url")?;

    let gate = gate::Options::parse(matches)?;

    Ok(Action::Server(Args {
        port,
        upstream_url,
        api_url,
        gate,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_server_action() {
        temp_env::with_vars(
            [
                ("AUTHGATE_UPSTREAM_URL", Some("http://web:3000")),
                ("AUTHGATE_API_URL", Some("http://api:8000")),
                ("AUTHGATE_ENABLE_AUTH", Some("false")),
                ("AUTHGATE_PORT", None),
            ],
            || {
                let matches = crate::cli::commands::new().get_matches_from(vec!["authgate"]);
                let Ok(Action::Server(args)) = handler(&matches) else {
                    panic!("expected a server action");
                };

                assert_eq!(args.port, 8080);
                assert_eq!(args.upstream_url, "http://web:3000");
                assert_eq!(args.api_url, "http://api:8000");
                assert!(!args.gate.enforce);
            },
        );
    }

    #[test]
    fn invalid_gate_options_fail() {
        temp_env::with_vars(
            [
                ("AUTHGATE_UPSTREAM_URL", Some("http://web:3000")),
                ("AUTHGATE_LOGIN_PATH", Some("/dashboard")),
                ("AUTHGATE_LANDING_PATH", None),
            ],
            || {
                let matches = crate::cli::commands::new().get_matches_from(vec!["authgate"]);
                let result = handler(&matches);
                assert!(result.is_err());
                if let Err(err) = result {
                    assert!(err.to_string().contains("must differ"));
                }
            },
        );
    }
}
