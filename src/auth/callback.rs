use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::{Duration, Instant};

use log::{debug, warn};
use tiny_http::{Response, Server};
use url::Url;

use crate::error::AuthError;

pub const DEFAULT_CALLBACK_TIMEOUT: Duration = Duration::from_secs(120);

/// What a redirect to the callback URL carried.
#[derive(Debug, PartialEq, Eq)]
pub enum CallbackOutcome {
    Code(String),
    Denied(String),
    /// Not an authorization redirect (favicon, stray request, ...).
    Ignored,
}

/// Reads `code`/`state`/`error` from a redirect request path such as
/// `/callback?code=...&state=...`.
pub fn parse_callback(
    redirect: &Url,
    request_path: &str,
    expected_state: &str,
) -> Result<CallbackOutcome, AuthError> {
    let full = redirect
        .join(request_path)
        .map_err(|e| AuthError::Callback(format!("bad redirect request {request_path}: {e}")))?;
    if full.path() != redirect.path() {
        return Ok(CallbackOutcome::Ignored);
    }

    let mut code = None;
    let mut state = None;
    let mut error = None;
    for (k, v) in full.query_pairs() {
        match k.as_ref() {
            "code" => code = Some(v.into_owned()),
            "state" => state = Some(v.into_owned()),
            "error" => error = Some(v.into_owned()),
            _ => {}
        }
    }

    if code.is_none() && error.is_none() {
        return Ok(CallbackOutcome::Ignored);
    }
    if state.as_deref() != Some(expected_state) {
        return Err(AuthError::StateMismatch);
    }
    match (error, code) {
        (Some(error), _) => Ok(CallbackOutcome::Denied(error)),
        (None, Some(code)) => Ok(CallbackOutcome::Code(code)),
        (None, None) => Ok(CallbackOutcome::Ignored),
    }
}

/// Opens the consent page in the default browser. A failure is logged and
/// reported as `false`; callers still show the URL for manual use.
pub fn open_in_browser(url: &str) -> bool {
    launch_with(url, |u| open::that(u))
}

fn launch_with(url: &str, opener: impl FnOnce(&str) -> std::io::Result<()>) -> bool {
    match opener(url) {
        Ok(()) => true,
        Err(e) => {
            warn!("Could not open a browser for {url}: {e}");
            false
        }
    }
}

/// Loopback HTTP listener bound to the redirect URI's host and port.
pub struct CallbackListener {
    server: Server,
    redirect: Url,
}

impl CallbackListener {
    /// Binds before the browser is opened so the redirect cannot race us.
    pub fn bind(redirect_uri: &str) -> Result<Self, AuthError> {
        let redirect = Url::parse(redirect_uri)
            .map_err(|e| AuthError::Config(format!("invalid redirect_uri '{redirect_uri}': {e}")))?;

        let host = redirect
            .host_str()
            .ok_or_else(|| AuthError::Config(format!("redirect_uri missing host: {redirect_uri}")))?;
        let port = redirect.port_or_known_default().ok_or_else(|| {
            AuthError::Config(format!("redirect_uri missing/unknown port: {redirect_uri}"))
        })?;

        let bind_ip: IpAddr = match host {
            "localhost" | "127.0.0.1" => IpAddr::V4(Ipv4Addr::LOCALHOST),
            other => other.trim_matches(['[', ']']).parse::<IpAddr>().map_err(|_| {
                AuthError::Config(format!(
                    "redirect_uri host must be localhost/127.0.0.1 or an IP: {other}"
                ))
            })?,
        };
        let bind_addr = SocketAddr::new(bind_ip, port);

        let server = Server::http(bind_addr).map_err(|e| {
            AuthError::Callback(format!("failed to bind callback server on {bind_addr}: {e}"))
        })?;
        debug!("Callback listener bound on {bind_addr}");

        Ok(Self { server, redirect })
    }

    /// Blocks until the redirect delivers an authorization code for
    /// `expected_state`, or `timeout` elapses.
    pub fn wait_for_code(&self, expected_state: &str, timeout: Duration) -> Result<String, AuthError> {
        let wait_until = Instant::now() + timeout;

        while Instant::now() < wait_until {
            let Ok(maybe_request) = self.server.recv_timeout(Duration::from_millis(500)) else {
                continue;
            };
            let Some(request) = maybe_request else {
                continue;
            };

            let outcome = parse_callback(&self.redirect, request.url(), expected_state);
            let reply = match &outcome {
                Ok(CallbackOutcome::Code(_)) => "Authorization received. You can close this tab.",
                Ok(CallbackOutcome::Denied(_)) => "Authorization was declined. You can close this tab.",
                Ok(CallbackOutcome::Ignored) => "No code found in redirect.",
                Err(_) => "Bad redirect. You can close this tab.",
            };
            if let Err(e) = request.respond(Response::from_string(reply)) {
                warn!("Could not answer the browser: {e}");
            }

            // A redirect without our state is somebody else's; keep waiting.
            let outcome = match outcome {
                Err(AuthError::StateMismatch) => {
                    warn!("Ignoring a redirect with an unexpected state");
                    continue;
                }
                other => other?,
            };
            match outcome {
                CallbackOutcome::Code(code) => return Ok(code),
                CallbackOutcome::Denied(error) if error == "access_denied" => {
                    return Err(AuthError::AccessDenied);
                }
                CallbackOutcome::Denied(error) => {
                    return Err(AuthError::Rejected {
                        code: error,
                        description: "authorization redirect reported an error".to_string(),
                    });
                }
                CallbackOutcome::Ignored => continue,
            }
        }

        Err(AuthError::CallbackTimeout(timeout.as_secs()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn redirect() -> Url {
        Url::parse("http://127.0.0.1:8080/callback").unwrap()
    }

    #[test]
    fn code_with_matching_state_is_accepted() {
        let outcome = parse_callback(&redirect(), "/callback?code=4%2F0abc&state=xyz", "xyz").unwrap();
        assert_eq!(outcome, CallbackOutcome::Code("4/0abc".into()));
    }

    #[test]
    fn mismatched_state_is_rejected() {
        let err = parse_callback(&redirect(), "/callback?code=abc&state=evil", "xyz").unwrap_err();
        assert!(matches!(err, AuthError::StateMismatch));

        let err = parse_callback(&redirect(), "/callback?code=abc", "xyz").unwrap_err();
        assert!(matches!(err, AuthError::StateMismatch));
    }

    #[test]
    fn consent_denial_is_reported() {
        let outcome =
            parse_callback(&redirect(), "/callback?error=access_denied&state=xyz", "xyz").unwrap();
        assert_eq!(outcome, CallbackOutcome::Denied("access_denied".into()));
    }

    #[test]
    fn denial_without_our_state_is_rejected() {
        let err = parse_callback(&redirect(), "/callback?error=access_denied&state=evil", "xyz")
            .unwrap_err();
        assert!(matches!(err, AuthError::StateMismatch));

        let err = parse_callback(&redirect(), "/callback?error=access_denied", "xyz").unwrap_err();
        assert!(matches!(err, AuthError::StateMismatch));
    }

    #[test]
    fn forged_redirect_does_not_end_the_wait() {
        let listener = CallbackListener::bind("http://127.0.0.1:0/callback").unwrap();
        let port = listener.server.server_addr().port();

        let browser = std::thread::spawn(move || {
            let base = format!("http://127.0.0.1:{port}/callback");
            let forged = reqwest::blocking::get(format!("{base}?error=access_denied&state=evil"))
                .unwrap()
                .text()
                .unwrap();
            reqwest::blocking::get(format!("{base}?code=real&state=xyz")).unwrap();
            forged
        });

        let code = listener.wait_for_code("xyz", Duration::from_secs(10)).unwrap();
        assert_eq!(code, "real");
        assert!(browser.join().unwrap().starts_with("Bad redirect"));
    }

    #[test]
    fn unrelated_requests_are_ignored() {
        assert_eq!(
            parse_callback(&redirect(), "/favicon.ico", "xyz").unwrap(),
            CallbackOutcome::Ignored
        );
        assert_eq!(
            parse_callback(&redirect(), "/callback", "xyz").unwrap(),
            CallbackOutcome::Ignored
        );
    }

    #[test]
    fn browser_failure_is_reported_not_swallowed() {
        let failed = launch_with("http://auth.example/consent", |_| {
            Err(std::io::Error::new(std::io::ErrorKind::NotFound, "no browser"))
        });
        assert!(!failed);

        let mut opened = None;
        assert!(launch_with("http://auth.example/consent", |u| {
            opened = Some(u.to_string());
            Ok(())
        }));
        assert_eq!(opened.as_deref(), Some("http://auth.example/consent"));
    }

    #[test]
    fn non_loopback_hostname_is_a_config_error() {
        let err = CallbackListener::bind("https://example.com/callback").err().unwrap();
        assert!(matches!(err, AuthError::Config(_)));
    }
}
