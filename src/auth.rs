//! Basic-auth gating of the HTTP surface.
//!
//! Every route is wrapped by [`CredentialGate`]: requests that do not
//! carry credentials exactly matching the configured pair are answered
//! with `401 Unauthorized.` and never reach a handler. Rejection does
//! not distinguish between missing and wrong credentials.
//!
//! The expected pair is read from the `BASIC_AUTH_USER` and
//! `BASIC_AUTH_PASS` environment variables once at startup. If either
//! is absent no request can authenticate; the gate stays closed rather
//! than falling open.
//!
//! The comparison is a plain string equality, matching the upstream
//! behavior this exporter mirrors. It is neither constant-time nor
//! rate-limited.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

/// Environment variable holding the expected username.
pub const BASIC_AUTH_USER_VAR: &str = "BASIC_AUTH_USER";
/// Environment variable holding the expected password.
pub const BASIC_AUTH_PASS_VAR: &str = "BASIC_AUTH_PASS";

/// The expected username/password pair.
///
/// Immutable for the process lifetime. Either side may be absent, in
/// which case authentication always fails.
#[derive(Debug, Clone)]
pub struct Credentials {
    user: Option<String>,
    pass: Option<String>,
}

impl Credentials {
    /// Creates a credential pair directly.
    pub fn new(user: Option<String>, pass: Option<String>) -> Self {
        Self { user, pass }
    }

    /// Reads the expected pair from the process environment.
    pub fn from_env() -> Self {
        Self {
            user: std::env::var(BASIC_AUTH_USER_VAR).ok(),
            pass: std::env::var(BASIC_AUTH_PASS_VAR).ok(),
        }
    }
}

/// Boundary check applied to every inbound request.
///
/// Stateless between requests: each call inspects one `Authorization`
/// header value and decides accept or reject.
#[derive(Debug, Clone)]
pub struct CredentialGate {
    expected: Credentials,
}

impl CredentialGate {
    /// Creates a gate around the expected credential pair.
    pub fn new(expected: Credentials) -> Self {
        Self { expected }
    }

    /// Decides whether a request carrying this `Authorization` header
    /// value may pass.
    ///
    /// Returns `false` for a missing or undecodable header, for an
    /// empty or whitespace-only username or password, and for any
    /// mismatch against the expected pair.
    pub fn authorize(&self, header: Option<&str>) -> bool {
        let Some((user, pass)) = header.and_then(decode_basic) else {
            return false;
        };

        if user.trim().is_empty() || pass.trim().is_empty() {
            return false;
        }

        match (&self.expected.user, &self.expected.pass) {
            (Some(expected_user), Some(expected_pass)) => {
                user == *expected_user && pass == *expected_pass
            }
            _ => false,
        }
    }
}

/// Extracts the username/password pair from a `Basic` authorization
/// header value.
fn decode_basic(header: &str) -> Option<(String, String)> {
    let (scheme, payload) = header.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("Basic") {
        return None;
    }

    let decoded = BASE64.decode(payload.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (user, pass) = decoded.split_once(':')?;
    Some((user.to_string(), pass.to_string()))
}
