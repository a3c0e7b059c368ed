//! HTTP Basic authentication for the protected routes.

use crate::config::Credentials;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use tracing::warn;

/// Extracts the user and password from an `Authorization: Basic ...` header
/// value. Returns `None` for any other scheme or a malformed payload.
pub fn parse_basic(header: &str) -> Option<(String, String)> {
    let (scheme, payload) = header.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    let decoded = STANDARD.decode(payload.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (user, pass) = decoded.split_once(':')?;
    Some((user.to_owned(), pass.to_owned()))
}

/// Reports whether `user` and `pass` match the configured credentials. With
/// no credentials configured nobody is let in.
pub fn grant_permission(credentials: Option<&Credentials>, user: &str, pass: &str) -> bool {
    let credentials = match credentials {
        Some(credentials) => credentials,
        None => {
            warn!("BASIC_AUTH_USER and BASIC_AUTH_PASS must be set");
            return false;
        }
    };
    // evaluate both so a wrong user takes as long as a wrong password
    let user_ok = matches(user, &credentials.user);
    let pass_ok = matches(pass, &credentials.pass);
    user_ok & pass_ok
}

// Hashing first gives equal-length inputs, so the comparison time doesn't
// depend on where the strings differ or how long they are.
fn matches(a: &str, b: &str) -> bool {
    let a = Sha256::digest(a.as_bytes());
    let b = Sha256::digest(b.as_bytes());
    a.as_slice().ct_eq(b.as_slice()).into()
}
