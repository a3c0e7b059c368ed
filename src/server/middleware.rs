//! Wrappers applied around route handlers.

use super::auth::{grant_permission, parse_basic};
use super::{Incoming, Reply};
use crate::config::Credentials;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::Write;
use std::panic::{self, AssertUnwindSafe};
use tracing::{error, info};

/// Runs `handler`, turning a panic into a `500` that closes the connection.
pub fn recover<F>(request: &Incoming, handler: F) -> Reply
where
    F: FnOnce() -> Reply,
{
    match panic::catch_unwind(AssertUnwindSafe(handler)) {
        Ok(reply) => reply,
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| String::from("unknown panic"));
            error!(
                method = %request.method,
                url = %request.url,
                panic = %message,
                "handler panicked"
            );
            Reply::text(500, "Internal Server Error\n").with_header("Connection", "close")
        }
    }
}

pub fn log_request(request: &Incoming) {
    info!(
        method = %request.method,
        url = %request.url,
        protocol = %request.protocol,
        "request"
    );
}

/// Calls `next` only if the request carries credentials matching
/// `credentials`.
pub fn basic_auth<F>(request: &Incoming, credentials: Option<&Credentials>, next: F) -> Reply
where
    F: FnOnce() -> Reply,
{
    let (user, pass) = match request.header("Authorization").and_then(parse_basic) {
        Some(pair) => pair,
        None => {
            return Reply::text(401, "This endpoint requires authentication.\n")
                .with_header("WWW-Authenticate", "Basic")
        }
    };
    if !grant_permission(credentials, &user, &pass) {
        return Reply::text(401, "Bad credentials.\n");
    }
    next()
}

/// Compresses a successful reply if the client accepts gzip. Falls back to the
/// uncompressed reply if compression fails.
pub fn gzip(request: &Incoming, reply: Reply) -> Reply {
    let accepted = request
        .header("Accept-Encoding")
        .map_or(false, |value| value.contains("gzip"));
    if !accepted || reply.status != 200 {
        return reply;
    }

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    let compressed = encoder
        .write_all(&reply.body)
        .and_then(|_| encoder.finish());
    match compressed {
        Ok(body) => Reply { body, ..reply }
            .with_header("Content-Encoding", "gzip")
            .with_header("Vary", "Accept-Encoding"),
        Err(err) => {
            error!(url = %request.url, error = %err, "gzip failed");
            reply
        }
    }
}
