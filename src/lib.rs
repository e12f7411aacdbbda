//! # Bastion
//!
//! Session security for the traffic bot admin panel: password verification
//! with failed-attempt lockout, HMAC-signed session tokens, and per-client
//! rate limiting on the admin API.
//!
//! The [`security::Security`] facade owns the policy; [`store`] persists admin
//! accounts; [`api`] exposes the facade over HTTP; [`cli`] wires it together
//! from flags and environment.

pub mod api;
pub mod cli;
pub mod security;
pub mod store;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};
