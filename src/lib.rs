//! # Seqauth (registration and login with sequential user ids)
//!
//! `seqauth` exposes two HTTP endpoints, `POST /auth/register` and
//! `POST /auth/login`, backed by Postgres.
//!
//! ## User id allocation
//!
//! Every account gets a public `user_id` in `[0, 1_000_000)`. Ids come from a
//! single-row counter (`id_sequences`, name `user_id`) that is advanced with an
//! atomic `UPDATE .. RETURNING` inside a transaction, so concurrent registrations
//! never observe the same pre-increment value. The counter wraps to `0` after
//! `999_999`.
//!
//! - **Gaps:** an id is consumed even when the account insert that follows fails.
//! - **Wraparound:** after one million allocations an id can collide with an existing
//!   account; the insert is then rejected with `409 Conflict`.
//! - **Bootstrap:** the counter row is created (seeded to `-1`) before the listener
//!   accepts traffic.
//!
//! ## Passwords
//!
//! Passwords are hashed with Argon2id. Login answers `401` with the same body for
//! unknown usernames and wrong passwords.

pub mod accounts;
pub mod api;
pub mod cli;
pub mod db;
pub mod sequence;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};
