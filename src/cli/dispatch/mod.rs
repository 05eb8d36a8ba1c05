use crate::{
    accounts::HashParams,
    cli::{
        actions::{Action, server::Args},
        commands::{ARG_DSN, ARG_MAX_CONNECTIONS, ARG_PORT, hashing},
    },
    db::PoolConfig,
};
use anyhow::{Context, Result};
use secrecy::SecretString;

/// # Errors
/// Returns an error if required arguments are missing.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>(ARG_PORT).copied().unwrap_or(4000);
    let dsn = matches
        .get_one::<String>(ARG_DSN)
        .cloned()
        .map(SecretString::from)
        .context("missing required argument: --dsn")?;

    let mut pool = PoolConfig::new();
    if let Some(max) = matches.get_one::<u32>(ARG_MAX_CONNECTIONS).copied() {
        pool = pool.with_max_connections(max);
    }

    let mut hash = HashParams::new();
    if let Some(memory_kib) = matches
        .get_one::<u32>(hashing::ARG_HASH_MEMORY_KIB)
        .copied()
    {
        hash = hash.with_memory_kib(memory_kib);
    }
    if let Some(iterations) = matches.get_one::<u32>(hashing::ARG_HASH_ITERATIONS).copied() {
        hash = hash.with_iterations(iterations);
    }
    if let Some(parallelism) = matches
        .get_one::<u32>(hashing::ARG_HASH_PARALLELISM)
        .copied()
    {
        hash = hash.with_parallelism(parallelism);
    }

    Ok(Action::Server(Args {
        port,
        dsn,
        pool,
        hash,
    }))
}
