//! Argon2id password hashing.
//!
//! Hashes are stored in PHC string format, so the parameters used at hash time
//! travel with the hash and verification keeps working after the work factor
//! changes.

use anyhow::{Context, Result, anyhow};
use argon2::{
    Algorithm, Argon2, Params, PasswordHash, PasswordHasher, PasswordVerifier, Version,
    password_hash::{self, SaltString},
};
use rand::rngs::OsRng;
use std::sync::Arc;

/// Argon2 work factor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashParams {
    memory_kib: u32,
    iterations: u32,
    parallelism: u32,
}

impl HashParams {
    /// Default work factor: 19 MiB, 2 iterations, 1 lane.
    #[must_use]
    pub fn new() -> Self {
        Self {
            memory_kib: Params::DEFAULT_M_COST,
            iterations: Params::DEFAULT_T_COST,
            parallelism: Params::DEFAULT_P_COST,
        }
    }

    #[must_use]
    pub fn with_memory_kib(mut self, memory_kib: u32) -> Self {
        self.memory_kib = memory_kib;
        self
    }

    #[must_use]
    pub fn with_iterations(mut self, iterations: u32) -> Self {
        self.iterations = iterations;
        self
    }

    #[must_use]
    pub fn with_parallelism(mut self, parallelism: u32) -> Self {
        self.parallelism = parallelism;
        self
    }

    #[must_use]
    pub fn memory_kib(&self) -> u32 {
        self.memory_kib
    }

    #[must_use]
    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    #[must_use]
    pub fn parallelism(&self) -> u32 {
        self.parallelism
    }
}

impl Default for HashParams {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone)]
pub struct Argon2Hasher {
    params: Params,
    // Hash of a throwaway password at the configured work factor. Logins for
    // unknown usernames verify against it so both 401 paths cost one hash.
    decoy_hash: Arc<str>,
}

impl Argon2Hasher {
    /// # Errors
    /// Returns an error if argon2 rejects the parameters (e.g. memory below
    /// `8 * parallelism` KiB).
    pub fn new(params: HashParams) -> Result<Self> {
        let params = Params::new(
            params.memory_kib,
            params.iterations,
            params.parallelism,
            None,
        )
        .map_err(|e| anyhow!("invalid argon2 parameters: {e}"))?;

        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params.clone());
        let decoy_password = SaltString::generate(&mut OsRng);
        let decoy_hash = hash_password(&argon2, decoy_password.as_str())?;

        Ok(Self {
            params,
            decoy_hash: decoy_hash.into(),
        })
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    /// Hash a password on the blocking pool.
    ///
    /// # Errors
    /// Returns an error if hashing fails or the blocking task panics.
    pub async fn hash(&self, password: &str) -> Result<String> {
        let argon2 = self.argon2();
        let password = password.to_owned();

        tokio::task::spawn_blocking(move || hash_password(&argon2, &password))
            .await
            .context("password hashing task failed")?
    }

    /// Check a password against a stored PHC hash on the blocking pool.
    ///
    /// Returns `Ok(false)` on mismatch.
    ///
    /// # Errors
    /// Returns an error if the stored hash is malformed or the task panics.
    pub async fn verify(&self, password: &str, stored_hash: &str) -> Result<bool> {
        let argon2 = self.argon2();
        let password = password.to_owned();
        let stored_hash = stored_hash.to_owned();

        tokio::task::spawn_blocking(move || verify_password(&argon2, &password, &stored_hash))
            .await
            .context("password verification task failed")?
    }

    /// Spend one verification on a password that has no stored hash.
    ///
    /// The outcome is discarded; callers reject the login either way.
    ///
    /// # Errors
    /// Returns an error if the blocking task panics.
    pub async fn verify_decoy(&self, password: &str) -> Result<()> {
        let decoy_hash = self.decoy_hash.clone();
        self.verify(password, &decoy_hash).await.map(|_| ())
    }
}

fn hash_password(argon2: &Argon2<'_>, password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow!("failed to hash password: {e}"))?
        .to_string();
    Ok(hash)
}

fn verify_password(argon2: &Argon2<'_>, password: &str, stored_hash: &str) -> Result<bool> {
    let parsed =
        PasswordHash::new(stored_hash).map_err(|e| anyhow!("invalid password hash: {e}"))?;

    match argon2.verify_password(password.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(password_hash::Error::Password) => Ok(false),
        Err(e) => Err(anyhow!("failed to verify password: {e}")),
    }
}
