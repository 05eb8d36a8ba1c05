//! `PgStore` against a real Postgres.
//!
//! Each test starts its own container and skips when no container runtime
//! is reachable.

mod common;

use anyhow::Result;
use common::{TestDb, runtime_socket};
use seqauth::{
    accounts::{AccountError, AccountStore, NewAccount},
    db::{self, PgStore, PoolConfig},
    sequence::{
        self, BootstrapOutcome, IdAllocator, MAX_ID, SequenceError, SequenceStore,
        USER_ID_SEQUENCE,
    },
};
use std::{collections::HashSet, sync::Arc};

fn new_account(user_id: i64, username: &str) -> NewAccount {
    NewAccount {
        user_id,
        username: username.to_string(),
        password_hash: "$argon2id$v=19$m=64,t=1,p=1$c2FsdHNhbHQ$aGFzaA".to_string(),
    }
}

async fn set_last_id(store: &PgStore, last_id: i64) -> Result<()> {
    sqlx::query("UPDATE id_sequences SET last_id = $1 WHERE name = $2")
        .bind(last_id)
        .bind(USER_ID_SEQUENCE)
        .execute(store.pool())
        .await?;
    Ok(())
}

#[test]
fn runtime_socket_from_docker_host() {
    assert_eq!(runtime_socket(None), Some("/var/run/docker.sock"));
    assert_eq!(
        runtime_socket(Some("unix:///run/user/1000/podman/podman.sock")),
        Some("/run/user/1000/podman/podman.sock")
    );
    assert_eq!(runtime_socket(Some("tcp://127.0.0.1:2375")), None);
}

#[tokio::test]
async fn bootstrap_seeds_once() -> Result<()> {
    let Some(db) = TestDb::new().await? else {
        return Ok(());
    };

    assert_eq!(db.store.last_id(USER_ID_SEQUENCE).await?, None);
    assert_eq!(
        sequence::bootstrap(db.store.as_ref()).await,
        BootstrapOutcome::Created
    );
    assert_eq!(db.store.last_id(USER_ID_SEQUENCE).await?, Some(-1));

    let allocator = IdAllocator::for_user_ids(db.store.clone());
    assert_eq!(allocator.allocate().await?, 0);

    assert_eq!(
        sequence::bootstrap(db.store.as_ref()).await,
        BootstrapOutcome::Existing
    );
    assert_eq!(db.store.last_id(USER_ID_SEQUENCE).await?, Some(0));
    Ok(())
}

#[tokio::test]
async fn allocate_without_row_is_not_initialized() -> Result<()> {
    let Some(db) = TestDb::new().await? else {
        return Ok(());
    };

    let allocator = IdAllocator::for_user_ids(db.store.clone());
    let result = allocator.allocate().await;
    assert!(matches!(result, Err(SequenceError::NotInitialized(name)) if name == USER_ID_SEQUENCE));

    // nothing was created as a side effect
    assert_eq!(db.store.last_id(USER_ID_SEQUENCE).await?, None);
    Ok(())
}

#[tokio::test]
async fn allocation_wraps_at_max_id() -> Result<()> {
    let Some(db) = TestDb::new().await? else {
        return Ok(());
    };
    sequence::bootstrap(db.store.as_ref()).await;
    set_last_id(&db.store, MAX_ID - 2).await?;

    let allocator = IdAllocator::for_user_ids(db.store.clone());
    assert_eq!(allocator.allocate().await?, MAX_ID - 1);
    assert_eq!(allocator.allocate().await?, 0);
    assert_eq!(allocator.allocate().await?, 1);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_allocations_across_pools_are_unique() -> Result<()> {
    let Some(db) = TestDb::new().await? else {
        return Ok(());
    };
    sequence::bootstrap(db.store.as_ref()).await;

    // a second pool stands in for a second service instance
    let other_pool = db::connect(db.dsn(), &PoolConfig::new().with_max_connections(10)).await?;
    let other = Arc::new(PgStore::new(other_pool));

    let allocators = [
        IdAllocator::for_user_ids(db.store.clone()),
        IdAllocator::for_user_ids(other),
    ];

    let mut tasks = Vec::new();
    for i in 0..100 {
        let allocator = allocators[i % 2].clone();
        tasks.push(tokio::spawn(async move { allocator.allocate().await }));
    }

    let mut ids = HashSet::new();
    for task in tasks {
        let id = task.await??;
        assert!(ids.insert(id), "duplicate id {id}");
    }

    assert_eq!(ids, (0..100).collect::<HashSet<i64>>());
    assert_eq!(db.store.last_id(USER_ID_SEQUENCE).await?, Some(99));
    Ok(())
}

#[tokio::test]
async fn account_constraints_map_to_errors() -> Result<()> {
    let Some(db) = TestDb::new().await? else {
        return Ok(());
    };

    let alice = db.store.insert(new_account(0, "alice")).await?;
    assert_eq!(alice.user_id, 0);
    assert_eq!(alice.username, "alice");
    assert!(alice.created_at.ends_with('Z'));

    let result = db.store.insert(new_account(1, "alice")).await;
    assert!(matches!(result, Err(AccountError::UsernameTaken)));

    let result = db.store.insert(new_account(0, "bob")).await;
    assert!(matches!(result, Err(AccountError::UserIdTaken(0))));

    let found = db.store.find_by_username("alice").await?;
    assert_eq!(found.map(|account| account.internal_id), Some(alice.internal_id));
    assert!(db.store.find_by_username("bob").await?.is_none());
    Ok(())
}

#[tokio::test]
async fn schema_can_be_applied_twice() -> Result<()> {
    let Some(db) = TestDb::new().await? else {
        return Ok(());
    };

    db.store.insert(new_account(7, "carol")).await?;
    db::apply_schema(db.store.pool()).await?;

    assert!(db.store.find_by_username("carol").await?.is_some());
    Ok(())
}
