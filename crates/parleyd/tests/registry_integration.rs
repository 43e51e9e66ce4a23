//! Integration tests for the member registry under concurrent access.
//!
//! These tests drive the public registry API the way the server does:
//! many tasks joining, leaving, and broadcasting at once. Writers are
//! in-memory duplex pipes so delivery failures can be forced
//! deterministically by dropping the peer end.
//!
//! Tests CAN use `.unwrap()` and `.expect()`; the panic-free policy applies
//! to production code only.

use std::sync::Arc;

use parley_core::MemberName;
use parleyd::registry::Registry;
use tokio::io::{duplex, AsyncReadExt, DuplexStream};
use tokio::sync::Mutex;

const JOINERS: u64 = 64;

fn name(raw: &str) -> MemberName {
    MemberName::parse(raw).unwrap()
}

async fn join(registry: &Registry<DuplexStream>, id: u64) -> DuplexStream {
    let (ours, theirs) = duplex(64 * 1024);
    registry
        .add(id, name(&format!("member-{id}")), Arc::new(Mutex::new(ours)))
        .await
        .unwrap();
    theirs
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_joins_never_lose_or_duplicate_entries() {
    let registry = Arc::new(Registry::new());

    let mut handles = Vec::new();
    for id in 0..JOINERS {
        let registry = Arc::clone(&registry);
        handles.push(tokio::spawn(async move { join(&registry, id).await }));
    }

    let mut peers = Vec::new();
    for handle in handles {
        peers.push(handle.await.unwrap());
    }

    // Every successful handshake is represented exactly once.
    assert_eq!(registry.len().await, JOINERS as usize);
    let mut ids: Vec<String> = registry
        .member_names()
        .await
        .iter()
        .map(|n| n.as_str().to_string())
        .collect();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), JOINERS as usize);

    drop(peers);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn departures_racing_broadcasts_keep_counts_consistent() {
    let registry = Arc::new(Registry::new());

    let mut peers = Vec::new();
    for id in 0..JOINERS {
        peers.push(join(&registry, id).await);
    }

    // Half the members leave while another task broadcasts continuously.
    // Peers are kept alive so no delivery fails; only explicit removal
    // may change the count.
    let broadcaster = {
        let registry = Arc::clone(&registry);
        tokio::spawn(async move {
            for round in 0..50u32 {
                let line = format!("round {round}\n");
                registry.broadcast(u64::MAX, line.as_bytes()).await;
            }
        })
    };

    let mut handles = Vec::new();
    for id in 0..(JOINERS / 2) {
        let registry = Arc::clone(&registry);
        handles.push(tokio::spawn(async move {
            // Quit handling and disconnect detection can both remove the
            // same member; the second call must be a no-op.
            registry.remove(id).await;
            registry.remove(id).await;
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    // Drain the peers concurrently so the broadcaster never stalls on a
    // full pipe, then let it finish.
    let drainers: Vec<_> = peers
        .into_iter()
        .map(|mut peer| {
            tokio::spawn(async move {
                let mut sink = vec![0u8; 4096];
                while let Ok(n) = peer.read(&mut sink).await {
                    if n == 0 {
                        break;
                    }
                }
            })
        })
        .collect();

    broadcaster.await.unwrap();
    assert_eq!(registry.len().await, (JOINERS / 2) as usize);

    drop(registry);
    for drainer in drainers {
        drainer.await.unwrap();
    }
}

#[tokio::test]
async fn dead_recipient_is_evicted_once_while_others_receive() {
    let registry = Arc::new(Registry::new());

    let mut alive = join(&registry, 1).await;
    let dead = join(&registry, 2).await;
    let mut bystander = join(&registry, 3).await;

    drop(dead);

    // Two consecutive broadcasts: the first discovers the dead pipe and
    // evicts; the second must find a registry that already settled.
    registry.broadcast(0, b"first").await;
    registry.broadcast(0, b"second").await;

    assert_eq!(registry.len().await, 2);

    let mut buf = vec![0u8; 1024];
    let n = alive.read(&mut buf).await.unwrap();
    let mut received = String::from_utf8_lossy(&buf[..n]).into_owned();
    while !received.contains("second") {
        let n = alive.read(&mut buf).await.unwrap();
        received.push_str(&String::from_utf8_lossy(&buf[..n]));
    }
    assert!(received.contains("first"));

    let n = bystander.read(&mut buf).await.unwrap();
    let mut received = String::from_utf8_lossy(&buf[..n]).into_owned();
    while !received.contains("second") {
        let n = bystander.read(&mut buf).await.unwrap();
        received.push_str(&String::from_utf8_lossy(&buf[..n]));
    }
    assert!(received.contains("first"));
}
