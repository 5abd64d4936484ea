mod common;

use common::http::get;
use common::test_server::BeaconTestServer;
use std::collections::HashSet;
use std::thread;

const CLIENTS: usize = 8;
const HITS_PER_CLIENT: usize = 25;

#[test]
fn test_concurrent_hits_produce_whole_lines() {
    let server = BeaconTestServer::new();
    let addr = server.addr();

    let clients: Vec<_> = (0..CLIENTS)
        .map(|client| {
            thread::spawn(move || {
                for hit in 0..HITS_PER_CLIENT {
                    let target = format!("/?client={client}&hit={hit}&count=1");
                    assert_eq!(get(&addr, &target).0, 200);
                }
            })
        })
        .collect();
    for client in clients {
        client.join().unwrap();
    }

    let lines = server.flushed_log_lines();
    assert_eq!(lines.len(), CLIENTS * HITS_PER_CLIENT);

    let mut seen = HashSet::new();
    for line in &lines {
        let value: serde_json::Value = serde_json::from_str(line).unwrap();
        let key = (
            value["client"].as_str().unwrap().to_string(),
            value["hit"].as_str().unwrap().to_string(),
        );
        assert!(seen.insert(key), "duplicate line {line}");
    }

    let calls = server.store().calls();
    assert_eq!(calls.len(), CLIENTS * HITS_PER_CLIENT);
    assert_eq!(calls.iter().map(|(_, amount)| amount).sum::<i64>(), (CLIENTS * HITS_PER_CLIENT) as i64);
}

#[test]
fn test_per_client_order_is_preserved() {
    let server = BeaconTestServer::new();

    for hit in 0..20 {
        get(&server.addr(), &format!("/?hit={hit}"));
    }

    let hits: Vec<String> = server
        .flushed_log_lines()
        .iter()
        .map(|line| serde_json::from_str::<serde_json::Value>(line).unwrap()["hit"].to_string())
        .collect();
    let expected: Vec<String> = (0..20).map(|hit| format!("\"{hit}\"")).collect();
    assert_eq!(hits, expected);
}

#[test]
fn test_shutdown_flushes_queued_lines() {
    let server = BeaconTestServer::new();

    for hit in 0..50 {
        get(&server.addr(), &format!("/?hit={hit}"));
    }
    server.beacon().shutdown();

    let content = std::fs::read_to_string(server.log_path()).unwrap();
    assert_eq!(content.lines().count(), 50);
    assert!(content.ends_with('\n'));
}
