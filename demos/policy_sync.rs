//! Example keeping two policy replicas in sync over a shared bus.
//!
//! This example shows how to:
//! - Start two watchers on one channel
//! - Apply peers' structured changes to a local rule set
//! - Skip notifications a replica published itself
//! - Fall back to a full reload on a bare ping
//!
//! Run with: cargo run --example policy_sync
//!
//! Pass `--redis` to run against a real broker instead of the in-process
//! bus; the endpoint is read from WATCHER_HOST, WATCHER_PORT and friends.

use policy_watcher::prelude::*;
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

type Rules = Arc<Mutex<BTreeSet<Vec<String>>>>;

/// Applies a peer's change to a local replica.
fn apply(replica: &str, own_id: &str, rules: &Rules, payload: &str) {
    let msg: Message = match serde_json::from_str(payload) {
        Ok(msg) => msg,
        Err(_) => {
            println!("[{}] ping received, would reload full policy", replica);
            return;
        }
    };
    if msg.is_from(own_id) {
        return;
    }

    let mut rules = rules.lock().unwrap();
    match msg.method {
        UpdateType::AddPolicy => {
            rules.insert(msg.new_rule);
        }
        UpdateType::RemovePolicy => {
            rules.remove(&msg.new_rule);
        }
        UpdateType::AddPolicies => rules.extend(msg.new_rules),
        UpdateType::RemovePolicies => {
            for rule in &msg.new_rules {
                rules.remove(rule);
            }
        }
        UpdateType::UpdatePolicy => {
            rules.remove(&msg.old_rule);
            rules.insert(msg.new_rule);
        }
        UpdateType::RemoveFilteredPolicy => {
            let start = msg.field_index.max(0) as usize;
            rules.retain(|rule| {
                !msg.field_values
                    .iter()
                    .enumerate()
                    .all(|(i, value)| value.is_empty() || rule.get(start + i) == Some(value))
            });
        }
        other => println!("[{}] {} received, would reload full policy", replica, other),
    }
    println!("[{}] applied {} -> {} rules", replica, msg.method, rules.len());
}

fn start_replica(name: &'static str, watcher: &Watcher) -> Rules {
    let rules: Rules = Arc::new(Mutex::new(BTreeSet::new()));
    let rules_clone = Arc::clone(&rules);
    let own_id = watcher.id().to_string();
    watcher.set_payload_callback(move |payload| apply(name, &own_id, &rules_clone, payload));
    rules
}

fn rule(fields: &[&str]) -> Vec<String> {
    fields.iter().map(|f| f.to_string()).collect()
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("policy_watcher=info".parse().unwrap()))
        .init();

    println!("=== Policy Sync Example ===\n");

    let use_redis = std::env::args().any(|arg| arg == "--redis");
    let (options, bus): (WatcherOptions, Option<Arc<dyn Bus>>) = if use_redis {
        (OptionsLoader::new().with_env_overrides("WATCHER", "__").load()?, None)
    } else {
        (WatcherOptions::default(), Some(Arc::new(MemoryBus::new()) as Arc<dyn Bus>))
    };
    let options = options.with_channel("/casbin-demo");

    let start = || {
        let builder = Watcher::builder().with_options(options.clone());
        match &bus {
            Some(bus) => builder.with_bus(Arc::clone(bus)),
            None => builder,
        }
        .build()
    };
    let east = start()?;
    let west = start()?;

    let east_rules = start_replica("east", &east);
    let west_rules = start_replica("west", &west);
    east.wait_until_subscribed(Duration::from_secs(5)).await?;
    west.wait_until_subscribed(Duration::from_secs(5)).await?;
    println!("Both replicas subscribed\n");

    println!("--- east adds two rules ---");
    for fields in [["alice", "data1", "read"], ["alice", "data1", "write"]] {
        east_rules.lock().unwrap().insert(rule(&fields));
        east.update_for_add_policy("p", "p", rule(&fields)).await;
    }
    tokio::time::sleep(Duration::from_millis(100)).await;

    println!("\n--- west revokes every write permission ---");
    west_rules
        .lock()
        .unwrap()
        .retain(|r| r.get(2).map(String::as_str) != Some("write"));
    west.update_for_remove_filtered_policy("p", "p", 2, rule(&["write"])).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    println!("\n--- east pings ---");
    east.update().await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    println!("\nFinal rules:");
    println!("  east: {:?}", east_rules.lock().unwrap());
    println!("  west: {:?}", west_rules.lock().unwrap());

    east.close().await;
    west.close().await;
    println!("\nExample complete!");

    Ok(())
}
