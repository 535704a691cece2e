use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use serde::Deserialize;
use tokio::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

use attrwatch_core::impls::InMemorySource;
use attrwatch_core::policy::wrapped;
use attrwatch_core::ports::{DataSource, SourceError};
use attrwatch_core::sync::{fetch_into, save_from};
use attrwatch_core::{
    AttributeStore, CloneDepth, Config, EventFilter, NestedValuePolicy, Renderer, StoreError,
};

#[derive(Debug, Deserialize)]
struct Name {
    first: String,
    last: String,
}

#[derive(Debug, Deserialize)]
struct Profile {
    company: String,
    role: String,
    name: Name,
}

/// Counts round trips to the underlying source.
struct CountingServer {
    inner: InMemorySource,
    calls: AtomicU32,
}

impl CountingServer {
    fn new(inner: InMemorySource) -> Self {
        Self {
            inner,
            calls: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl DataSource for CountingServer {
    async fn fetch(&self, key: &str) -> Result<serde_json::Value, SourceError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        self.inner.fetch(key).await
    }

    async fn save(&self, key: &str, document: serde_json::Value) -> Result<(), SourceError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        self.inner.save(key, document).await
    }
}

fn seed() -> serde_json::Value {
    serde_json::json!({
        "company": "Crittercism",
        "role": "engineer",
        "name": {"first": "Kazu", "last": "Omatsu"}
    })
}

/// Mutates the nested value in place and sets the same reference back.
fn in_place_edit(store: &AttributeStore) -> Result<(), StoreError> {
    let mut renderer = Renderer::new();
    renderer.watch(store, EventFilter::Any);

    if let Some(name) = store.get("name")
        && let Some(map) = name.as_map()
    {
        map.borrow_mut().insert("first".to_string(), "Kazuhiro".into());
        store.set("name", name.clone())?;
    }
    println!("  in-place edit: renders={} (stays stale)", renderer.render_count());
    Ok(())
}

async fn run_policy(
    server: &CountingServer,
    config: &Config,
    policy: NestedValuePolicy,
) -> Result<(), StoreError> {
    println!("policy: {policy:?}");
    let store = config.build_store()?;

    fetch_into(server, "profile", &store, &policy).await?;

    let mut renderer = Renderer::new();
    renderer.watch(&store, EventFilter::Any);
    let _wiring = match policy {
        NestedValuePolicy::WrapChild => wrapped::bubble_all(&store),
        _ => Vec::new(),
    };

    policy.update(&store, &["name", "first"], "Kazuhiro")?;
    println!(
        "  renders={} last={}",
        renderer.render_count(),
        renderer.last_output().unwrap_or_default()
    );

    save_from(server, "profile", &store, &policy).await?;
    Ok(())
}

/// `attrwatch-cli [config.json] [--all]`
///
/// Runs the configured policy, or every policy with `--all`.
fn parse_args() -> Result<(Config, bool), Box<dyn std::error::Error>> {
    let mut config = Config::default();
    let mut all = false;
    for arg in std::env::args().skip(1) {
        if arg == "--all" {
            all = true;
        } else {
            config = Config::from_json_str(&std::fs::read_to_string(&arg)?)?;
            info!(path = %arg, policy = ?config.policy, "config loaded");
        }
    }
    Ok((config, all))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let (config, all) = parse_args()?;
    let policies = if all {
        vec![
            NestedValuePolicy::WrapChild,
            config.flatten_policy(),
            NestedValuePolicy::CloneBeforeReplace {
                depth: CloneDepth::Shallow,
            },
        ]
    } else {
        vec![config.policy]
    };
    let source = InMemorySource::new().with_latency(Duration::from_millis(20));
    let server = CountingServer::new(source.clone());

    println!("defect: nested object edited in place");
    source.insert("profile", seed()).await;
    let store = AttributeStore::from_json(&seed())?;
    in_place_edit(&store)?;

    for policy in policies {
        source.insert("profile", seed()).await;
        run_policy(&server, &config, policy).await?;

        let saved = source.document("profile").await.unwrap_or_default();
        let profile: Profile = serde_json::from_value(saved)?;
        println!(
            "  saved: {} {} ({} at {})",
            profile.name.first, profile.name.last, profile.role, profile.company
        );
    }

    info!(round_trips = server.calls.load(Ordering::Relaxed), "demo finished");
    Ok(())
}
