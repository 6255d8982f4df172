use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;
use std::time::Instant;

use crate::store::{RedirectStore, StoreError};

// ─── Fixed entries ───────────────────────────────────────────────

static KNOWN: &[(&str, &str)] = &[
    ("gh", "github.com"),
    ("docs", "docs.rs"),
    ("crates", "crates.io"),
    ("book", "doc.rust-lang.org/book/"),
    ("play", "play.rust-lang.org"),
];

/// Generated entries on top of the fixed ones.
const NUM_GENERATED: usize = 20;

// ─── Word pools ──────────────────────────────────────────────────

static TOPIC: &[&str] = &[
    "launch", "promo", "release", "survey", "webinar", "careers", "status", "pricing",
];

static HOST: &[&str] = &[
    "example.com",
    "example.org",
    "blog.example.net",
    "shop.example.com",
];

// ─── Public entry point ──────────────────────────────────────────

/// Writes demo redirects; paths that already exist are left alone.
/// Returns how many were created.
pub async fn seed(store: &dyn RedirectStore) -> Result<usize, StoreError> {
    let start = Instant::now();
    // Deterministic RNG so re-runs produce the same data.
    let mut rng = StdRng::seed_from_u64(42);

    let mut entries: Vec<(String, String)> = KNOWN
        .iter()
        .map(|(p, u)| (p.to_string(), u.to_string()))
        .collect();
    for i in 0..NUM_GENERATED {
        let topic = TOPIC[rng.gen_range(0..TOPIC.len())];
        let host = HOST[rng.gen_range(0..HOST.len())];
        let campaign = rng.gen_range(100..1000u32);
        entries.push((
            format!("{topic}-{}", i + 1),
            format!("{host}/{topic}?campaign={campaign}"),
        ));
    }

    let mut created = 0;
    for (path, url) in &entries {
        match store.create(path, url).await {
            Ok(_) => created += 1,
            Err(StoreError::Duplicate(_)) => {}
            Err(e) => return Err(e),
        }
    }

    tracing::info!(
        created,
        skipped = entries.len() - created,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "demo redirects seeded"
    );
    Ok(created)
}
