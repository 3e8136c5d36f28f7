//! Project explorer ordering: seeded shuffle and post-shuffle filters.
//!
//! The explorer randomizes project order per request while staying
//! reproducible for a given seed, so pagination and shared links see the
//! same order within a session. The generator is the narrow-period
//! recurrence the platform has always shipped; swapping in a better-mixed
//! PRNG would silently reorder every existing explorer link, so it is kept
//! verbatim.

use crate::models::{IndustryTag, VerifiedProject};

/// One step of the `(11 * seed + 17) mod 25` recurrence, scaled into `[0, 1)`.
fn seeded_random(seed: u64) -> f64 {
    const M: u64 = 25;
    const A: u64 = 11;
    const C: u64 = 17;

    // Reducing the seed first keeps the multiply in range for any u64;
    // the result is congruent to (A * seed + C) mod M.
    ((A * (seed % M) + C) % M) as f64 / M as f64
}

/// Deterministic Fisher-Yates shuffle.
///
/// Returns a new vector with the same items; the input is left untouched.
/// The same `(items, seed)` pair always yields the same order. The
/// generator is re-invoked with the original seed at every step, so one
/// seed contributes a single swap ratio across the whole pass.
pub fn shuffle<T: Clone>(items: &[T], seed: u64) -> Vec<T> {
    let mut shuffled = items.to_vec();

    for i in (1..shuffled.len()).rev() {
        let r = (seeded_random(seed) * (i as f64 + 1.0)).floor() as usize;
        shuffled.swap(i, r);
    }

    shuffled
}

/// Shuffle the candidate set and apply the explorer filters.
///
/// A missing seed behaves exactly like seed 0.
pub fn order_and_filter(
    items: Vec<VerifiedProject>,
    seed: Option<u64>,
    filter: Option<&str>,
    rounds: Option<&[String]>,
) -> Vec<VerifiedProject> {
    let shuffled = shuffle(&items, seed.unwrap_or(0));
    apply_filters(shuffled, filter, rounds)
}

/// Post-shuffle selection.
///
/// Archived projects are always dropped first. A combined industry + round
/// query takes precedence over either filter alone; an industry filter with
/// a round set that is present but empty falls back to a raw substring
/// match on the stored tag text; a round set alone selects by membership;
/// with neither present the list passes through. Selection is stable:
/// surviving items keep their shuffled rank order.
pub fn apply_filters(
    shuffled: Vec<VerifiedProject>,
    filter: Option<&str>,
    rounds: Option<&[String]>,
) -> Vec<VerifiedProject> {
    let visible: Vec<VerifiedProject> = shuffled
        .into_iter()
        .filter(|e| !e.project.is_archive)
        .collect();

    match (filter, rounds) {
        (Some(f), Some(r)) if !r.is_empty() => visible
            .into_iter()
            .filter(|e| {
                industry_tags(&e.project.industry)
                    .iter()
                    .any(|tag| tag.value == f)
                    && r.contains(&e.funding_round.id)
            })
            .collect(),
        (Some(f), Some(_)) => visible
            .into_iter()
            .filter(|e| e.project.industry.contains(f))
            .collect(),
        (None, Some(r)) if !r.is_empty() => visible
            .into_iter()
            .filter(|e| r.contains(&e.funding_round.id))
            .collect(),
        _ => visible,
    }
}

/// Decode the industry JSON text. Malformed text counts as "no tags" so a
/// single bad row cannot fail a whole explorer request.
fn industry_tags(raw: &str) -> Vec<IndustryTag> {
    serde_json::from_str(raw).unwrap_or_default()
}

// ─────────────────────────────────────────────────────────
// Unit tests
// ─────────────────────────────────────────────────────────
