//! The provider selector: route-family filter, eligibility filter, sticky
//! short-circuit, best priority band, weighted draw.

use std::collections::HashSet;

use rand::Rng;

use crate::circuit::{CircuitBreakerRegistry, CircuitState};
use crate::limits::RateLimitGuard;
use crate::provider::{route_family, Provider, ProviderId};
use crate::sticky::StickySessions;

#[derive(Debug, Clone)]
pub struct SelectionInput<'a> {
    pub model: &'a str,
    pub session_id: Option<&'a str>,
    pub exclude: &'a HashSet<ProviderId>,
    pub now_unix: i64,
}

/// Pick a provider for the request, or `None` when nothing is eligible.
///
/// Deterministic given a fixed RNG seed, the candidate set, and weights.
/// Never returns an excluded, disabled, tombstoned, open-circuit, or
/// over-limit provider.
pub fn pick<'a, R: Rng>(
    providers: &'a [Provider],
    circuit: &CircuitBreakerRegistry,
    limits: &RateLimitGuard,
    sticky: &StickySessions,
    input: &SelectionInput<'_>,
    rng: &mut R,
) -> Option<&'a Provider> {
    let family = route_family(input.model);
    let eligible: Vec<&Provider> = providers
        .iter()
        .filter(|provider| family.contains(&provider.kind))
        .filter(|provider| provider.enabled && !provider.is_tombstoned())
        .filter(|provider| !input.exclude.contains(&provider.id))
        .filter(|provider| {
            circuit.state(provider.id, input.now_unix) != CircuitState::Open
        })
        .filter(|provider| limits.check(provider, input.now_unix).is_ok())
        .collect();

    if eligible.is_empty() {
        return None;
    }

    if let Some(session_id) = input.session_id
        && let Some(bound) = sticky.get(session_id, input.now_unix)
        && let Some(provider) = eligible.iter().find(|provider| provider.id == bound)
    {
        return Some(provider);
    }

    let best_priority = eligible
        .iter()
        .map(|provider| provider.priority)
        .min()
        .expect("nonempty eligible set");
    let band: Vec<&Provider> = eligible
        .into_iter()
        .filter(|provider| provider.priority == best_priority)
        .collect();

    let weights: Vec<u32> = band.iter().map(|provider| provider.weight).collect();
    let index = pick_weighted_index(&weights, rng);
    Some(band[index])
}

/// Weighted draw. Zero-weight entries never win unless every entry is
/// zero-weight, in which case the draw is uniform.
fn pick_weighted_index<R: Rng>(weights: &[u32], rng: &mut R) -> usize {
    if weights.is_empty() {
        return 0;
    }

    let total: u64 = weights.iter().map(|weight| *weight as u64).sum();
    if total == 0 {
        return rng.random_range(0..weights.len());
    }

    let mut roll = rng.random_range(0..total);
    for (index, weight) in weights.iter().enumerate() {
        let weight = *weight as u64;
        if roll < weight {
            return index;
        }
        roll -= weight;
    }

    weights.len() - 1
}
