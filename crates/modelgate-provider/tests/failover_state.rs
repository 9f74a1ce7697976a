//! Circuit and selector working together across a failure/recovery cycle.

use std::collections::HashSet;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::SeedableRng;

use modelgate_provider::circuit::FAILURE_THRESHOLD;
use modelgate_provider::{
    pick, Admission, CircuitBreakerRegistry, CircuitState, Provider, RateLimitGuard,
    SelectionInput, StickySessions, UsageLedger,
};

fn provider(id: i64) -> Provider {
    serde_json::from_value(serde_json::json!({
        "id": id,
        "name": format!("p{id}"),
        "base_url": "https://upstream.example",
        "api_key": "k",
        "kind": "openai-compatible",
        "weight": 10
    }))
    .unwrap()
}

#[test]
fn failed_provider_rotates_out_and_recovers_through_a_probe() {
    let circuit = CircuitBreakerRegistry::new();
    let limits = RateLimitGuard::new(Arc::new(UsageLedger::new()));
    let sticky = StickySessions::new(3600);
    let providers = vec![provider(1), provider(2)];
    let exclude = HashSet::new();

    let t0 = 10_000;
    for _ in 0..FAILURE_THRESHOLD {
        circuit.record_failure(1, t0);
    }
    assert_eq!(circuit.state(1, t0), CircuitState::Open);

    // While open, only the healthy provider is selectable.
    for seed in 0..8 {
        let mut rng = StdRng::seed_from_u64(seed);
        let picked = pick(
            &providers,
            &circuit,
            &limits,
            &sticky,
            &SelectionInput {
                model: "gpt-4o",
                session_id: None,
                exclude: &exclude,
                now_unix: t0 + 10,
            },
            &mut rng,
        )
        .unwrap();
        assert_eq!(picked.id, 2);
    }

    // After the backoff deadline the circuit is half-open: selectable
    // again, and the registry admits exactly one probe.
    let t1 = t0 + 60;
    assert_eq!(circuit.state(1, t1), CircuitState::HalfOpen);
    let Admission::Probe(guard) = circuit.admit(1, t1) else {
        panic!("expected a probe slot");
    };
    assert!(matches!(circuit.admit(1, t1), Admission::Denied { .. }));

    circuit.record_success(1);
    drop(guard);
    assert_eq!(circuit.state(1, t1), CircuitState::Closed);

    let mut rng = StdRng::seed_from_u64(3);
    let mut seen = HashSet::new();
    for _ in 0..64 {
        let picked = pick(
            &providers,
            &circuit,
            &limits,
            &sticky,
            &SelectionInput {
                model: "gpt-4o",
                session_id: None,
                exclude: &exclude,
                now_unix: t1 + 1,
            },
            &mut rng,
        )
        .unwrap();
        seen.insert(picked.id);
    }
    assert_eq!(seen, [1, 2].into_iter().collect());
}
