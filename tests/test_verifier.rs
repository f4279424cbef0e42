mod common;

use common::{harness, one_ether, tok_a, tok_b, usdt_bsc, ProbeScript};
use ethers::types::U256;
use routescout::errors::VerifierError;
use routescout::verifier::VerifyCandidate;
use smallvec::SmallVec;

#[tokio::test]
async fn full_amount_probe_verifies_directly() {
    let h = harness();
    let path = [tok_a(), tok_b()];
    h.probe.script(56, &path, ProbeScript::Rate { num: 2, den: 1 });

    let route = h
        .verifier
        .verify(&path, 56, "pancakeswap", one_ether())
        .await
        .unwrap()
        .expect("route should verify");

    assert_eq!(route.amounts, vec![one_ether(), one_ether() * 2]);
    assert_eq!(route.output_amount, one_ether() * 2);
    assert_eq!(route.dex_id, "pancakeswap");
    assert_eq!(h.probe.call_count(56, &path), 1);
}

#[tokio::test]
async fn cache_suppresses_repeat_probes() {
    let h = harness();
    let path = [tok_a(), tok_b()];
    h.probe.script(56, &path, ProbeScript::Rate { num: 2, den: 1 });

    let first = h
        .verifier
        .verify(&path, 56, "pancakeswap", one_ether())
        .await
        .unwrap();
    let second = h
        .verifier
        .verify(&path, 56, "pancakeswap", one_ether())
        .await
        .unwrap();

    assert_eq!(first, second);
    assert_eq!(h.probe.call_count(56, &path), 1);
}

#[tokio::test]
async fn negative_results_are_cached_too() {
    let h = harness();
    let path = [tok_a(), tok_b()];
    // Unscripted path reverts on liquidity at every amount, including the
    // whole ladder.
    let first = h
        .verifier
        .verify(&path, 56, "pancakeswap", one_ether())
        .await
        .unwrap();
    assert!(first.is_none());
    let calls_after_first = h.probe.call_count(56, &path);

    let second = h
        .verifier
        .verify(&path, 56, "pancakeswap", one_ether())
        .await
        .unwrap();
    assert!(second.is_none());
    assert_eq!(h.probe.call_count(56, &path), calls_after_first);
}

#[tokio::test]
async fn zero_amount_is_no_route_without_probing() {
    let h = harness();
    let path = [tok_a(), tok_b()];
    let result = h
        .verifier
        .verify(&path, 56, "pancakeswap", U256::zero())
        .await
        .unwrap();
    assert!(result.is_none());
    assert!(h.probe.calls().is_empty());
}

#[tokio::test]
async fn malformed_paths_are_rejected() {
    let h = harness();
    let short = h.verifier.verify(&[tok_a()], 56, "pancakeswap", one_ether()).await;
    assert!(matches!(short, Err(VerifierError::InvalidPath(_))));

    let dup = h
        .verifier
        .verify(&[tok_a(), tok_a(), tok_b()], 56, "pancakeswap", one_ether())
        .await;
    assert!(matches!(dup, Err(VerifierError::InvalidPath(_))));
    assert!(h.probe.calls().is_empty());
}

#[tokio::test]
async fn unknown_venue_is_an_error() {
    let h = harness();
    let result = h
        .verifier
        .verify(&[tok_a(), tok_b()], 56, "no-such-dex", one_ether())
        .await;
    assert!(matches!(result, Err(VerifierError::UnknownVenue { .. })));
}

#[tokio::test]
async fn transport_failure_on_full_amount_propagates() {
    let h = harness();
    let path = [tok_a(), tok_b()];
    h.probe.script(56, &path, ProbeScript::Transport);

    let result = h.verifier.verify(&path, 56, "pancakeswap", one_ether()).await;
    assert!(matches!(result, Err(VerifierError::Provider { chain_id: 56, .. })));
}

#[tokio::test]
async fn ladder_scales_the_one_percent_probe() {
    let h = harness();
    let path = [tok_a(), tok_b()];
    // The pool serves at most 2% of the request: the 50% and 10% rungs
    // revert, the 1% rung (1e16) succeeds at a 2x rate.
    h.probe.script(
        56,
        &path,
        ProbeScript::Capped {
            max_in: one_ether() / 50,
            num: 2,
            den: 1,
        },
    );

    let route = h
        .verifier
        .verify(&path, 56, "pancakeswap", one_ether())
        .await
        .unwrap()
        .expect("ladder should recover a route");

    // ratio = 1e18 / 1e16 = 100, the 90% discount tier:
    // 2e16 * 100 * 0.9 = 1.8e18.
    let expected = one_ether() * 18 / 10;
    assert_eq!(route.amounts[0], one_ether());
    assert_eq!(route.output_amount, expected);
}

#[tokio::test]
async fn verify_many_returns_the_strict_maximum() {
    let h = harness();
    let direct = [tok_a(), tok_b()];
    let via_usdt = [tok_a(), usdt_bsc(), tok_b()];
    h.probe.script(56, &direct, ProbeScript::Rate { num: 2, den: 1 });
    h.probe.script(56, &via_usdt, ProbeScript::Rate { num: 2, den: 1 });

    let candidates = vec![
        VerifyCandidate {
            path: SmallVec::from_slice(&direct),
            chain_id: 56,
            dex_id: "pancakeswap".into(),
            amount_in: one_ether(),
        },
        VerifyCandidate {
            path: SmallVec::from_slice(&via_usdt),
            chain_id: 56,
            dex_id: "pancakeswap".into(),
            amount_in: one_ether(),
        },
    ];
    let best = h
        .verifier
        .verify_many(&candidates)
        .await
        .unwrap()
        .expect("one candidate must win");

    // The two-hop path doubles twice.
    assert_eq!(best.output_amount, one_ether() * 4);
    assert_eq!(best.path.as_slice(), &via_usdt);
}

#[tokio::test]
async fn verify_many_isolates_failing_candidates() {
    let h = harness();
    let broken = [tok_a(), usdt_bsc(), tok_b()];
    let healthy = [tok_a(), tok_b()];
    h.probe.script(56, &broken, ProbeScript::Transport);
    h.probe.script(56, &healthy, ProbeScript::Rate { num: 3, den: 1 });

    let candidates = vec![
        VerifyCandidate {
            path: SmallVec::from_slice(&broken),
            chain_id: 56,
            dex_id: "pancakeswap".into(),
            amount_in: one_ether(),
        },
        VerifyCandidate {
            path: SmallVec::from_slice(&healthy),
            chain_id: 56,
            dex_id: "pancakeswap".into(),
            amount_in: one_ether(),
        },
    ];
    let best = h.verifier.verify_many(&candidates).await.unwrap();
    assert_eq!(best.unwrap().output_amount, one_ether() * 3);
}

#[tokio::test]
async fn verify_many_of_nothing_is_none() {
    let h = harness();
    assert!(h.verifier.verify_many(&[]).await.unwrap().is_none());
}
