mod common;

use std::time::Duration;

use common::{
    harness, harness_with_config, one_ether, test_config, tok_a, tok_b, usdt_bsc, wbnb,
    ProbeScript,
};
use ethers::types::U256;
use routescout::errors::RegistryError;
use routescout::types::{RouterParams, StepKind};
use tokio::time::timeout;

fn params() -> RouterParams {
    RouterParams::new(56, tok_a(), one_ether(), 56, tok_b())
}

#[tokio::test]
async fn double_fan_out_finds_the_best_chain() {
    let h = harness();
    // WBNB chain compounds to 6x, USDT chain to 2x.
    h.probe.script(56, &[tok_a(), wbnb()], ProbeScript::Rate { num: 2, den: 1 });
    h.probe.script(56, &[wbnb(), tok_b()], ProbeScript::Rate { num: 3, den: 1 });
    h.probe.script(56, &[tok_a(), usdt_bsc()], ProbeScript::Rate { num: 1, den: 1 });
    h.probe.script(56, &[usdt_bsc(), tok_b()], ProbeScript::Rate { num: 2, den: 1 });

    let bundle = h
        .multihop
        .find(&params())
        .await
        .unwrap()
        .expect("two-leg bundle");

    assert_eq!(bundle.legs.len(), 2);
    assert_eq!(bundle.legs[0].to_token.address, wbnb());
    assert_eq!(bundle.combined.output_units(), one_ether() * 6);
    assert_eq!(bundle.combined.steps.len(), 2);
    assert!(bundle.combined.steps.iter().all(|s| s.kind == StepKind::Swap));
    assert_eq!(bundle.combined.from_token.address, tok_a());
    assert_eq!(bundle.combined.to_token.address, tok_b());
}

#[tokio::test]
async fn combined_route_sums_legs() {
    let h = harness();
    h.probe.script(56, &[tok_a(), wbnb()], ProbeScript::Rate { num: 2, den: 1 });
    h.probe.script(56, &[wbnb(), tok_b()], ProbeScript::Rate { num: 2, den: 1 });

    let bundle = h.multihop.find(&params()).await.unwrap().unwrap();
    let leg_time: u64 = bundle.legs.iter().map(|l| l.estimated_time_secs).sum();
    assert_eq!(bundle.combined.estimated_time_secs, leg_time);
    let min_expiry = bundle.legs.iter().map(|l| l.expires_at).min().unwrap();
    assert_eq!(bundle.combined.expires_at, min_expiry);
    assert_eq!(
        bundle.combined.venue,
        format!("{}+{}", bundle.legs[0].venue, bundle.legs[1].venue)
    );
}

#[tokio::test]
async fn failing_branches_do_not_poison_the_rest() {
    let h = harness();
    // The WBNB first leg dies on transport; the USDT chain still completes.
    h.probe.script(56, &[tok_a(), wbnb()], ProbeScript::Transport);
    h.probe.script(56, &[tok_a(), usdt_bsc()], ProbeScript::Rate { num: 1, den: 1 });
    h.probe.script(56, &[usdt_bsc(), tok_b()], ProbeScript::Rate { num: 2, den: 1 });

    let bundle = h.multihop.find(&params()).await.unwrap().expect("usdt chain");
    assert_eq!(bundle.legs[0].to_token.address, usdt_bsc());
    assert_eq!(bundle.combined.output_units(), one_ether() * 2);
}

#[tokio::test]
async fn dead_first_legs_mean_no_bundle() {
    let h = harness();
    let bundle = h.multihop.find(&params()).await.unwrap();
    assert!(bundle.is_none());
}

#[tokio::test]
async fn dead_second_legs_mean_no_bundle() {
    let h = harness();
    h.probe.script(56, &[tok_a(), wbnb()], ProbeScript::Rate { num: 2, den: 1 });

    let bundle = h.multihop.find(&params()).await.unwrap();
    assert!(bundle.is_none());
}

#[tokio::test]
async fn endpoints_are_excluded_from_intermediaries() {
    let h = harness();
    // Routing USDT -> B: USDT cannot also be the intermediary, so only the
    // WBNB chain is explored.
    h.probe.script(56, &[usdt_bsc(), wbnb()], ProbeScript::Rate { num: 2, den: 1 });
    h.probe.script(56, &[wbnb(), tok_b()], ProbeScript::Rate { num: 2, den: 1 });

    let request = RouterParams::new(56, usdt_bsc(), one_ether(), 56, tok_b());
    let bundle = h.multihop.find(&request).await.unwrap().expect("wbnb chain");
    assert_eq!(bundle.legs[0].to_token.address, wbnb());
    assert!(h
        .probe
        .calls()
        .iter()
        .all(|(_, path, _)| path != &vec![usdt_bsc(), usdt_bsc()]));
}

#[tokio::test]
async fn slow_probes_do_not_stall_a_wide_fan_out() {
    // More branches than probe permits, with every probe pending on a timer.
    let mut config = test_config();
    config.verifier.max_concurrency = 1;
    let h = harness_with_config(config);
    for path in [
        [tok_a(), wbnb()],
        [wbnb(), tok_b()],
        [tok_a(), usdt_bsc()],
        [usdt_bsc(), tok_b()],
    ] {
        h.probe
            .script(56, &path, ProbeScript::Slow { delay_ms: 20, num: 2, den: 1 });
    }

    let bundle = timeout(Duration::from_secs(5), h.multihop.find(&params()))
        .await
        .expect("fan-out wider than the probe bound must still finish")
        .unwrap()
        .expect("every pair has liquidity");
    assert_eq!(bundle.combined.output_units(), one_ether() * 4);
}

#[tokio::test]
async fn combining_no_legs_is_an_error() {
    let h = harness();
    let result = h.normalizer.combine_legs(&[]).await;
    assert!(matches!(result, Err(RegistryError::EmptyRoute)));
}

#[tokio::test]
async fn intermediary_amounts_feed_the_second_leg() {
    let h = harness();
    h.probe.script(56, &[tok_a(), wbnb()], ProbeScript::Rate { num: 3, den: 1 });
    h.probe.script(56, &[wbnb(), tok_b()], ProbeScript::Rate { num: 2, den: 1 });

    let bundle = h.multihop.find(&params()).await.unwrap().unwrap();
    // The second leg was asked for exactly the first leg's output.
    let second_leg_inputs: Vec<U256> = h
        .probe
        .calls()
        .iter()
        .filter(|(_, path, _)| path == &vec![wbnb(), tok_b()])
        .map(|(_, _, amount)| *amount)
        .collect();
    assert!(second_leg_inputs.contains(&(one_ether() * 3)));
    assert_eq!(bundle.combined.output_units(), one_ether() * 6);
}
