mod common;

use common::{busd, harness, harness_with_config, one_ether, test_config, tok_a, tok_b, usdt_bsc, wbnb, ProbeScript};
use ethers::types::U256;
use routescout::errors::RouteError;

#[tokio::test]
async fn direct_pair_wins_without_scanning_intermediaries() {
    let h = harness();
    let direct = [tok_a(), tok_b()];
    h.probe.script(56, &direct, ProbeScript::Rate { num: 2, den: 1 });

    let route = h
        .samechain
        .find(tok_a(), tok_b(), 56, one_ether())
        .await
        .unwrap()
        .expect("direct route");

    assert_eq!(route.hops, 1);
    assert_eq!(route.dex_id, "pancakeswap");
    assert_eq!(route.output_amount, one_ether() * 2);
    // No 2-hop candidate was ever probed.
    assert!(h.probe.calls().iter().all(|(_, path, _)| path.len() == 2));
}

#[tokio::test]
async fn lower_priority_venue_serves_when_it_is_the_only_one() {
    let mut config = test_config();
    config
        .chains
        .get_mut("bsc")
        .unwrap()
        .dexs
        .retain(|d| d.id == "biswap");
    let h = harness_with_config(config);
    h.probe
        .script(56, &[tok_a(), tok_b()], ProbeScript::Rate { num: 2, den: 1 });

    let route = h
        .samechain
        .find(tok_a(), tok_b(), 56, one_ether())
        .await
        .unwrap()
        .expect("biswap route");
    assert_eq!(route.dex_id, "biswap");
}

#[tokio::test]
async fn intermediary_scan_selects_best_two_hop() {
    let h = harness();
    // Direct pair has no liquidity (unscripted). Two intermediaries quote;
    // USDT compounds to 9x, WBNB to 4x.
    h.probe.script(
        56,
        &[tok_a(), usdt_bsc(), tok_b()],
        ProbeScript::Rate { num: 3, den: 1 },
    );
    h.probe.script(
        56,
        &[tok_a(), wbnb(), tok_b()],
        ProbeScript::Rate { num: 2, den: 1 },
    );

    let route = h
        .samechain
        .find(tok_a(), tok_b(), 56, one_ether())
        .await
        .unwrap()
        .expect("two-hop route");

    assert_eq!(route.hops, 2);
    assert_eq!(route.path.as_slice(), &[tok_a(), usdt_bsc(), tok_b()]);
    assert_eq!(route.output_amount, one_ether() * 9);
    assert_eq!(route.pairs, vec![(tok_a(), usdt_bsc()), (usdt_bsc(), tok_b())]);
}

#[tokio::test]
async fn wrapped_native_fallback_fires_last() {
    // Keep the wrapped native out of the scan list so only the fallback can
    // route through it.
    let mut config = test_config();
    config.chains.get_mut("bsc").unwrap().intermediaries = vec![usdt_bsc(), busd()];
    let h = harness_with_config(config);
    h.probe.script(
        56,
        &[tok_a(), wbnb(), tok_b()],
        ProbeScript::Rate { num: 2, den: 1 },
    );

    let route = h
        .samechain
        .find(tok_a(), tok_b(), 56, one_ether())
        .await
        .unwrap()
        .expect("fallback route");
    assert_eq!(route.path.as_slice(), &[tok_a(), wbnb(), tok_b()]);
    assert_eq!(route.output_amount, one_ether() * 4);
}

#[tokio::test]
async fn fallback_refuses_wrapped_native_endpoints() {
    let mut config = test_config();
    config.chains.get_mut("bsc").unwrap().intermediaries = vec![usdt_bsc()];
    let h = harness_with_config(config);

    // Nothing is scripted: direct and intermediary tiers fail, and the
    // fallback must not synthesize WBNB -> WBNB -> B.
    let route = h
        .samechain
        .find(wbnb(), tok_b(), 56, one_ether())
        .await
        .unwrap();
    assert!(route.is_none());
    assert!(h
        .probe
        .calls()
        .iter()
        .all(|(_, path, _)| !path.windows(2).any(|w| w[0] == w[1])));
}

#[tokio::test]
async fn exhausted_strategies_yield_none_not_error() {
    let h = harness();
    let route = h
        .samechain
        .find(tok_a(), tok_b(), 56, one_ether())
        .await
        .unwrap();
    assert!(route.is_none());
}

#[tokio::test]
async fn identical_tokens_are_rejected() {
    let h = harness();
    let result = h.samechain.find(tok_a(), tok_a(), 56, one_ether()).await;
    assert!(matches!(result, Err(RouteError::InvalidRequest(_))));
}

#[tokio::test]
async fn zero_amount_is_rejected() {
    let h = harness();
    let result = h.samechain.find(tok_a(), tok_b(), 56, U256::zero()).await;
    assert!(matches!(result, Err(RouteError::InvalidRequest(_))));
}
