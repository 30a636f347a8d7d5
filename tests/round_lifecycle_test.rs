//! End-to-end table flows through the public engine surface: betting,
//! VRF spins, settlement and the event stream.

use croupier::{
    derive_winning_number, AccountId, Amount, BetEntry, EngineError, EngineEvent, HouseToken,
    RandomnessOracle, RouletteEngine, RoundStatus, StakingAsset, VrfRandomizer, PAYOUT_MULTIPLIER,
    RED_NUMBERS,
};
use std::sync::Arc;

const HOUSE_FLOAT: Amount = 1_000_000;
const BANKROLL: Amount = 10_000;
const MAX_BET: Amount = 500;

struct Table {
    engine: RouletteEngine,
    token: Arc<HouseToken>,
    oracle: Arc<VrfRandomizer>,
    owner: AccountId,
    account: AccountId,
}

fn setup(bettors: &[AccountId]) -> Table {
    let owner = AccountId::from_label("owner");
    let account = AccountId::from_label("table");
    let token = Arc::new(HouseToken::new());
    let oracle = Arc::new(VrfRandomizer::from_seed([7u8; 32], token.clone(), 0));

    let mut engine = RouletteEngine::new(account, owner, token.clone(), oracle.clone());
    engine.set_max_bet(owner, MAX_BET).expect("set max bet");

    token.mint(account, HOUSE_FLOAT).expect("mint house float");
    for bettor in bettors {
        token.mint(*bettor, BANKROLL).expect("mint bankroll");
        token.approve(*bettor, account, Amount::MAX);
    }

    Table {
        engine,
        token,
        oracle,
        owner,
        account,
    }
}

/// Honest spin: request, fulfill through the VRF, deliver, resolve.
fn run_spin(table: &mut Table, nonce: u64) -> u8 {
    let request_id = table
        .engine
        .request_spin(table.owner, nonce)
        .expect("request spin");
    let (entropy, _proof) = table.oracle.fulfill(request_id).expect("fulfill");
    table
        .engine
        .deliver_random(table.oracle.account(), request_id, entropy)
        .expect("deliver");
    table.engine.set_spin_result(table.owner).expect("set result")
}

/// Rigged spin for deterministic outcomes: the callback carries entropy
/// whose fold lands on `number`.
fn spin_to(table: &mut Table, nonce: u64, number: u8) -> u8 {
    let request_id = table
        .engine
        .request_spin(table.owner, nonce)
        .expect("request spin");
    let mut entropy = [0u8; 32];
    entropy[31] = number;
    table
        .engine
        .deliver_random(table.oracle.account(), request_id, entropy)
        .expect("deliver");
    table.engine.set_spin_result(table.owner).expect("set result")
}

/// All asset in play: table custody, bettor bankrolls, oracle holdings.
fn circulating(table: &Table, bettors: &[AccountId]) -> Amount {
    table.engine.balance()
        + bettors
            .iter()
            .map(|b| table.token.balance_of(*b))
            .sum::<Amount>()
        + table.token.balance_of(table.oracle.account())
}

#[test]
fn test_full_session_over_three_rounds() {
    let alice = AccountId::from_label("alice");
    let bob = AccountId::from_label("bob");
    let bettors = [alice, bob];
    let mut table = setup(&bettors);
    let supply = circulating(&table, &bettors);

    for round in 0..3u64 {
        let nonce = round + 1;
        println!("\n=== PHASE {}: round {} ===", nonce, round);
        let round_id = table.engine.open_round(table.owner).expect("open");
        assert_eq!(round_id, round);

        table
            .engine
            .place_bet(
                alice,
                &[
                    BetEntry { number: 7, amount: 60 },
                    BetEntry { number: 23, amount: 40 },
                ],
                "session",
            )
            .expect("alice bets");
        table
            .engine
            .place_bet(bob, &[BetEntry { number: 7, amount: 100 }], "session")
            .expect("bob bets");
        assert_eq!(table.engine.total_stake_on(round_id, 7), 160);

        let winning = run_spin(&mut table, nonce);
        println!("🎲 Round {} landed on {}", round_id, winning);
        assert!(winning <= 36);
        assert_eq!(table.engine.winning_number(round_id), Some(winning));
        assert_eq!(
            table.engine.round_status(round_id),
            Some(RoundStatus::Closed)
        );

        for bettor in bettors {
            let stake = table.engine.stake_of(round_id, bettor, winning);
            match table.engine.collect_winnings(bettor, round_id) {
                Ok(payout) => {
                    assert_eq!(payout, stake * PAYOUT_MULTIPLIER);
                    println!("💰 Payout {} on stake {}", payout, stake);
                }
                Err(EngineError::NoWinnings) => assert_eq!(stake, 0),
                Err(other) => panic!("unexpected collect error: {}", other),
            }
        }

        // No asset minted or burned by play, only moved.
        assert_eq!(circulating(&table, &bettors), supply);

        table.engine.next_round(table.owner).expect("next round");
    }

    assert_eq!(table.engine.current_round_id(), 3);
    assert_eq!(
        table.engine.round_status(3),
        Some(RoundStatus::NotStarted)
    );
}

#[test]
fn test_full_red_cover_pays_one_winner() {
    let alice = AccountId::from_label("alice");
    let mut table = setup(&[alice]);

    table.engine.open_round(table.owner).expect("open");
    let entries: Vec<BetEntry> = RED_NUMBERS
        .iter()
        .map(|&number| BetEntry { number, amount: 10 })
        .collect();
    table
        .engine
        .place_bet(alice, &entries, "red-cover")
        .expect("cover the reds");
    assert_eq!(table.token.balance_of(alice), BANKROLL - 180);

    // 1 is red; exactly one of the 18 entries wins.
    let winning = spin_to(&mut table, 1, 1);
    assert_eq!(winning, 1);

    let payout = table.engine.collect_winnings(alice, 0).expect("collect");
    assert_eq!(payout, 360);
    assert_eq!(table.token.balance_of(alice), BANKROLL - 180 + 360);
    assert_eq!(table.engine.balance(), HOUSE_FLOAT + 180 - 360);
}

#[test]
fn test_claims_stay_independent_across_rounds() {
    let alice = AccountId::from_label("alice");
    let mut table = setup(&[alice]);

    // Round 0: alice wins on 5.
    table.engine.open_round(table.owner).expect("open 0");
    table
        .engine
        .place_bet(alice, &[BetEntry { number: 5, amount: 50 }], "r0")
        .expect("bet 0");
    spin_to(&mut table, 1, 5);
    table.engine.next_round(table.owner).expect("advance");

    // Round 1: alice wins on 12, and round 2 opens before any claim.
    table.engine.open_round(table.owner).expect("open 1");
    table
        .engine
        .place_bet(alice, &[BetEntry { number: 12, amount: 20 }], "r1")
        .expect("bet 1");
    spin_to(&mut table, 2, 12);
    table.engine.next_round(table.owner).expect("advance");
    table.engine.open_round(table.owner).expect("open 2");

    // Historical claims settle while round 2 is live.
    assert_eq!(table.engine.collect_winnings(alice, 0).expect("claim 0"), 1_800);
    assert_eq!(table.engine.collect_winnings(alice, 1).expect("claim 1"), 720);

    // Each round claims once.
    assert!(matches!(
        table.engine.collect_winnings(alice, 0),
        Err(EngineError::NoWinnings)
    ));
    assert!(matches!(
        table.engine.collect_winnings(alice, 1),
        Err(EngineError::NoWinnings)
    ));

    // Round 2 is still open, not claimable.
    assert!(matches!(
        table.engine.collect_winnings(alice, 2),
        Err(EngineError::RoundNotClosed(2))
    ));
}

#[test]
fn test_vrf_spin_is_provably_fair() {
    let alice = AccountId::from_label("alice");
    let mut table = setup(&[alice]);

    table.engine.open_round(table.owner).expect("open");
    table
        .engine
        .place_bet(alice, &[BetEntry { number: 0, amount: 10 }], "audit")
        .expect("bet");

    let nonce = 9;
    let request_id = table
        .engine
        .request_spin(table.owner, nonce)
        .expect("request spin");
    let (entropy, proof) = table.oracle.fulfill(request_id).expect("fulfill");
    table
        .engine
        .deliver_random(table.oracle.account(), request_id, entropy)
        .expect("deliver");
    let winning = table.engine.set_spin_result(table.owner).expect("resolve");

    // The published proof checks out against the request the engine made.
    let input = VrfRandomizer::expected_input(table.account, request_id, nonce);
    assert!(VrfRandomizer::verify(&proof, &input).expect("verify"));

    // And anyone can re-derive the wheel number from the entropy.
    assert_eq!(derive_winning_number(&entropy), winning);

    // A proof bound to a different request does not.
    let wrong_input = VrfRandomizer::expected_input(table.account, request_id + 1, nonce);
    assert!(!VrfRandomizer::verify(&proof, &wrong_input).expect("verify"));
}

#[test]
fn test_round_with_no_winners_keeps_stakes() {
    let alice = AccountId::from_label("alice");
    let bob = AccountId::from_label("bob");
    let mut table = setup(&[alice, bob]);

    table.engine.open_round(table.owner).expect("open");
    table
        .engine
        .place_bet(alice, &[BetEntry { number: 10, amount: 100 }], "lose")
        .expect("alice bets");
    table
        .engine
        .place_bet(bob, &[BetEntry { number: 20, amount: 200 }], "lose")
        .expect("bob bets");

    spin_to(&mut table, 1, 30);

    for bettor in [alice, bob] {
        assert!(matches!(
            table.engine.collect_winnings(bettor, 0),
            Err(EngineError::NoWinnings)
        ));
    }
    assert_eq!(table.engine.balance(), HOUSE_FLOAT + 300);
    assert_eq!(table.token.balance_of(alice), BANKROLL - 100);
    assert_eq!(table.token.balance_of(bob), BANKROLL - 200);
}

#[test]
fn test_event_stream_narrates_a_round() {
    let alice = AccountId::from_label("alice");
    let mut table = setup(&[alice]);
    let mut rx = table.engine.subscribe();

    table.engine.open_round(table.owner).expect("open");
    table
        .engine
        .place_bet(alice, &[BetEntry { number: 4, amount: 25 }], "narrated")
        .expect("bet");
    spin_to(&mut table, 1, 4);
    table.engine.collect_winnings(alice, 0).expect("collect");

    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }

    let position = |pred: &dyn Fn(&EngineEvent) -> bool| {
        events.iter().position(|e| pred(e)).expect("event present")
    };
    let opened = position(&|e| matches!(e, EngineEvent::RoundOpened { round: 0 }));
    let bet = position(&|e| {
        matches!(e, EngineEvent::BetPlaced { round: 0, number: 4, amount: 25, .. })
    });
    let requested = position(&|e| matches!(e, EngineEvent::SpinRequested { round: 0, .. }));
    let resolved = position(&|e| {
        matches!(e, EngineEvent::SpinResolved { round: 0, winning_number: 4 })
    });
    let collected = position(&|e| {
        matches!(e, EngineEvent::WinningsCollected { round: 0, amount: 900, .. })
    });

    assert!(opened < bet);
    assert!(bet < requested);
    assert!(requested < resolved);
    assert!(resolved < collected);
}
