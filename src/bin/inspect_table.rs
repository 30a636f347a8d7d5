//! Dump a persisted table archive: rounds, stake cells and paid claims.

use croupier::{number_color, EngineStore};
use std::collections::BTreeMap;
use std::path::Path;

fn main() {
    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "./croupier_data".to_string());

    if !Path::new(&path).exists() {
        println!("❌ No table archive found at {}", path);
        return;
    }

    let store = EngineStore::open(&path).expect("Failed to open archive");
    let state = store.load_state().expect("Failed to read archive");

    println!("🔍 Table Archive Inspector");
    println!("==========================");
    println!(
        "Rounds: {}   Stake cells: {}   Claims: {}\n",
        state.rounds.len(),
        state.stakes.len(),
        state.claims.len()
    );

    let mut stakes_by_round: BTreeMap<u64, Vec<_>> = BTreeMap::new();
    for stake in &state.stakes {
        stakes_by_round.entry(stake.round_id).or_default().push(stake);
    }
    let mut claims_by_round: BTreeMap<u64, Vec<_>> = BTreeMap::new();
    for claim in &state.claims {
        claims_by_round.entry(claim.round_id).or_default().push(claim);
    }

    for record in &state.rounds {
        println!("🎡 Round #{} [{}]", record.id, record.status);
        if let Some(number) = record.winning_number {
            println!("   Winning number: {} ({})", number, number_color(number));
        }
        if let Some(request_id) = record.random_request_id {
            println!("   Randomness request: {}", request_id);
        }

        if let Some(stakes) = stakes_by_round.get(&record.id) {
            let round_total: u64 = stakes.iter().map(|s| s.cumulative).sum();
            println!("   Stakes ({} total):", round_total);
            for stake in stakes {
                println!(
                    "      {} on {:>2}: {}",
                    stake.bettor.short_hex(),
                    stake.number,
                    stake.cumulative
                );
            }
        }

        if let Some(claims) = claims_by_round.get(&record.id) {
            for claim in claims {
                println!(
                    "   💰 Claimed by {}: {}",
                    claim.bettor.short_hex(),
                    claim.amount
                );
            }
        }
        println!();
    }

    let total_staked: u64 = state.stakes.iter().map(|s| s.cumulative).sum();
    let total_paid: u64 = state.claims.iter().map(|c| c.amount).sum();
    println!("📊 Totals: {} staked, {} paid out", total_staked, total_paid);
}
