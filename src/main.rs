//! Croupier - Roulette Table Simulator
//!
//! Drives the full table lifecycle end to end: mint and approve, open,
//! bet, spin through the VRF oracle, settle winners, advance. With an
//! archive directory the run writes through to RocksDB so a later run
//! (or `inspect_table`) can read the history back.

use clap::Parser;
use croupier::{
    number_color, AccountId, Amount, BetEntry, ConfigLoader, CroupierConfig, EngineEvent,
    EngineStore, HouseToken, RandomnessOracle, RouletteEngine, StakingAsset, VrfRandomizer,
    MAX_NUMBER,
};
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "croupier-sim", about = "Round-based roulette table simulator", version)]
struct Args {
    /// Path to a TOML config file
    #[arg(short, long)]
    config: Option<String>,

    /// Rounds to play (overrides config)
    #[arg(short, long)]
    rounds: Option<u64>,

    /// Simulated bettors (overrides config)
    #[arg(short, long)]
    bettors: Option<usize>,

    /// Seed for bettor behavior (overrides config)
    #[arg(short, long)]
    seed: Option<u64>,

    /// RocksDB archive directory; omit to run purely in memory
    #[arg(short, long)]
    archive_dir: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "croupier=info".into()),
        )
        .init();

    let args = Args::parse();

    let mut loader = ConfigLoader::new();
    if let Some(ref path) = args.config {
        loader = loader.with_path(path);
    }
    let mut config = loader.load()?;
    if let Some(rounds) = args.rounds {
        config.simulation.rounds = rounds;
    }
    if let Some(bettors) = args.bettors {
        config.simulation.bettors = bettors;
    }
    if let Some(seed) = args.seed {
        config.simulation.seed = seed;
    }
    config.validate()?;

    println!("🎰 Croupier Roulette Simulator");
    println!("==============================");
    println!(
        "📊 Config: {} rounds, {} bettors, max bet {}, seed {}",
        config.simulation.rounds,
        config.simulation.bettors,
        config.table.max_bet_per_number,
        config.simulation.seed,
    );

    run_simulation(config, args.archive_dir).await
}

async fn run_simulation(
    config: CroupierConfig,
    archive_dir: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let owner = AccountId::from_label("house-owner");
    let table = AccountId::from_label("roulette-table");

    let token = Arc::new(HouseToken::new());
    let oracle = Arc::new(VrfRandomizer::new_random(
        token.clone(),
        config.oracle.request_fee,
    ));

    let mut engine = match archive_dir {
        Some(ref dir) => {
            let store = EngineStore::open_tuned(
                dir,
                config.storage.write_buffer_size_mb,
                config.storage.max_write_buffer_number,
                config.storage.target_file_size_mb,
            )?;
            let engine =
                RouletteEngine::with_store(table, owner, token.clone(), oracle.clone(), store)?;
            println!(
                "💾 Archive at {} (resuming from round {})",
                dir,
                engine.current_round_id()
            );
            engine
        }
        None => RouletteEngine::new(table, owner, token.clone(), oracle.clone()),
    };

    engine.set_max_bet(owner, config.table.max_bet_per_number)?;

    // House float under engine custody, bankrolls for the bettors.
    token.mint(table, config.table.house_float)?;
    let bettors: Vec<AccountId> = (0..config.simulation.bettors)
        .map(|i| AccountId::from_label(&format!("bettor-{}", i)))
        .collect();
    for bettor in &bettors {
        token.mint(*bettor, config.simulation.bankroll)?;
        token.approve(*bettor, table, Amount::MAX);
    }

    // Gas funding for a metered oracle, pulled from the owner.
    if config.oracle.request_fee > 0 {
        token.mint(owner, config.oracle.gas_deposit)?;
        token.approve(owner, table, config.oracle.gas_deposit);
        engine.deposit_to_randomizer(owner, config.oracle.gas_deposit)?;
        println!(
            "⛽ Oracle funded: {} deposit, {} per request",
            config.oracle.gas_deposit, config.oracle.request_fee
        );
    }

    let mut event_rx = engine.subscribe();
    let tail = tokio::spawn(async move {
        while let Ok(event) = event_rx.recv().await {
            match event {
                EngineEvent::SpinResolved {
                    round,
                    winning_number,
                } => info!(round, winning_number, "spin resolved"),
                EngineEvent::WinningsCollected {
                    bettor,
                    round,
                    amount,
                } => info!(%bettor, round, amount, "winnings collected"),
                _ => {}
            }
        }
    });

    let mut rng = StdRng::seed_from_u64(config.simulation.seed);
    let entry_cap = (config.table.max_bet_per_number / 4).max(1);
    let mut nonce: u64 = 1;

    for _ in 0..config.simulation.rounds {
        let round_id = engine.open_round(owner)?;

        for bettor in &bettors {
            let entry_count = rng.gen_range(1..=config.simulation.max_entries_per_bet);
            let entries: Vec<BetEntry> = (0..entry_count)
                .map(|_| BetEntry {
                    number: rng.gen_range(0..=MAX_NUMBER),
                    amount: rng.gen_range(1..=entry_cap),
                })
                .collect();

            if let Err(err) = engine.place_bet(*bettor, &entries, "sim") {
                warn!(bettor = %bettor.short_hex(), round = round_id, %err, "bet rejected");
            }
        }

        let request_id = engine.request_spin(owner, nonce)?;
        let (entropy, proof) = oracle.fulfill(request_id)?;
        engine.deliver_random(oracle.account(), request_id, entropy)?;
        let winning = engine.set_spin_result(owner)?;

        let input = VrfRandomizer::expected_input(table, request_id, nonce);
        let fair = VrfRandomizer::verify(&proof, &input)?;
        println!(
            "🎲 Round {}: winning number {} ({}){}",
            round_id,
            winning,
            number_color(winning),
            if fair { "" } else { " ⚠ VRF proof rejected" },
        );

        for bettor in &bettors {
            match engine.collect_winnings(*bettor, round_id) {
                Ok(payout) => println!("   💰 {} collects {}", bettor.short_hex(), payout),
                Err(croupier::EngineError::NoWinnings) => {}
                Err(err) => warn!(bettor = %bettor.short_hex(), round = round_id, %err, "collect failed"),
            }
        }

        engine.next_round(owner)?;
        nonce += 1;
    }

    let snapshot = engine.metrics().snapshot();
    println!("\n🎯 SIMULATION RESULTS");
    println!("====================");
    println!("Rounds opened: {}", snapshot.rounds_opened);
    println!(
        "Bets placed: {} ({} staked)",
        snapshot.bets_placed, snapshot.stake_volume
    );
    println!(
        "Spins: {} requested, {} resolved",
        snapshot.spins_requested, snapshot.spins_resolved
    );
    println!(
        "Claims paid: {} ({} paid out)",
        snapshot.claims_paid, snapshot.payout_volume
    );
    println!("🏦 House margin: {}", snapshot.house_margin());
    println!("💰 Table balance: {}", engine.balance());
    for bettor in &bettors {
        println!(
            "   {} bankroll: {}",
            bettor.short_hex(),
            token.balance_of(*bettor)
        );
    }

    tail.abort();
    Ok(())
}
