mod config;
mod output;
mod parse;
mod prompt;
mod simulate;
mod store;
mod sync;

use chrono::{Duration, Utc};
use clap::Parser;
use log::{debug, warn};
use namerank_core::{
    apply_manual_order, sorted_final_ratings, CandidateItem, FinalRating, IgnoreReason,
    RatingMap, SessionConfig, SessionPhase, SessionStore, UndoResult, VoteResult, VotingSession,
};
use reqwest::Client;
use std::cell::RefCell;
use std::collections::HashMap;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use crate::config::NamerankConfig;
use crate::parse::Command;
use crate::store::JsonFileStore;
use crate::sync::{Delivery, RatingsPayload, SyncConfig};

pub fn bail(msg: impl std::fmt::Display) -> ! {
    eprintln!("Error: {msg}");
    std::process::exit(1);
}

#[derive(Parser)]
#[command(name = "namerank", version, about = "Rank names by voting on pairs")]
struct Cli {
    /// Debug logging (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Vote on every pair of names; progress is saved after each vote
    Vote(VoteArgs),
    /// Forget saved progress for a user and list of names
    Reset(ResetArgs),
    /// Pull ratings toward a manual order
    Blend(BlendArgs),
    /// Measure ranking quality against a synthetic voter
    Simulate(SimulateArgs),
    /// Re-send ratings that could not be delivered earlier
    Flush(FlushArgs),
    /// Create a default config file at ~/.config/namerank/config.toml
    Init,
}

#[derive(clap::Args)]
struct ItemArgs {
    /// File with one name per line, or a JSON array of names / candidate objects
    #[arg(long)]
    items: Option<PathBuf>,

    /// Inline name (repeatable)
    #[arg(long = "item")]
    inline_items: Vec<String>,
}

#[derive(clap::Args)]
struct SessionArgs {
    /// Whose session this is (default: config `user`, then $USER)
    #[arg(long)]
    user: Option<String>,

    /// Session file (default: ~/.local/share/namerank/sessions.json)
    #[arg(long)]
    store: Option<PathBuf>,

    /// Path to config file (default: ~/.config/namerank/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(clap::Args)]
struct SyncArgs {
    /// Base URL that receives final ratings
    #[arg(long)]
    endpoint: Option<String>,

    /// Bearer token for the endpoint (also reads NAMERANK_API_KEY env var)
    #[arg(long)]
    api_key: Option<String>,

    /// Max retries per delivery. Default: 3. Set to 0 to disable.
    #[arg(long)]
    retries: Option<usize>,

    /// Queue file for undelivered ratings
    #[arg(long)]
    outbox: Option<PathBuf>,
}

#[derive(Parser)]
struct VoteArgs {
    #[command(flatten)]
    items: ItemArgs,

    #[command(flatten)]
    session: SessionArgs,

    #[command(flatten)]
    sync: SyncArgs,

    /// Ratings file: read as starting ratings, rewritten when the session finishes
    #[arg(long)]
    ratings: Option<PathBuf>,

    /// Stop after this many votes even if pairs remain
    #[arg(long)]
    max_matches: Option<usize>,

    /// Pause after each vote, in milliseconds. Default: 500.
    #[arg(long)]
    transition_ms: Option<i64>,

    /// Output JSON instead of table
    #[arg(long)]
    json: bool,
}

#[derive(Parser)]
struct ResetArgs {
    #[command(flatten)]
    items: ItemArgs,

    #[command(flatten)]
    session: SessionArgs,
}

#[derive(Parser)]
struct BlendArgs {
    /// Ratings file to start from (map or array, as written by `vote --ratings`)
    #[arg(long)]
    ratings: PathBuf,

    /// File with the manual order, best first
    #[arg(long)]
    order: PathBuf,

    /// Matches already played. Default: half the sum of games in the ratings file.
    #[arg(long)]
    matches_played: Option<usize>,

    /// Match budget the blend saturates at. Default: every pair of the ordered names.
    #[arg(long)]
    max_matches: Option<usize>,

    /// Write blended ratings here
    #[arg(long)]
    output: Option<PathBuf>,

    /// Output JSON instead of table
    #[arg(long)]
    json: bool,
}

#[derive(Parser)]
struct SimulateArgs {
    /// Names per simulated session
    #[arg(long, default_value_t = 10)]
    names: usize,

    /// Number of sessions to run
    #[arg(long, default_value_t = 20)]
    trials: usize,

    /// Probability the voter picks the weaker name (0.0 to 1.0)
    #[arg(long, default_value_t = 0.1)]
    noise: f64,

    /// Probability of a "both"/"neither" answer (0.0 to 1.0)
    #[arg(long, default_value_t = 0.05)]
    tie_rate: f64,

    /// Stop each session after this many votes
    #[arg(long)]
    max_matches: Option<usize>,

    /// Seed for reproducible runs
    #[arg(long)]
    seed: Option<u64>,
}

#[derive(Parser)]
struct FlushArgs {
    #[command(flatten)]
    sync: SyncArgs,

    /// Path to config file (default: ~/.config/namerank/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level)).init();
}

fn read_file(path: &Path, what: &str) -> String {
    std::fs::read_to_string(path)
        .unwrap_or_else(|e| bail(format!("Failed to read {what} file {}: {e}", path.display())))
}

/// Load names from --items and --item. Stdin is reserved for votes.
fn load_items(args: &ItemArgs) -> Vec<CandidateItem> {
    let mut items = Vec::new();

    if let Some(ref path) = args.items {
        items = parse::parse_items_from_str(&read_file(path, "items")).unwrap_or_else(|e| bail(e));
    }
    items.extend(
        args.inline_items
            .iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(CandidateItem::new),
    );

    if items.is_empty() {
        bail("No names provided. Use --items <file> or --item <name>.");
    }
    if let Some(name) = parse::find_duplicate_name(&items) {
        bail(format!("Name \"{name}\" is listed more than once. Give each name once."));
    }
    items
}

fn load_ratings(path: &Path) -> RatingMap {
    parse::parse_ratings_from_str(&read_file(path, "ratings")).unwrap_or_else(|e| bail(e))
}

fn resolve_user(args: &SessionArgs, cfg: &NamerankConfig) -> String {
    args.user
        .clone()
        .or_else(|| cfg.user.clone())
        .or_else(|| std::env::var("USER").ok())
        .filter(|u| !u.trim().is_empty())
        .unwrap_or_else(|| bail("No user specified. Pass --user or set `user` in the config file."))
}

fn resolve_store(args: &SessionArgs, cfg: &NamerankConfig) -> PathBuf {
    args.store
        .clone()
        .or_else(|| cfg.store.clone())
        .unwrap_or_else(|| config::data_dir().join("sessions.json"))
}

fn resolve_outbox(args: &SyncArgs, cfg: &NamerankConfig) -> PathBuf {
    args.outbox
        .clone()
        .or_else(|| cfg.outbox.clone())
        .unwrap_or_else(|| config::data_dir().join("outbox.jsonl"))
}

fn resolve_sync(args: &SyncArgs, cfg: &NamerankConfig) -> Option<SyncConfig> {
    let endpoint = args.endpoint.clone().or_else(|| cfg.endpoint.clone())?;
    Some(SyncConfig {
        endpoint,
        api_key: args
            .api_key
            .clone()
            .or_else(|| std::env::var("NAMERANK_API_KEY").ok()),
        max_retries: args.retries.or(cfg.retries).unwrap_or(3),
        retry_delay: std::time::Duration::from_secs(1),
    })
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Vote(args) => run_vote(args).await,
        Commands::Reset(args) => run_reset(args),
        Commands::Blend(args) => run_blend(args),
        Commands::Simulate(args) => run_simulate(args),
        Commands::Flush(args) => run_flush(args).await,
        Commands::Init => {
            let path = config::create_default_config();
            println!("Created config at {}", path.display());
            println!("Edit it to set your user name, endpoint, etc.");
        }
    }
}

async fn run_vote(args: VoteArgs) {
    // Load config file, merge with CLI args (CLI wins)
    let config_path = args.session.config.clone().unwrap_or_else(config::config_path);
    let cfg = config::load_config(&config_path);

    let user = resolve_user(&args.session, &cfg);
    let items = load_items(&args.items);
    let existing = match args.ratings {
        Some(ref path) if path.exists() => load_ratings(path),
        _ => RatingMap::new(),
    };
    let descriptions: HashMap<String, String> = items
        .iter()
        .filter_map(|i| i.description.clone().map(|d| (i.name.clone(), d)))
        .collect();

    let transition_ms = args.transition_ms.or(cfg.transition_ms).unwrap_or(500);
    if transition_ms < 0 {
        bail("--transition-ms must not be negative");
    }
    let session_config = SessionConfig {
        transition_delay: Duration::milliseconds(transition_ms),
        max_matches: args.max_matches.or(cfg.max_matches),
        ..SessionConfig::default()
    };
    let transition = session_config.transition_delay.to_std().unwrap_or_default();

    let store_path = resolve_store(&args.session, &cfg);
    let completed: Rc<RefCell<Option<Vec<FinalRating>>>> = Rc::new(RefCell::new(None));
    let sink = completed.clone();

    let mut session = VotingSession::new(user.clone(), JsonFileStore::open(&store_path), session_config);
    if let Err(e) = session.initialize_session(&items, &existing, move |finals| {
        *sink.borrow_mut() = Some(finals.to_vec());
    }) {
        bail(format!("{e}. Add more names or unhide some."));
    }

    if session.phase() == SessionPhase::Complete {
        println!("This session is already finished. Run `namerank reset` with the same names to start over.\n");
        output::print_table(&session.final_ratings(), session.history().len());
        return;
    }
    if !session.history().is_empty() {
        println!(
            "Resuming {}'s session at match {} of {}.",
            user,
            session.current_match_number(),
            session.total_matches()
        );
    }

    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        session.tick(Utc::now());
        let snapshot = session.snapshot();
        let Some(matchup) = session.visible_match().cloned() else {
            break;
        };

        println!("\n{}", prompt::render_match(&snapshot, &matchup, &descriptions));
        print!("> ");
        let _ = io::stdout().flush();

        let line = match lines.next() {
            Some(Ok(line)) => line,
            Some(Err(e)) => bail(format!("Failed to read from stdin: {e}")),
            None => {
                session.teardown();
                println!("\nProgress saved. Run the same command to continue.");
                return;
            }
        };

        match parse::parse_command(&line) {
            Some(Command::Vote(outcome)) => match session.vote(outcome, Utc::now()) {
                VoteResult::Next { .. } => {
                    tokio::time::sleep(transition).await;
                    session.tick(Utc::now());
                    session.finish_transition();
                }
                VoteResult::Completed(_) => break,
                VoteResult::Ignored(reason) => debug!("Vote ignored: {reason:?}"),
            },
            Some(Command::Undo) => match session.undo(Utc::now()) {
                UndoResult::Reverted(m) => println!("Undid {} vs {}.", m.left, m.right),
                UndoResult::Ignored(IgnoreReason::NothingToUndo) => println!("Nothing to undo."),
                UndoResult::Ignored(reason) => debug!("Undo ignored: {reason:?}"),
            },
            Some(Command::Help) => println!("{}", prompt::HELP),
            Some(Command::Quit) => {
                session.teardown();
                println!("Progress saved. Run the same command to continue.");
                return;
            }
            None => println!("Unrecognised input {:?}. Type ? for help.", line.trim()),
        }
    }

    let Some(finals) = completed.borrow_mut().take() else {
        return;
    };
    let total_matches = session.history().len();

    println!();
    if args.json {
        output::print_json(&user, &finals, total_matches);
    } else {
        output::print_table(&finals, total_matches);
    }

    if let Some(ref path) = args.ratings {
        match output::write_ratings_file(path, &finals) {
            Ok(()) => eprintln!("Ratings written to {}", path.display()),
            Err(e) => warn!("Failed to write ratings to {}: {e}", path.display()),
        }
    }

    if let Some(sync_config) = resolve_sync(&args.sync, &cfg) {
        let outbox = resolve_outbox(&args.sync, &cfg);
        let client = Client::new();
        let payload = RatingsPayload::new(&user, &finals, Utc::now());

        // Older payloads go first; if any are still stuck, queue behind them.
        let report = sync::flush_outbox(&client, &sync_config, &outbox)
            .await
            .unwrap_or_else(|e| bail(format!("Failed to read outbox {}: {e}", outbox.display())));
        if report.sent > 0 {
            eprintln!("Delivered {} queued result(s).", report.sent);
        }
        if report.remaining > 0 {
            sync::enqueue(&outbox, &payload)
                .unwrap_or_else(|e| bail(format!("Failed to queue ratings in {}: {e}", outbox.display())));
            eprintln!("Endpoint unreachable; ratings queued. Run `namerank flush` to retry.");
            return;
        }

        match sync::deliver_ratings(&client, &sync_config, &payload, &outbox).await {
            Ok(Delivery::Sent { retries_used }) => {
                debug!("Delivery took {retries_used} retries");
                eprintln!("Ratings saved to {}", sync_config.endpoint);
            }
            Ok(Delivery::Queued { error }) => {
                eprintln!("Could not save ratings ({error}). Queued; run `namerank flush` to retry.");
            }
            Err(e) => bail(format!("Failed to queue ratings in {}: {e}", outbox.display())),
        }
    }
}

fn run_reset(args: ResetArgs) {
    let config_path = args.session.config.clone().unwrap_or_else(config::config_path);
    let cfg = config::load_config(&config_path);

    let user = resolve_user(&args.session, &cfg);
    let visible: Vec<CandidateItem> = load_items(&args.items).into_iter().filter(|i| !i.hidden).collect();
    let store_path = resolve_store(&args.session, &cfg);

    let mut store = SessionStore::new(JsonFileStore::open(&store_path));
    store.bind(&user, &visible);
    let had_progress = store.load().is_some_and(|s| !s.match_history.is_empty());
    store
        .reset()
        .unwrap_or_else(|e| bail(format!("Failed to update {}: {e}", store_path.display())));

    if had_progress {
        println!("Cleared saved progress for {user}.");
    } else {
        println!("No saved progress for {user} with these names.");
    }
}

fn run_blend(args: BlendArgs) {
    let ratings = load_ratings(&args.ratings);
    let order: Vec<String> = parse::parse_items_from_str(&read_file(&args.order, "order"))
        .unwrap_or_else(|e| bail(e))
        .into_iter()
        .map(|i| i.name)
        .collect();
    if order.is_empty() {
        bail("Order file lists no names.");
    }

    let played = args.matches_played.unwrap_or_else(|| {
        let games: u32 = order.iter().filter_map(|n| ratings.get(n)).map(|r| r.games_played()).sum();
        games as usize / 2
    });
    let max_matches = args
        .max_matches
        .unwrap_or_else(|| order.len() * (order.len() - 1) / 2);

    debug!("Blending {} names: {played} of {max_matches} matches played", order.len());
    let blended = apply_manual_order(&order, &ratings, played, max_matches);
    let finals = sorted_final_ratings(&order, &blended);

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&output::export_ratings(&finals)).unwrap_or_else(|e| bail(e))
        );
    } else {
        output::print_table(&finals, played);
    }

    if let Some(ref path) = args.output {
        output::write_ratings_file(path, &finals)
            .unwrap_or_else(|e| bail(format!("Failed to write {}: {e}", path.display())));
        eprintln!("Blended ratings written to {}", path.display());
    }
}

fn run_simulate(args: SimulateArgs) {
    if args.names < 2 {
        bail("--names must be at least 2");
    }
    if !(0.0..=1.0).contains(&args.noise) {
        bail("--noise must be between 0.0 and 1.0");
    }
    if !(0.0..=1.0).contains(&args.tie_rate) {
        bail("--tie-rate must be between 0.0 and 1.0");
    }

    let cfg = simulate::SimulationConfig {
        names: args.names,
        trials: args.trials,
        noise: args.noise,
        tie_rate: args.tie_rate,
        max_matches: args.max_matches,
        seed: args.seed,
    };
    let report = simulate::run_simulation(&cfg).unwrap_or_else(|e| bail(e));
    simulate::print_report(&cfg, &report);
}

async fn run_flush(args: FlushArgs) {
    let config_path = args.config.clone().unwrap_or_else(config::config_path);
    let cfg = config::load_config(&config_path);

    let sync_config = resolve_sync(&args.sync, &cfg).unwrap_or_else(|| {
        bail(format!("No endpoint specified. Pass --endpoint or set it in {}", config_path.display()))
    });
    let outbox = resolve_outbox(&args.sync, &cfg);

    let report = sync::flush_outbox(&Client::new(), &sync_config, &outbox)
        .await
        .unwrap_or_else(|e| bail(format!("Failed to update outbox {}: {e}", outbox.display())));

    if report.sent == 0 && report.remaining == 0 && report.rejected == 0 {
        println!("Nothing queued.");
    } else {
        println!("Delivered {}, still queued {}.", report.sent, report.remaining);
    }
    if report.rejected > 0 {
        eprintln!(
            "{} unreadable line(s) moved to {}",
            report.rejected,
            sync::rejected_path(&outbox).display()
        );
    }
    if report.remaining > 0 {
        std::process::exit(1);
    }
}
