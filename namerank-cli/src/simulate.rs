/// Simulate command: runs whole sessions against a synthetic voter with a hidden
/// true order and measures how well the final Elo ranking recovers it.
///
/// The voter prefers the truly stronger name, picks the weaker one with
/// probability `noise`, and answers "both"/"neither" with probability `tie_rate`.
use chrono::{DateTime, Duration, Utc};
use log::debug;
use namerank_core::{
    CandidateItem, MemoryStore, RatingMap, SessionConfig, SessionError, VoteOutcome, VoteResult,
    VotingSession,
};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;

pub struct SimulationConfig {
    pub names: usize,
    pub trials: usize,
    pub noise: f64,
    pub tie_rate: f64,
    pub max_matches: Option<usize>,
    pub seed: Option<u64>,
}

/// Outcome of one simulated session.
pub struct TrialResult {
    pub spearman: f64,
    pub top_correct: bool,
    pub matches: usize,
}

#[derive(Debug)]
pub struct SimulationReport {
    pub trials: usize,
    pub mean_spearman: f64,
    pub min_spearman: f64,
    pub top_hit_rate: f64,
    pub mean_matches: f64,
}

/// Spearman rank correlation for two rankings without ties.
/// `predicted[i]` and `truth[i]` are the 0-based positions of item `i`.
pub fn spearman(predicted: &[usize], truth: &[usize]) -> f64 {
    let n = predicted.len();
    if n < 2 {
        return 1.0;
    }
    let d2: f64 = predicted
        .iter()
        .zip(truth)
        .map(|(&p, &t)| {
            let d = p as f64 - t as f64;
            d * d
        })
        .sum();
    let n = n as f64;
    1.0 - 6.0 * d2 / (n * (n * n - 1.0))
}

fn choose(rng: &mut StdRng, left_strength: usize, right_strength: usize, noise: f64, tie_rate: f64) -> VoteOutcome {
    if rng.random_bool(tie_rate) {
        return if rng.random_bool(0.5) { VoteOutcome::Both } else { VoteOutcome::Neither };
    }
    let left_better = left_strength > right_strength;
    let correct = !rng.random_bool(noise);
    if left_better == correct {
        VoteOutcome::Left
    } else {
        VoteOutcome::Right
    }
}

/// Run one session to completion with a fresh hidden order.
pub fn run_trial(cfg: &SimulationConfig, rng: &mut StdRng, start: DateTime<Utc>) -> Result<TrialResult, SessionError> {
    let names: Vec<String> = (1..=cfg.names).map(|i| format!("Name {i:02}")).collect();
    let items: Vec<CandidateItem> = names.iter().map(|n| CandidateItem::new(n.clone())).collect();

    // strength[name]: higher is better; the true position is count - 1 - strength.
    let mut strengths: Vec<usize> = (0..cfg.names).collect();
    strengths.shuffle(rng);
    let strength: HashMap<&str, usize> = names.iter().map(|n| n.as_str()).zip(strengths.iter().copied()).collect();

    let session_config = SessionConfig {
        max_matches: cfg.max_matches,
        ..SessionConfig::default()
    };
    let mut session = VotingSession::with_seed("simulator", MemoryStore::new(), session_config, rng.random());
    session.initialize_session(&items, &RatingMap::new(), |_| {})?;

    // One second per vote clears both the cooldown and the transition.
    let mut now = start;
    let mut matches = 0;
    while let Some(m) = session.current_match().cloned() {
        now += Duration::seconds(1);
        let outcome = choose(rng, strength[m.left.as_str()], strength[m.right.as_str()], cfg.noise, cfg.tie_rate);
        match session.vote(outcome, now) {
            VoteResult::Next { .. } => matches += 1,
            VoteResult::Completed(_) => {
                matches += 1;
                break;
            }
            VoteResult::Ignored(reason) => {
                debug!("Simulated vote ignored: {reason:?}");
                break;
            }
        }
    }

    let finals = session.final_ratings();
    let predicted_pos: HashMap<&str, usize> = finals.iter().enumerate().map(|(i, f)| (f.name.as_str(), i)).collect();
    let predicted: Vec<usize> = names.iter().map(|n| predicted_pos[n.as_str()]).collect();
    let truth: Vec<usize> = names.iter().map(|n| cfg.names - 1 - strength[n.as_str()]).collect();

    let top_correct = finals
        .first()
        .is_some_and(|f| strength[f.name.as_str()] == cfg.names - 1);

    Ok(TrialResult {
        spearman: spearman(&predicted, &truth),
        top_correct,
        matches,
    })
}

/// Run `cfg.trials` sessions and aggregate.
pub fn run_simulation(cfg: &SimulationConfig) -> Result<SimulationReport, SessionError> {
    let mut rng = match cfg.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };
    let start = Utc::now();

    let trials = cfg.trials.max(1);
    let mut total_spearman = 0.0;
    let mut min_spearman = f64::INFINITY;
    let mut top_hits = 0;
    let mut total_matches = 0;
    for trial in 0..trials {
        let result = run_trial(cfg, &mut rng, start)?;
        debug!(
            "Trial {}/{}: spearman {:.3}, {} matches",
            trial + 1,
            trials,
            result.spearman,
            result.matches
        );
        total_spearman += result.spearman;
        min_spearman = min_spearman.min(result.spearman);
        top_hits += usize::from(result.top_correct);
        total_matches += result.matches;
    }

    Ok(SimulationReport {
        trials,
        mean_spearman: total_spearman / trials as f64,
        min_spearman,
        top_hit_rate: top_hits as f64 / trials as f64,
        mean_matches: total_matches as f64 / trials as f64,
    })
}

pub fn print_report(cfg: &SimulationConfig, report: &SimulationReport) {
    println!(
        "Simulated {} sessions of {} names (noise {:.2}, tie rate {:.2})",
        report.trials, cfg.names, cfg.noise, cfg.tie_rate
    );
    println!("  Matches per session:  {:.1}", report.mean_matches);
    println!("  Rank correlation:     {:.3} mean, {:.3} worst", report.mean_spearman, report.min_spearman);
    println!("  True favourite on top: {:.0}%", report.top_hit_rate * 100.0);
}
