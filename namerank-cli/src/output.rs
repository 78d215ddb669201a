/// Output formatting: terminal table, JSON, and the ratings file.
use namerank_core::{clamp_for_export, FinalRating};
use serde::Serialize;
use std::path::Path;

#[derive(Serialize)]
struct JsonRankedName {
    rank: usize,
    name: String,
    rating: f64,
    wins: u32,
    losses: u32,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct JsonOutput {
    user_name: String,
    names: Vec<JsonRankedName>,
    total_matches: usize,
}

/// Clamp ratings to the export range. Order is kept.
pub fn export_ratings(finals: &[FinalRating]) -> Vec<FinalRating> {
    finals
        .iter()
        .map(|f| FinalRating {
            rating: clamp_for_export(f.rating),
            ..f.clone()
        })
        .collect()
}

fn render_table(finals: &[FinalRating], total_matches: usize) -> String {
    let name_width = finals
        .iter()
        .map(|f| f.name.chars().count())
        .max()
        .unwrap_or(4)
        .max(4); // at least "Name"

    let mut out = String::new();
    out.push_str(&format!(" # | {:<name_width$} | Rating | Wins | Losses\n", "Name"));
    out.push_str(&format!("---|-{}-|--------|------|-------\n", "-".repeat(name_width)));
    for (i, f) in finals.iter().enumerate() {
        out.push_str(&format!(
            "{:>2} | {:<name_width$} | {:>6.0} | {:>4} | {:>6}\n",
            i + 1,
            f.name,
            clamp_for_export(f.rating),
            f.wins,
            f.losses,
        ));
    }
    out.push_str(&format!("\n{} names ranked ({} matches)", finals.len(), total_matches));
    out
}

/// Print results as a formatted terminal table.
pub fn print_table(finals: &[FinalRating], total_matches: usize) {
    println!("{}", render_table(finals, total_matches));
}

fn render_json(user_name: &str, finals: &[FinalRating], total_matches: usize) -> String {
    let names = export_ratings(finals)
        .into_iter()
        .enumerate()
        .map(|(i, f)| JsonRankedName {
            rank: i + 1,
            name: f.name,
            rating: f.rating,
            wins: f.wins,
            losses: f.losses,
        })
        .collect();

    let output = JsonOutput {
        user_name: user_name.to_string(),
        names,
        total_matches,
    };
    serde_json::to_string_pretty(&output).unwrap_or_else(|e| crate::bail(e))
}

/// Print results as JSON.
pub fn print_json(user_name: &str, finals: &[FinalRating], total_matches: usize) {
    println!("{}", render_json(user_name, finals, total_matches));
}

/// Write ratings as a JSON array that `--ratings` can read back.
pub fn write_ratings_file(path: &Path, finals: &[FinalRating]) -> std::io::Result<()> {
    let body = serde_json::to_string_pretty(&export_ratings(finals))?;
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(path, body)
}
