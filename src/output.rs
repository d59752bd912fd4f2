use std::io::{self, Write};

use serde::Serialize;

use crate::app::{InfoResult, ListResult, StatsResult, WatchResult};
use crate::cache::CollectionSummary;

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Text,
    Json,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_list(result: &ListResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_info(result: &InfoResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_stats(result: &StatsResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_watch(result: &WatchResult) -> io::Result<()> {
        Self::print_json(result)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout().lock();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

pub struct TextOutput;

impl TextOutput {
    pub fn print_list(result: &ListResult) -> io::Result<()> {
        let mut out = io::stdout().lock();
        writeln!(
            out,
            "{:<38} {:<24} {:<9} {:<11} {:<11} {:<10} {:>8}",
            "ID", "NAME", "PARSE", "CHUNK", "VECTORIZE", "EMBEDDING", "ROWS"
        )?;
        for entry in &result.datasets {
            writeln!(
                out,
                "{:<38} {:<24} {:<9} {:<11} {:<11} {:<10} {:>8}",
                entry.id,
                truncate(&entry.name, 24),
                entry.parse,
                entry.chunk,
                entry.vectorize,
                entry.embedding,
                entry.row_count
            )?;
        }
        write_summary(&mut out, &result.summary)
    }

    pub fn print_info(result: &InfoResult) -> io::Result<()> {
        let mut out = io::stdout().lock();
        let dataset = &result.dataset;
        writeln!(out, "{} ({})", dataset.display_name(), dataset.id)?;
        if let Some(description) = &dataset.description {
            writeln!(out, "  {description}")?;
        }
        writeln!(
            out,
            "  rows={} columns={} size={}",
            dataset.row_count,
            dataset.column_count,
            dataset
                .file_size
                .map(|size| size.to_string())
                .unwrap_or_else(|| "-".to_string())
        )?;
        for stage in &result.stages {
            let progress = stage
                .progress
                .map(|p| format!(" {p}%"))
                .unwrap_or_default();
            writeln!(out, "  {:<10} {}{}", stage.stage.to_string(), stage.status, progress)?;
            if let Some(error) = &stage.error {
                writeln!(out, "             error: {error}")?;
            }
        }
        Ok(())
    }

    pub fn print_stats(result: &StatsResult) -> io::Result<()> {
        let mut out = io::stdout().lock();
        write_summary(&mut out, &result.summary)?;
        match result.fetched_at {
            Some(at) => writeln!(out, "fetched at {} (fresh: {})", at.to_rfc3339(), result.fresh),
            None => writeln!(out, "never fetched"),
        }
    }

    pub fn print_watch(result: &WatchResult) -> io::Result<()> {
        let mut out = io::stdout().lock();
        let watch = &result.watch;
        writeln!(
            out,
            "{} after {} round(s)",
            if watch.settled { "settled" } else { "still processing" },
            watch.rounds
        )?;
        for failure in &watch.last.failed {
            writeln!(out, "  poll failed for {}: {}", failure.id, failure.message)?;
        }
        write_summary(&mut out, &result.summary)
    }
}

fn write_summary(out: &mut impl Write, summary: &CollectionSummary) -> io::Result<()> {
    writeln!(
        out,
        "total={} completed={} processing={} failed={}",
        summary.total, summary.completed, summary.processing, summary.failed
    )
}

fn truncate(value: &str, width: usize) -> String {
    if value.chars().count() <= width {
        return value.to_string();
    }
    let mut out: String = value.chars().take(width.saturating_sub(1)).collect();
    out.push('…');
    out
}
