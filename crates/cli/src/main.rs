//! CLI tool for filtering, previewing and exporting slides from a deck.

mod repl;

use anyhow::{Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand};
use deck_core::{
    matching_positions, Deck, Exporter, FilterCriteria, FilterForm, Rasterizer, Session,
};
use deck_pptx::{open_deck, strip_watermarks_file, PptxStore};
use deck_render::ThumbnailRasterizer;
use serde::Serialize;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Filter slides by rationale and keyword, preview them and export a
/// watermark-free deck of the chosen ones.
#[derive(Parser, Debug)]
#[command(name = "deckorator")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the slides matching the filters
    Match {
        #[command(flatten)]
        filter: FilterArgs,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Write a PNG preview for every matching slide
    Preview {
        #[command(flatten)]
        filter: FilterArgs,

        /// Directory the previews are written to
        #[arg(short, long)]
        out: PathBuf,

        /// Preview every slide, ignoring the filters
        #[arg(long)]
        all: bool,
    },
    /// Strip watermarks from a deck into a new file
    Strip {
        /// Input .pptx file
        input: PathBuf,
        /// Output .pptx file
        output: PathBuf,
    },
    /// Export the given slides into a new watermark-free deck
    Export {
        /// Source deck
        #[arg(long, env = "DECKORATOR_DECK")]
        deck: PathBuf,

        /// 1-based slide numbers, in export order (e.g. 2,5)
        #[arg(long, value_delimiter = ',', required = true)]
        slides: Vec<usize>,

        /// Output directory (default: current directory)
        #[arg(short, long, default_value = ".")]
        out: PathBuf,
    },
    /// Start an interactive filter/select/export session
    Session {
        /// Source deck
        #[arg(long, env = "DECKORATOR_DECK")]
        deck: PathBuf,

        /// Output directory (default: current directory)
        #[arg(short, long, default_value = ".")]
        out: PathBuf,
    },
}

#[derive(ClapArgs, Debug)]
struct FilterArgs {
    /// Source deck
    #[arg(long, env = "DECKORATOR_DECK")]
    deck: PathBuf,

    /// Rationale term; repeat for several (default: Safety/Tolerability)
    #[arg(short, long)]
    rationale: Vec<String>,

    /// Free-text keyword
    #[arg(short, long)]
    keyword: Option<String>,
}

impl FilterArgs {
    /// Criteria from the flags; with no flags the session's default filter
    /// applies.
    fn criteria(&self) -> FilterCriteria {
        if self.rationale.is_empty() && self.keyword.is_none() {
            return FilterForm::default().criteria();
        }
        FilterCriteria::new(self.rationale.iter().cloned(), self.keyword.as_deref())
    }
}

#[derive(Serialize)]
struct MatchReport<'a> {
    deck: String,
    criteria: &'a FilterCriteria,
    slide_count: usize,
    positions: Vec<usize>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    if args.verbose {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug")).init();
    } else {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    }

    match args.command {
        Command::Match { filter, json } => run_match(&filter, json),
        Command::Preview { filter, out, all } => run_preview(&filter, &out, all),
        Command::Strip { input, output } => run_strip(&input, &output),
        Command::Export { deck, slides, out } => run_export(&deck, &slides, &out),
        Command::Session { deck, out } => {
            let exporter = Exporter::new(PptxStore::new(), &out);
            let mut session = Session::open(&deck, ThumbnailRasterizer::new(), exporter)
                .with_context(|| format!("Failed to open {}", deck.display()))?;
            repl::run(&mut session, &out)
        }
    }
}

fn load(path: &Path) -> Result<Deck> {
    open_deck(path).with_context(|| format!("Failed to open {}", path.display()))
}

fn run_match(filter: &FilterArgs, json: bool) -> Result<()> {
    let deck = load(&filter.deck)?;
    let criteria = filter.criteria();
    let positions = matching_positions(&deck, &criteria);
    log::debug!("{} of {} slides match", positions.len(), deck.slide_count());

    if json {
        let report = MatchReport {
            deck: filter.deck.display().to_string(),
            criteria: &criteria,
            slide_count: deck.slide_count(),
            positions,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else if positions.is_empty() {
        println!("No slides match.");
    } else {
        for position in positions {
            let slide = deck.slide(position)?;
            let first_line = slide
                .texts()
                .into_iter()
                .flat_map(|t| t.lines().map(str::to_string).collect::<Vec<_>>())
                .find(|l| !l.trim().is_empty())
                .unwrap_or_default();
            println!("{:>4}  {}", position, first_line.trim());
        }
    }
    Ok(())
}

fn run_preview(filter: &FilterArgs, out: &Path, all: bool) -> Result<()> {
    let deck = load(&filter.deck)?;
    let positions: Vec<usize> = if all {
        (1..=deck.slide_count()).collect()
    } else {
        matching_positions(&deck, &filter.criteria())
    };

    std::fs::create_dir_all(out)
        .with_context(|| format!("Failed to create output directory: {}", out.display()))?;

    let previews = ThumbnailRasterizer::new().rasterize(&deck)?;
    for preview in previews.iter().filter(|p| positions.contains(&p.slide)) {
        let path = out.join(format!("slide_{}.png", preview.slide));
        write_output(&path, &preview.png)?;
        if log::log_enabled!(log::Level::Debug) {
            eprintln!("Written to: {}", path.display());
        }
    }
    println!("Wrote {} preview(s) to {}", positions.len(), out.display());
    Ok(())
}

fn run_strip(input: &Path, output: &Path) -> Result<()> {
    let report = strip_watermarks_file(input, output)
        .with_context(|| format!("Failed to strip {}", input.display()))?;
    if report.is_noop() {
        println!("No watermarks found; wrote {}", output.display());
    } else {
        println!(
            "Rewrote {} text(s), removed {} shape(s); wrote {}",
            report.texts_rewritten,
            report.shapes_removed,
            output.display()
        );
    }
    Ok(())
}

fn run_export(deck_path: &Path, slides: &[usize], out: &Path) -> Result<()> {
    let deck = load(deck_path)?;
    let exporter = Exporter::new(PptxStore::new(), out);
    let exported = exporter
        .export(&deck, slides)
        .context("Failed to export slides")?;

    let path = out.join(exported.file_name());
    write_output(&path, &exported.bytes)?;
    println!(
        "Exported {} slide(s) to {}",
        exported.slide_count,
        path.display()
    );
    Ok(())
}

/// Write output to a file.
fn write_output(path: &Path, content: &[u8]) -> Result<()> {
    let mut file =
        File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;

    file.write_all(content)
        .with_context(|| format!("Failed to write to {}", path.display()))?;

    Ok(())
}
