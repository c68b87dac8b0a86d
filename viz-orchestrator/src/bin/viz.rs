//! Viz CLI - watch a sentiment model's pipeline stage by stage
//!
//! Usage:
//!   viz <TEXT> [--endpoint <url>] [--timeout <secs>] [--config <file>] [--verbose]
//!
//! Example:
//!   viz "Bài giảng rất hay và dễ hiểu"
//!   viz "Khóa học này thật sự rất tệ" --endpoint http://gpu-box:8000 -v

use anyhow::{Context, Result};
use colored::Colorize;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;
use viz::display::{DisplayModel, Sentiment};
use viz::scheduler::RevealProgress;
use viz::session::{Phase, SessionError};
use viz::{
    AnalysisSession, ConfidenceScale, HttpPredictProvider, ResultNormalizer, Stage, VizConfig,
};

const DEFAULT_ENDPOINT: &str = "http://localhost:8000";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Embedding rows shown in the Embedding stage
const EMBEDDING_ROWS_SHOWN: usize = 3;
/// Sentence-vector components shown in the Pooling stage
const POOLING_COMPONENTS_SHOWN: usize = 6;
const BAR_WIDTH: usize = 20;

fn print_usage() {
    eprintln!(
        r#"
{} - Watch a sentiment classifier's pipeline, stage by stage

{}
    viz <TEXT> [OPTIONS]

{}
    <TEXT>     Text to analyse

{}
    -e, --endpoint <URL>        Model server URL (default: http://localhost:8000)
    -t, --timeout <SECS>        Request timeout in seconds (default: 30)
    -c, --config <FILE>         Load endpoint settings from a TOML file
    --fraction                  Server reports confidence in [0, 1]
    --seed <N>                  Seed for placeholder signal
    -v, --verbose               Show info logs
    -vv                         Show debug logs
    -h, --help                  Print this help message

{}
    viz "Bài giảng rất hay và dễ hiểu"
    viz "Thầy dạy hơi nhanh nhưng rất nhiệt tình" -e http://gpu-box:8000
"#,
        "Viz CLI".bold(),
        "USAGE:".bold(),
        "ARGS:".bold(),
        "OPTIONS:".bold(),
        "EXAMPLES:".bold(),
    );
}

struct CliArgs {
    text: String,
    endpoint: Option<String>,
    timeout_secs: Option<u64>,
    config: Option<String>,
    fraction: bool,
    seed: Option<u64>,
    verbose: u8, // 0=warn, 1=info, 2=debug
}

fn parse_args() -> Result<CliArgs> {
    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 || args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        std::process::exit(if args.iter().any(|a| a == "--help" || a == "-h") {
            0
        } else {
            1
        });
    }

    let text = args[1].clone();
    let mut endpoint = None;
    let mut timeout_secs = None;
    let mut config = None;
    let mut fraction = false;
    let mut seed = None;
    let mut verbose: u8 = 0;

    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            "--endpoint" | "-e" => {
                i += 1;
                endpoint = args.get(i).cloned();
            }
            "--timeout" | "-t" => {
                i += 1;
                if let Some(value) = args.get(i) {
                    timeout_secs = Some(
                        value
                            .parse()
                            .with_context(|| format!("Invalid timeout: {}", value))?,
                    );
                }
            }
            "--config" | "-c" => {
                i += 1;
                config = args.get(i).cloned();
            }
            "--fraction" => {
                fraction = true;
            }
            "--seed" => {
                i += 1;
                if let Some(value) = args.get(i) {
                    seed = Some(
                        value
                            .parse()
                            .with_context(|| format!("Invalid seed: {}", value))?,
                    );
                }
            }
            "--verbose" | "-v" => {
                verbose = verbose.max(1);
            }
            "-vv" => {
                verbose = 2;
            }
            other => {
                eprintln!("{} ignoring unknown option {}", "Warning:".yellow(), other);
            }
        }
        i += 1;
    }

    Ok(CliArgs {
        text,
        endpoint,
        timeout_secs,
        config,
        fraction,
        seed,
        verbose,
    })
}

/// Config file first, then command-line overrides
fn resolve_config(args: &CliArgs) -> Result<VizConfig> {
    let mut config = match &args.config {
        Some(path) => VizConfig::load(path)
            .with_context(|| format!("Failed to load config file: {}", path))?,
        None => VizConfig::for_endpoint(
            DEFAULT_ENDPOINT,
            Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        ),
    };

    if let Some(endpoint) = &args.endpoint {
        config.endpoint.base_url = endpoint.clone();
    }
    if let Some(secs) = args.timeout_secs {
        config.endpoint.timeout_secs = secs;
    }
    if args.fraction {
        config.endpoint.confidence_scale = ConfidenceScale::Fraction;
    }
    if args.seed.is_some() {
        config.synthesis.seed = args.seed;
    }

    config.validate()?;
    Ok(config)
}

fn print_stage_header(index: usize, total: usize) {
    let Some(stage) = Stage::from_index(index) else {
        return;
    };
    eprintln!(
        "{} {} {}",
        format!("[{}/{}]", index + 1, total).cyan(),
        stage.name().bold(),
        format!("- {}", stage.description()).dimmed()
    );
    let _ = std::io::stderr().flush();
}

fn bar(width_percent: f64) -> String {
    let filled = ((width_percent / 100.0) * BAR_WIDTH as f64).round() as usize;
    format!(
        "{}{}",
        "█".repeat(filled.min(BAR_WIDTH)),
        "░".repeat(BAR_WIDTH - filled.min(BAR_WIDTH))
    )
}

fn print_stage_data(stage: Stage, model: &DisplayModel) {
    println!(
        "{}",
        format!("┌─ {} ─────────────────────────────────────────", stage.name()).cyan()
    );
    match stage {
        Stage::InputText => {
            println!("{}   \"{}\"", "│".cyan(), model.original_text);
        }
        Stage::Tokenizer => {
            println!("{}   {}", "│".cyan(), model.tokens.join(" | "));
            println!(
                "{}   {}",
                "│".cyan(),
                format!("Total tokens: {}", model.token_count()).dimmed()
            );
        }
        Stage::Embedding => {
            for (token, row) in model
                .tokens
                .iter()
                .zip(&model.embedding_preview)
                .take(EMBEDDING_ROWS_SHOWN)
            {
                let values: Vec<&str> = row.iter().map(|v| v.as_str()).collect();
                println!("{}   {}: [{}...]", "│".cyan(), token.dimmed(), values.join(", "));
            }
            println!(
                "{}   {}",
                "│".cyan(),
                format!("Shape: [{}, 768]", model.token_count()).dimmed()
            );
            if model.embedding_source.is_synthesized() {
                println!("{}   {}", "│".cyan(), "(approximate: placeholder values)".yellow());
            }
        }
        Stage::TransformerLayers => {
            for entry in &model.attention {
                println!(
                    "{}   {:<16} {} {}",
                    "│".cyan(),
                    entry.token,
                    bar(entry.weight.bar_width_percent()).magenta(),
                    entry.weight
                );
            }
            if model.attention_source.is_synthesized() {
                println!("{}   {}", "│".cyan(), "(approximate: placeholder values)".yellow());
            }
        }
        Stage::Pooling => {
            let values: Vec<&str> = model
                .sentence_vector
                .iter()
                .take(POOLING_COMPONENTS_SHOWN)
                .map(|v| v.as_str())
                .collect();
            println!("{}   [CLS] vector: [{}...]", "│".cyan(), values.join(", "));
        }
        Stage::ClassificationHead => {
            for (label, prob) in model.class_probabilities.entries() {
                let bar = bar(prob.bar_width_percent());
                let bar = match label {
                    "positive" => bar.green(),
                    "negative" => bar.red(),
                    _ => bar.white(),
                };
                println!("{}   {:<9} {} {}", "│".cyan(), label, bar, prob);
            }
        }
        Stage::Output => {
            let label = match model.sentiment {
                Sentiment::Positive => model.sentiment_label.green().bold(),
                Sentiment::Negative => model.sentiment_label.red().bold(),
                Sentiment::Neutral => model.sentiment_label.white().bold(),
            };
            println!("{}   {}", "│".cyan(), label);
            println!(
                "{}   Confidence: {:.1}%",
                "│".cyan(),
                model.confidence_percent
            );
        }
    }
    println!(
        "{}",
        "└──────────────────────────────────────────────────────".cyan()
    );
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = parse_args()?;

    let level = match args.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        _ => Level::DEBUG,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = resolve_config(&args)?;

    let provider = HttpPredictProvider::new(&config.endpoint.base_url, config.request_timeout())
        .context("Failed to create HTTP client")?
        .with_confidence_scale(config.endpoint.confidence_scale);

    let session = AnalysisSession::with_normalizer(
        Arc::new(provider),
        config.request_timeout(),
        ResultNormalizer::from_seed(config.synthesis.seed),
    );

    eprintln!(
        "{} {} {}",
        "Analysing via".dimmed(),
        config.endpoint.base_url,
        format!("(timeout {}s)", config.endpoint.timeout_secs).dimmed()
    );
    eprintln!();

    let handle = match session.start(&args.text) {
        Ok(handle) => handle,
        Err(SessionError::EmptyInput) => {
            eprintln!("{} nothing to analyse, the text is empty", "Error:".red().bold());
            std::process::exit(1);
        }
    };

    let total = session.stage_count();
    let mut states = session.subscribe();
    let mut shown = RevealProgress::default();

    loop {
        let snapshot = states.borrow_and_update().clone();
        if snapshot.session != Some(handle.id()) {
            break;
        }

        if let Some(cursor) = snapshot.progress.cursor {
            let first_new = shown.cursor.map_or(0, |c| c + 1);
            for index in first_new..=cursor {
                print_stage_header(index, total);
            }
            shown = snapshot.progress;
        }

        match &snapshot.phase {
            Phase::Failed { cause } => {
                eprintln!("{} {}", "Error:".red().bold(), cause);
                eprintln!(
                    "{}",
                    format!("Is the model server running at {}?", config.endpoint.base_url).dimmed()
                );
                std::process::exit(1);
            }
            Phase::Complete => {
                if let Some(model) = &snapshot.model {
                    println!();
                    for stage in Stage::ALL {
                        if snapshot.stage_visible(stage) {
                            print_stage_data(stage, model);
                        }
                    }
                }
                break;
            }
            _ => {}
        }

        if states.changed().await.is_err() {
            break;
        }
    }

    Ok(())
}
