use std::{
    fmt::Display,
    sync::Arc,
    time::{Duration, Instant},
};

use anyhow::Result;
use clap::Parser;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::error;
use tracing_subscriber::EnvFilter;
use vidquiz_core::{
    ChatCompletionsClient, Config, FullCorpusRetriever, Pipeline, Staged, format_quiz_readable,
};

fn format_duration(d: Duration) -> String {
    let secs = d.as_secs_f64();
    if secs < 60.0 {
        format!("{:.1}s", secs)
    } else {
        format!("{:.0}m {:.0}s", (secs / 60.0).floor(), secs % 60.0)
    }
}

#[derive(Parser)]
#[command(name = "vidquiz")]
#[command(
    about = "Turn video captions into timestamp-anchored multiple-choice quizzes",
    long_about = "Reads <CAPTIONS_DIR>/<video>/*.srt, groups the captions into time windows, \
                  asks a language model for quiz questions citing those windows and writes \
                  the questions with their timestamps to <OUTPUT_DIR>. Every other setting is \
                  read from the environment."
)]
struct Cli {
    /// Video folder name inside the captions directory (overrides VIDEO_TO_USE)
    #[arg(short, long)]
    video: Option<String>,

    /// Number of questions to generate (overrides QUESTION_COUNT)
    #[arg(short = 'n', long)]
    questions: Option<u32>,

    /// Rebuild every stage even if cached artifacts exist
    #[arg(short, long)]
    force: bool,

    /// Skip printing the readable quiz
    #[arg(short, long)]
    quiet: bool,
}

impl Cli {
    /// Command-line overrides take precedence over the environment.
    fn lookup(&self, var: &str) -> Option<String> {
        match var {
            "VIDEO_TO_USE" if self.video.is_some() => self.video.clone(),
            "QUESTION_COUNT" if self.questions.is_some() => self.questions.map(|n| n.to_string()),
            "OVERWRITE_EXISTING_TRANSCRIPT" if self.force => Some("1".to_string()),
            _ => std::env::var(var).ok(),
        }
    }
}

/// Map a `LOG_LEVEL` value onto a tracing directive.
fn level_directive(level: &str) -> Option<&'static str> {
    match level.trim().to_ascii_lowercase().as_str() {
        "trace" => Some("trace"),
        "debug" => Some("debug"),
        "info" => Some("info"),
        "warn" | "warning" => Some("warn"),
        "error" | "critical" => Some("error"),
        _ => None,
    }
}

/// `RUST_LOG` wins, then `LOG_LEVEL`, then warnings only.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = std::env::var("LOG_LEVEL")
            .ok()
            .and_then(|level| level_directive(&level))
            .unwrap_or("warn");
        EnvFilter::new(level)
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn create_spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ")
            .template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

fn fail(err: impl Display) -> ! {
    eprintln!("{} {}", style("Error:").red().bold(), err);
    std::process::exit(1);
}

/// Finish a stage spinner with either the cached marker or the elapsed time.
fn finish<T>(spinner: ProgressBar, staged: &Staged<T>, summary: String, started: Instant) {
    let marker = if staged.is_cached() {
        style("(cached)".to_string()).dim()
    } else {
        style(format!("[{}]", format_duration(started.elapsed()))).dim()
    };
    spinner.finish_with_message(format!(
        "{} {} {}",
        style("✓").green().bold(),
        summary,
        marker
    ));
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let config = match Config::from_lookup(|var| cli.lookup(var)) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "configuration rejected");
            fail(e);
        }
    };

    println!(
        "\n{}  {}\n",
        style("vidquiz").cyan().bold(),
        style("Caption Quiz Generator").dim()
    );
    println!(
        "{} {}  {} {} ({})  {} {}s",
        style("Video:").dim(),
        style(&config.video).yellow(),
        style("Model:").dim(),
        config.credentials.model,
        config.credentials.provider,
        style("Window:").dim(),
        config.window_size_secs
    );
    println!("{}", style("─".repeat(60)).dim());

    let generator = ChatCompletionsClient::new(
        config.credentials.clone(),
        config.retry.clone(),
        config.request_timeout,
    )
    .unwrap_or_else(|e| {
        error!(error = %e, "http client could not be built");
        fail(e)
    });
    let generator = Arc::new(generator);
    let mut pipeline = Pipeline::new(&config, generator, Arc::new(FullCorpusRetriever));
    let total_start = Instant::now();

    // Step 1: Captions into windows
    let step_start = Instant::now();
    let spinner = create_spinner("Windowing captions...");
    let transcript = pipeline.transcript().await.unwrap_or_else(|e| fail(e));
    let minutes = transcript
        .value
        .windows
        .last()
        .map(|w| w.end.as_secs_f64() / 60.0)
        .unwrap_or(0.0);
    let summary = format!(
        "Windowed: {:.1} min, {} captions into {} windows",
        minutes,
        transcript.value.captions.len(),
        transcript.value.windows.len()
    );
    finish(spinner, &transcript, summary, step_start);

    // Step 2: Topic labels
    let step_start = Instant::now();
    let spinner = create_spinner("Labelling topics...");
    let topics = pipeline
        .topics(&transcript.value)
        .await
        .unwrap_or_else(|e| fail(e));
    let summary = format!("Topics labelled: {}", topics.value.topics.len());
    finish(spinner, &topics, summary, step_start);

    // Step 3: Questions
    let step_start = Instant::now();
    let spinner = create_spinner(&format!(
        "Generating {} questions with {}...",
        config.question_count, config.credentials.model
    ));
    let questions = pipeline
        .questions(&transcript.value, &topics.value)
        .await
        .unwrap_or_else(|e| fail(e));
    let summary = format!("Questions generated: {}", questions.value.resolved.len());
    finish(spinner, &questions, summary, step_start);

    let output_path = pipeline
        .write_output(&questions.value)
        .await
        .unwrap_or_else(|e| fail(e));

    println!(
        "\n{} {}\n",
        style("Total time:").dim(),
        style(format_duration(total_start.elapsed())).cyan().bold()
    );
    println!(
        "{} {}\n",
        style("Saved:").dim(),
        style(output_path.display()).cyan()
    );

    if !cli.quiet {
        println!("{}", style("─".repeat(60)).dim());
        let readable = format_quiz_readable(
            &config.video,
            &topics.value.topics,
            &questions.value.resolved,
        );
        println!("{}", readable);
    }

    Ok(())
}
