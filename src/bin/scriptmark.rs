//! CLI binary for scriptmark.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `GradingConfig` and prints grading reports.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use scriptmark::{
    Grader, GradingConfig, GradingProgressCallback, ProgressCallback, Rubric, Submission,
    DEFAULT_BASE_URL, DEFAULT_MODEL,
};
use std::collections::HashMap;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: renders a live progress bar and per-submission
/// log lines using [indicatif]. Designed to work correctly when submissions
/// complete out-of-order (concurrent batches).
struct CliProgressCallback {
    /// The single progress bar anchored at the bottom of the terminal.
    bar: ProgressBar,
    /// Per-submission wall-clock start times for elapsed reporting.
    start_times: Mutex<HashMap<usize, Instant>>,
    /// Count of submissions that errored out.
    errors: AtomicUsize,
    /// Count of submissions graded by the heuristic estimator.
    estimated: AtomicUsize,
    /// Points available on the rubric, for the per-line grade display.
    total_points: f64,
}

impl CliProgressCallback {
    /// Create a callback whose progress-bar length is set by
    /// `on_batch_start` (called before any submissions are processed).
    fn new_dynamic(total_points: f64) -> Arc<Self> {
        let bar = ProgressBar::new(0); // length set in on_batch_start

        // Initial style: spinner only (no counter until we know the total).
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Reading submissions…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
            errors: AtomicUsize::new(0),
            estimated: AtomicUsize::new(0),
            total_points,
        })
    }

    /// Switch to the full progress-bar style once we know `total`.
    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} scripts  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Grading");
        self.bar.reset_eta();
    }
}

impl GradingProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total: usize) {
        // Switch from spinner-only style to full progress bar now that we
        // know the actual batch size.
        self.activate_bar(total);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Grading {total} submissions…"))
        ));
    }

    fn on_submission_start(&self, index: usize, _total: usize, label: &str) {
        self.start_times
            .lock()
            .unwrap()
            .insert(index, Instant::now());
        self.bar.set_message(label.to_string());
    }

    fn on_submission_complete(
        &self,
        index: usize,
        _total: usize,
        label: &str,
        grade: f64,
        fallback: bool,
    ) {
        let elapsed_ms = self
            .start_times
            .lock()
            .unwrap()
            .remove(&index)
            .map(|t| t.elapsed().as_millis())
            .unwrap_or(0);

        let marker = if fallback {
            self.estimated.fetch_add(1, Ordering::SeqCst);
            cyan("~ estimated")
        } else {
            String::new()
        };

        self.bar.println(format!(
            "  {} {:<24}  {:>6}  {}  {}",
            green("✓"),
            label,
            bold(&format!("{}/{}", fmt_points(grade), fmt_points(self.total_points))),
            dim(&format!("{:.1}s", elapsed_ms as f64 / 1000.0)),
            marker,
        ));
        self.bar.inc(1);
    }

    fn on_submission_error(&self, index: usize, _total: usize, label: &str, error: &str) {
        let elapsed_ms = self
            .start_times
            .lock()
            .unwrap()
            .remove(&index)
            .map(|t| t.elapsed().as_millis())
            .unwrap_or(0);

        self.errors.fetch_add(1, Ordering::SeqCst);

        // Truncate very long error messages to keep output tidy.
        let msg = if error.len() > 80 {
            let cut = error
                .char_indices()
                .take_while(|(i, _)| *i < 79)
                .last()
                .map(|(i, c)| i + c.len_utf8())
                .unwrap_or(0);
            format!("{}\u{2026}", &error[..cut])
        } else {
            error.to_string()
        };

        self.bar.println(format!(
            "  {} {:<24}  {}  {}",
            red("✗"),
            label,
            red(&msg),
            dim(&format!("{:.1}s", elapsed_ms as f64 / 1000.0)),
        ));
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, total: usize, graded: usize) {
        let failed = total.saturating_sub(graded);
        let estimated = self.estimated.load(Ordering::SeqCst);
        self.bar.finish_and_clear();

        if failed == 0 {
            eprintln!(
                "{} {} submissions graded",
                green("✔"),
                bold(&graded.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} submissions graded  ({} failed)",
                if failed == total { red("✘") } else { cyan("⚠") },
                bold(&graded.to_string()),
                total,
                red(&failed.to_string()),
            );
        }
        if estimated > 0 {
            eprintln!(
                "  {} {} graded by length estimate — review before publishing",
                cyan("~"),
                bold(&estimated.to_string()),
            );
        }
    }
}

/// Render a point value without a trailing `.0`.
fn fmt_points(v: f64) -> String {
    if (v - v.round()).abs() < f64::EPSILON {
        format!("{}", v.round() as i64)
    } else {
        format!("{v:.1}")
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Grade one submission against the default 100-point rubric
  scriptmark alice.pdf --title "History Final"

  # Grade a whole class, four scripts at a time
  scriptmark submissions/*.pdf --title "History Final" -c 4

  # French-style 20-point rubric
  scriptmark --rubric out-of-20 copie.pdf --title "Bac blanc"

  # Include the teacher's correction template in the prompt
  scriptmark --template corrige.txt exam1.pdf --title "Physics Midterm"

  # Structured JSON report for downstream tooling
  scriptmark --json submissions/*.pdf --title "History Final" > grades.json

  # Generate a correction template from the exam subject, then exit
  scriptmark --make-template subject.txt --title "Physics Midterm" -o corrige.txt

  # Point at a remote Ollama host
  scriptmark --endpoint http://gpu-box:11434/api --model deepseek-r1:32b exam.pdf

SUPPORTED MODELS:
  Any endpoint speaking the Ollama /api/generate contract works.
  Model              VRAM     Notes
  ─────────────────  ───────  ────────────────────────────────────────
  deepseek-r1:8b     ~6 GB    default — reasons step by step
  deepseek-r1:32b    ~20 GB   stronger on long essays, slower
  llama3.1:8b        ~6 GB    faster, thinner justifications
  qwen2.5:14b        ~10 GB   good multilingual grading

ENVIRONMENT VARIABLES:
  SCRIPTMARK_ENDPOINT     Model endpoint base URL
  SCRIPTMARK_MODEL        Model ID
  SCRIPTMARK_TITLE        Exam title
  SCRIPTMARK_CONCURRENCY  Concurrent submissions
  SCRIPTMARK_ATTEMPTS     Model call attempts per submission
  SCRIPTMARK_TIMEOUT      First-attempt timeout in seconds

SETUP:
  1. Install Ollama:   https://ollama.com
  2. Pull a model:     ollama pull deepseek-r1:8b
  3. Grade:            scriptmark exam.pdf --title "History Final"

  Submissions may be PDF files or plain UTF-8 text. Grades produced by the
  length estimate (endpoint down, response unusable) are marked `estimated`
  and should be reviewed by a teacher.
"#;

/// Grade exam submissions with a local LLM.
#[derive(Parser, Debug)]
#[command(
    name = "scriptmark",
    version,
    about = "Grade exam submissions (PDF or text) against a rubric using a local LLM",
    long_about = "Grade exam submissions against a weighted rubric using any endpoint that \
speaks the Ollama /api/generate contract. Every grade is bounded by the rubric total and \
comes with per-criterion justifications; when the model is unavailable the tool falls back \
to a conservative length-based estimate flagged for teacher review.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Submission files to grade (PDF or UTF-8 text).
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Exam title, shown to the model for context.
    #[arg(short, long, env = "SCRIPTMARK_TITLE", default_value = "Exam")]
    title: String,

    /// Write the report to this file instead of stdout.
    #[arg(short, long, env = "SCRIPTMARK_OUTPUT")]
    output: Option<PathBuf>,

    /// Model endpoint base URL.
    #[arg(long, env = "SCRIPTMARK_ENDPOINT", default_value = DEFAULT_BASE_URL)]
    endpoint: String,

    /// Model ID (e.g. deepseek-r1:8b, llama3.1:8b).
    #[arg(long, env = "SCRIPTMARK_MODEL", default_value = DEFAULT_MODEL)]
    model: String,

    /// Rubric preset.
    #[arg(long, env = "SCRIPTMARK_RUBRIC", value_enum, default_value = "out-of-100")]
    rubric: RubricArg,

    /// Path to a correction template text file, included in the prompt.
    #[arg(long, env = "SCRIPTMARK_TEMPLATE")]
    template: Option<PathBuf>,

    /// Generate a correction template from the exam subject file, then exit.
    #[arg(long)]
    make_template: bool,

    /// Number of submissions graded concurrently.
    #[arg(short, long, env = "SCRIPTMARK_CONCURRENCY", default_value_t = 4)]
    concurrency: usize,

    /// Model call attempts per submission before falling back.
    #[arg(long, env = "SCRIPTMARK_ATTEMPTS", default_value_t = 3,
          value_parser = clap::value_parser!(u32).range(1..))]
    attempts: u32,

    /// First-attempt timeout in seconds (grows on timeout retries).
    #[arg(long, env = "SCRIPTMARK_TIMEOUT", default_value_t = 60)]
    timeout: u64,

    /// Sampling temperature (0.0–2.0).
    #[arg(long, env = "SCRIPTMARK_TEMPERATURE", default_value_t = 0.2)]
    temperature: f32,

    /// Max model output tokens.
    #[arg(long, env = "SCRIPTMARK_MAX_TOKENS", default_value_t = 1024)]
    max_tokens: u32,

    /// Output a structured JSON report instead of text.
    #[arg(long, env = "SCRIPTMARK_JSON")]
    json: bool,

    /// Disable the progress bar.
    #[arg(long, env = "SCRIPTMARK_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "SCRIPTMARK_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors and the report.
    #[arg(short, long, env = "SCRIPTMARK_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Debug)]
enum RubricArg {
    OutOf100,
    OutOf20,
}

impl From<RubricArg> for Rubric {
    fn from(v: RubricArg) -> Self {
        match v {
            RubricArg::OutOf100 => Rubric::out_of_100(),
            RubricArg::OutOf20 => Rubric::out_of_20(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs when the progress bar is active;
    // the bar provides all the feedback that matters to the user.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && !cli.make_template;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let config = build_config(&cli).await?;
    let total_points = config.rubric.total();
    let grader = Grader::new(config).context("Invalid configuration")?;

    // ── Template-generation mode ─────────────────────────────────────────
    if cli.make_template {
        if cli.inputs.len() != 1 {
            anyhow::bail!(
                "--make-template expects exactly one input (the exam subject file), got {}",
                cli.inputs.len()
            );
        }
        let subject_path = &cli.inputs[0];
        let subject = tokio::fs::read_to_string(subject_path)
            .await
            .with_context(|| format!("Failed to read exam subject from {subject_path:?}"))?;

        let template = grader
            .correction_template(&subject, &cli.title)
            .await
            .context("Template generation failed")?;

        write_report(&cli.output, &template)?;
        if !cli.quiet && cli.output.is_some() {
            eprintln!(
                "{} correction template written to {}",
                green("✔"),
                bold(&cli.output.as_ref().map(|p| p.display().to_string()).unwrap_or_default()),
            );
        }
        return Ok(());
    }

    // ── Read submissions ─────────────────────────────────────────────────
    let mut submissions = Vec::with_capacity(cli.inputs.len());
    for path in &cli.inputs {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read submission {path:?}"))?;
        let label = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        submissions.push(Submission::new(label, bytes));
    }

    let progress_cb: Option<ProgressCallback> = if show_progress {
        let cb = CliProgressCallback::new_dynamic(total_points);
        Some(cb as Arc<dyn GradingProgressCallback>)
    } else {
        None
    };

    // ── Grade ────────────────────────────────────────────────────────────
    let labels: Vec<String> = submissions.iter().map(|s| s.label.clone()).collect();
    let started = Instant::now();
    let results = grader
        .grade_batch(submissions, &cli.title, cli.concurrency, progress_cb)
        .await;
    let elapsed_ms = started.elapsed().as_millis();

    // ── Report ───────────────────────────────────────────────────────────
    let report = if cli.json {
        render_json_report(&labels, &results)?
    } else {
        render_text_report(&labels, &results, total_points)
    };
    write_report(&cli.output, &report)?;

    if !cli.quiet && !show_progress && !cli.json {
        let graded = results.iter().filter(|r| r.is_ok()).count();
        eprintln!(
            "Graded {}/{} submissions in {}ms",
            graded,
            results.len(),
            elapsed_ms
        );
    }

    Ok(())
}

/// Map CLI args to `GradingConfig`.
async fn build_config(cli: &Cli) -> Result<GradingConfig> {
    let mut builder = GradingConfig::builder()
        .base_url(&cli.endpoint)
        .model(&cli.model)
        .rubric(cli.rubric.clone().into())
        .max_attempts(cli.attempts)
        .request_timeout_ms(cli.timeout.saturating_mul(1000))
        .temperature(cli.temperature)
        .max_tokens(cli.max_tokens);

    if let Some(ref path) = cli.template {
        let template = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read correction template from {path:?}"))?;
        builder = builder.correction_template(template);
    }

    builder.build().context("Invalid configuration")
}

/// Human-readable per-submission report.
fn render_text_report(
    labels: &[String],
    results: &[std::result::Result<scriptmark::GradingResult, scriptmark::GradeError>],
    total_points: f64,
) -> String {
    let mut out = String::new();
    for (label, result) in labels.iter().zip(results) {
        out.push_str(&format!("{label}\n"));
        match result {
            Ok(r) => {
                out.push_str(&format!(
                    "  Grade: {} / {}{}\n",
                    fmt_points(r.grade),
                    fmt_points(total_points),
                    if r.is_fallback() {
                        "   (estimated from length — review required)"
                    } else {
                        ""
                    },
                ));
                for line in r.feedback.lines() {
                    out.push_str(&format!("  {line}\n"));
                }
            }
            Err(e) => {
                out.push_str(&format!("  Error: {e}\n"));
            }
        }
        out.push('\n');
    }
    out
}

/// Structured JSON report: one entry per submission, in input order.
fn render_json_report(
    labels: &[String],
    results: &[std::result::Result<scriptmark::GradingResult, scriptmark::GradeError>],
) -> Result<String> {
    let entries: Vec<serde_json::Value> = labels
        .iter()
        .zip(results)
        .map(|(label, result)| match result {
            Ok(r) => {
                // The justification is stored pre-serialised; re-parse it so
                // the report embeds an object, not an escaped string.
                let justification: serde_json::Value = serde_json::from_str(&r.justification)
                    .unwrap_or_else(|_| serde_json::Value::String(r.justification.clone()));
                serde_json::json!({
                    "file": label,
                    "grade": r.grade,
                    "origin": r.origin,
                    "feedback": r.feedback,
                    "justification": justification,
                    "stats": r.stats,
                })
            }
            Err(e) => serde_json::json!({
                "file": label,
                "error": e.to_string(),
            }),
        })
        .collect();

    serde_json::to_string_pretty(&entries).context("Failed to serialise report")
}

/// Write to `-o FILE` if given, stdout otherwise.
fn write_report(output: &Option<PathBuf>, report: &str) -> Result<()> {
    match output {
        Some(path) => {
            std::fs::write(path, report.as_bytes())
                .with_context(|| format!("Failed to write report to {path:?}"))?;
        }
        None => {
            let stdout = io::stdout();
            let mut handle = stdout.lock();
            handle
                .write_all(report.as_bytes())
                .context("Failed to write to stdout")?;
            // Ensure a trailing newline on stdout.
            if !report.ends_with('\n') {
                handle.write_all(b"\n").ok();
            }
        }
    }
    Ok(())
}
