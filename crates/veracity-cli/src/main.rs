use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::Read;
use std::path::PathBuf;
use std::process::ExitCode;
use veracity_core::{parse_response, Error, Highlighter, VerdictEnvelope};
use veracity_local::gemini::{self, GeminiBackend, GeminiConfig};
use veracity_local::{
    annotate_page, check_page, http_client, render_text, ArticleLocator, CheckOptions, Page,
    PageFetcher, PromptBuilder,
};

#[derive(Parser, Debug)]
#[command(name = "veracity")]
#[command(
    about = "Fact-check a news article with Gemini and highlight the flagged quotes",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Locate the article on a page, ask the model for a verdict, print it.
    Check(CheckCmd),
    /// Parse a raw model reply (file or stdin) into a verdict.
    Parse(ParseCmd),
    /// Apply a saved verdict to a saved page and write the annotated HTML.
    Highlight(HighlightCmd),
    /// Print configuration presence and self-checks (json).
    Doctor(DoctorCmd),
    /// Print version information (json).
    Version(VersionCmd),
}

#[derive(clap::Args, Debug)]
struct CheckCmd {
    /// Page to fetch.
    #[arg(long, conflicts_with = "file", required_unless_present = "file")]
    url: Option<String>,
    /// Saved HTML page to read instead of fetching.
    #[arg(long)]
    file: Option<PathBuf>,
    /// Write the page with highlights and the results panel here.
    #[arg(long)]
    html_out: Option<PathBuf>,
    /// Comma-separated model names, tried in order.
    #[arg(long, env = "VERACITY_GEMINI_MODELS")]
    models: Option<String>,
    /// Per-model request timeout (ms); overrides VERACITY_GEMINI_TIMEOUT_MS.
    #[arg(long)]
    timeout_ms: Option<u64>,
    /// Date line included in the prompt.
    #[arg(long, env = "VERACITY_TODAY")]
    today: Option<String>,
    /// Cap on fetched page size.
    #[arg(long, default_value_t = veracity_local::DEFAULT_MAX_PAGE_BYTES)]
    max_bytes: usize,
    /// Output format: json|text
    #[arg(long = "output", alias = "format", default_value = "json")]
    output: String,
}

#[derive(clap::Args, Debug)]
struct ParseCmd {
    /// Reply text to parse; stdin when omitted.
    #[arg(long)]
    file: Option<PathBuf>,
    /// Output format: json|text
    #[arg(long = "output", alias = "format", default_value = "json")]
    output: String,
}

#[derive(clap::Args, Debug)]
struct HighlightCmd {
    /// Saved HTML page.
    #[arg(long)]
    html: PathBuf,
    /// Verdict JSON (as printed by `check`/`parse`) or a raw model reply.
    #[arg(long)]
    verdict: PathBuf,
    /// Where to write the annotated page; stdout when omitted.
    #[arg(long)]
    out: Option<PathBuf>,
}

#[derive(clap::Args, Debug)]
struct DoctorCmd {
    /// Output format: json|text
    #[arg(long = "output", alias = "format", default_value = "json")]
    output: String,
}

#[derive(clap::Args, Debug)]
struct VersionCmd {
    /// Output format: json|text
    #[arg(long = "output", alias = "format", default_value = "json")]
    output: String,
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    // stdout carries the JSON payloads; logs go to stderr.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .try_init();
}

/// Opt-in KEY=VALUE file (`VERACITY_ENV_FILE`). Never overrides the process env and
/// never logs values.
fn load_env_file() {
    let Ok(p) = std::env::var("VERACITY_ENV_FILE") else {
        return;
    };
    let p = p.trim();
    if p.is_empty() {
        return;
    }
    let Ok(txt) = std::fs::read_to_string(p) else {
        return;
    };
    for raw in txt.lines() {
        let s = raw.trim();
        if s.is_empty() || s.starts_with('#') {
            continue;
        }
        let s = s.strip_prefix("export ").unwrap_or(s);
        let Some((k, v)) = s.split_once('=') else {
            continue;
        };
        let k = k.trim();
        let v = v.trim().trim_matches('"');
        if k.is_empty() {
            continue;
        }
        if std::env::var_os(k).is_none() {
            std::env::set_var(k, v);
        }
    }
}

fn read_input(file: Option<&PathBuf>) -> Result<String> {
    match file {
        Some(p) => std::fs::read_to_string(p).with_context(|| format!("read {}", p.display())),
        None => {
            let mut s = String::new();
            std::io::stdin()
                .read_to_string(&mut s)
                .context("read stdin")?;
            Ok(s)
        }
    }
}

fn print_envelope(env: &VerdictEnvelope, output: &str) -> Result<()> {
    match output.to_ascii_lowercase().as_str() {
        "text" => print!("{}", render_text(env)),
        _ => println!("{}", serde_json::to_string(env)?),
    }
    Ok(())
}

fn exit_for(env: &VerdictEnvelope) -> ExitCode {
    if env.ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

async fn run_check(args: CheckCmd) -> Result<ExitCode> {
    let client = http_client()?;

    let html = match (&args.url, &args.file) {
        (_, Some(p)) => std::fs::read_to_string(p).with_context(|| format!("read {}", p.display()))?,
        (Some(url), None) => {
            let fetcher = PageFetcher::new(client.clone()).with_max_bytes(args.max_bytes);
            match fetcher.fetch(url).await {
                Ok(page) => page.html,
                Err(e) => {
                    let env = VerdictEnvelope::failure(&e);
                    print_envelope(&env, &args.output)?;
                    return Ok(exit_for(&env));
                }
            }
        }
        (None, None) => anyhow::bail!("one of --url or --file is required"),
    };

    let backend = match GeminiConfig::from_env() {
        Ok(mut cfg) => {
            if let Some(models) = args.models.as_deref() {
                let models = gemini::parse_model_list(models);
                if !models.is_empty() {
                    cfg.models = models;
                }
            }
            if let Some(ms) = args.timeout_ms {
                cfg.timeout_ms = gemini::clamp_timeout_ms(ms);
            }
            Some(GeminiBackend::new(client, cfg))
        }
        Err(Error::MissingCredential) => None,
        Err(e) => return Err(e.into()),
    };

    let mut prompt = PromptBuilder::default();
    if let Some(today) = args.today.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        prompt = prompt.with_today(today);
    }
    let opts = CheckOptions {
        prompt,
        ..CheckOptions::default()
    };
    let models = backend
        .as_ref()
        .map(|b| b.models().to_vec())
        .unwrap_or_default();

    let mut page = Page::parse(&html);
    let report = check_page(&mut page, backend.as_ref(), &models, &opts).await;

    if let Some(out) = &args.html_out {
        std::fs::write(out, page.to_html()).with_context(|| format!("write {}", out.display()))?;
    }
    match args.output.to_ascii_lowercase().as_str() {
        "text" => print!("{}", render_text(&report.envelope)),
        _ => println!("{}", serde_json::to_string(&report)?),
    }
    Ok(exit_for(&report.envelope))
}

fn run_parse(args: ParseCmd) -> Result<ExitCode> {
    let text = read_input(args.file.as_ref())?;
    let env = VerdictEnvelope::from(parse_response(&text));
    print_envelope(&env, &args.output)?;
    // Parsing itself succeeded; an unscored reply is reported in the payload.
    Ok(ExitCode::SUCCESS)
}

fn run_highlight(args: HighlightCmd) -> Result<ExitCode> {
    let html = std::fs::read_to_string(&args.html)
        .with_context(|| format!("read {}", args.html.display()))?;
    let raw = std::fs::read_to_string(&args.verdict)
        .with_context(|| format!("read {}", args.verdict.display()))?;
    let env = match serde_json::from_str::<VerdictEnvelope>(&raw) {
        Ok(env) => env,
        Err(_) => VerdictEnvelope::from(parse_response(&raw)),
    };

    let mut page = Page::parse(&html);
    let report = annotate_page(
        &mut page,
        &env,
        &ArticleLocator::default(),
        &Highlighter::default(),
    );
    match &args.out {
        Some(out) => {
            std::fs::write(out, page.to_html())
                .with_context(|| format!("write {}", out.display()))?;
            println!("{}", serde_json::to_string(&report)?);
        }
        None => print!("{}", page.to_html()),
    }
    Ok(ExitCode::SUCCESS)
}

fn run_doctor(args: DoctorCmd) -> Result<ExitCode> {
    fn has_env(k: &str) -> bool {
        std::env::var(k).ok().is_some_and(|v| !v.trim().is_empty())
    }

    let t0 = std::time::Instant::now();
    // Booleans only for secrets; never print values.
    let key_configured = gemini::gemini_api_key_from_env().is_some();
    let models = gemini::gemini_models_from_env();
    let timeout_ms = gemini::gemini_timeout_ms_from_env();

    let mut checks: Vec<serde_json::Value> = Vec::new();
    checks.push(serde_json::json!({
        "name": "gemini_api_key",
        "ok": key_configured,
        "message": if key_configured { "API key is set" } else { "API key is not set" },
        "hint": if key_configured { "" } else { "Set VERACITY_GEMINI_API_KEY (or GEMINI_API_KEY)." },
    }));
    let client_ok = http_client().is_ok();
    checks.push(serde_json::json!({
        "name": "http_client",
        "ok": client_ok,
        "message": if client_ok { "HTTP client builds" } else { "HTTP client failed to build" },
        "hint": "",
    }));

    let ok = checks.iter().all(|c| c["ok"].as_bool() == Some(true));
    let payload = serde_json::json!({
        "schema_version": 1,
        "kind": "doctor",
        "ok": ok,
        "name": "veracity",
        "version": env!("CARGO_PKG_VERSION"),
        "elapsed_ms": t0.elapsed().as_millis() as u64,
        "configured": {
            "gemini_api_key": key_configured,
            "base_url_overridden": has_env("VERACITY_GEMINI_BASE_URL"),
            "models": models,
            "timeout_ms": timeout_ms,
            "today": has_env("VERACITY_TODAY"),
            "env_file": has_env("VERACITY_ENV_FILE"),
        },
        "checks": checks,
    });

    match args.output.to_ascii_lowercase().as_str() {
        "text" => {
            println!("veracity {}", env!("CARGO_PKG_VERSION"));
            println!("gemini_api_key: {}", if key_configured { "set" } else { "missing" });
            println!("models: {}", models.join(", "));
            for c in &checks {
                let name = c["name"].as_str().unwrap_or("");
                let ok = c["ok"].as_bool().unwrap_or(false);
                println!("- {}: {}", name, if ok { "ok" } else { "fail" });
            }
        }
        _ => println!("{payload}"),
    }
    Ok(ExitCode::SUCCESS)
}

fn run_version(args: VersionCmd) -> ExitCode {
    let v = serde_json::json!({
        "schema_version": 1,
        "kind": "version",
        "ok": true,
        "name": "veracity",
        "version": env!("CARGO_PKG_VERSION"),
    });
    match args.output.to_ascii_lowercase().as_str() {
        "text" => println!("veracity {}", env!("CARGO_PKG_VERSION")),
        _ => println!("{v}"),
    }
    ExitCode::SUCCESS
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    load_env_file();
    init_tracing();

    let cli = Cli::parse();
    match cli.command {
        Commands::Check(args) => run_check(args).await,
        Commands::Parse(args) => run_parse(args),
        Commands::Highlight(args) => run_highlight(args),
        Commands::Doctor(args) => run_doctor(args),
        Commands::Version(args) => Ok(run_version(args)),
    }
}
