use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::builder::RangedU64ValueParser;
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use dossier_core::{DossierConfig, OutputFormat, RetrievedChunk};
use dossier_index::builder::{
    build_index_for_project, read_chunks, BuildReport, CHUNKS_FILE, INDEX_FILE,
};
use dossier_index::embedding::{embedder_from_config, Embedder};
use dossier_index::flat::FlatIndex;
use dossier_retrieve::context::build_context;
use dossier_retrieve::retriever::Retriever;
use dossier_retrieve::router::{ProjectRouter, RouteScore};
use miette::{IntoDiagnostic, Result};
use tracing_subscriber::EnvFilter;

const CONFIG_FILE: &str = ".dossier.toml";

#[derive(Parser)]
#[command(
    name = "dossier",
    version,
    about = "Grounded retrieval over a portfolio of project documentation",
    long_about = "Dossier indexes the documentation and source of several projects and retrieves\n\
                   citation-ready context for questions about them.\n\n\
                   Each project gets its own vector index. Queries are routed to the projects\n\
                   whose descriptions match best, and the merged results are rendered as\n\
                   numbered context blocks for an answer generator.\n\n\
                   Examples:\n  \
                     dossier init                          Create a .dossier.toml config file\n  \
                     dossier build                         Build every project index\n  \
                     dossier search 'how was OCR done?'    Routed multi-project search\n  \
                     dossier search 'setup' --project ocr  Search a single project\n  \
                     dossier route 'text classification'   Show which projects a query hits\n  \
                     dossier doctor                        Check setup and indexes"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to configuration file (default: .dossier.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(
        long,
        global = true,
        default_value = "text",
        long_help = "Output format for command results.\n\n\
                       Formats:\n  \
                         text      Human-readable summaries and context blocks (default)\n  \
                         json      Machine-readable JSON\n  \
                         markdown  GitHub-flavored Markdown"
    )]
    format: OutputFormat,

    /// Enable verbose output (debug logging)
    #[arg(long, short, global = true)]
    verbose: bool,

    /// When to use colors
    #[arg(long, global = true, default_value = "auto")]
    color: ColorChoice,
}

#[derive(Subcommand)]
enum Command {
    /// Create a default .dossier.toml configuration file
    #[command(long_about = "Create a default .dossier.toml configuration file.\n\n\
        Generates a commented template with every section and its defaults.\n\
        Fails if .dossier.toml already exists.")]
    Init,
    /// Build project indexes
    #[command(long_about = "Build project indexes.\n\n\
        Chunks each project's documents, source functions and folder layout,\n\
        embeds the chunks and writes chunks.json and vectors.db into the project's\n\
        index_dir. A missing project root produces an empty index.\n\n\
        Examples:\n  dossier build\n  dossier build --project ocr_pipeline_project")]
    Build {
        /// Build only this project
        #[arg(long)]
        project: Option<String>,
    },
    /// Retrieve context for a question
    #[command(long_about = "Retrieve context for a question.\n\n\
        Without --project the query is routed to the best-matching projects and\n\
        their results are merged. With --project a single index is searched.\n\n\
        Examples:\n  dossier search 'which model detects receipts?'\n  dossier search 'training loop' --project ml_category_classifier --top-k 8")]
    Search {
        /// Natural language query
        query: String,

        /// Search a single project instead of routing
        #[arg(long)]
        project: Option<String>,

        /// Results per project (overrides retrieval.top_k, or
        /// retrieval.per_project_top_k when routing)
        #[arg(long, value_parser = RangedU64ValueParser::<usize>::new().range(1..))]
        top_k: Option<usize>,
    },
    /// Show which projects a query is routed to
    #[command(long_about = "Show which projects a query is routed to.\n\n\
        Scores each project's routing descriptor against the query by cosine\n\
        similarity and prints the selected projects, best first.\n\n\
        Example:\n  dossier route 'spaced repetition flashcards' --count 2")]
    Route {
        /// Natural language query
        query: String,

        /// Number of projects to select (default: retrieval.select_count)
        #[arg(long, value_parser = RangedU64ValueParser::<usize>::new().range(1..))]
        count: Option<usize>,
    },
    /// Check your Dossier setup and indexes
    #[command(long_about = "Check your Dossier setup and indexes.\n\n\
        Runs diagnostics for the config file, embedding provider and credentials,\n\
        and each project's root and index. Use --format json for machine-readable\n\
        output.")]
    Doctor,
    /// Generate shell completion scripts
    #[command(hide = true)]
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[derive(Clone, PartialEq, Eq, ValueEnum)]
enum ColorChoice {
    /// Auto-detect based on terminal
    Auto,
    /// Always use colors
    Always,
    /// Never use colors
    Never,
}

fn print_welcome(use_color: bool) {
    let version = env!("CARGO_PKG_VERSION");

    let commands = [
        ("init", "Create default configuration"),
        ("build", "Build per-project vector indexes"),
        ("search", "Retrieve cited context (routed or single project)"),
        ("route", "Show routing scores for a query"),
        ("doctor", "Check your setup and indexes"),
    ];

    if use_color {
        println!("\x1b[1mdossier\x1b[0m v{version}: grounded retrieval for project portfolios\n");
        println!("Commands:");
        for (name, about) in commands {
            println!("  \x1b[32m{name:<8}\x1b[0m {about}");
        }
    } else {
        println!("dossier v{version}: grounded retrieval for project portfolios\n");
        println!("Commands:");
        for (name, about) in commands {
            println!("  {name:<8} {about}");
        }
    }

    println!("\nRun 'dossier <command> --help' for details.");
}

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "warn,dossier_rag=debug,dossier_core=debug,dossier_ingest=debug,dossier_index=debug,dossier_retrieve=debug"
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Load the config and resolve project paths against its directory.
fn load_config(explicit: Option<&Path>) -> Result<(DossierConfig, Option<PathBuf>)> {
    let path = match explicit {
        Some(path) => Some(path.to_path_buf()),
        None => {
            let default_path = Path::new(CONFIG_FILE);
            default_path.exists().then(|| default_path.to_path_buf())
        }
    };

    let Some(path) = path else {
        return Ok((DossierConfig::default(), None));
    };

    let mut config = DossierConfig::from_file(&path)?;
    tracing::debug!("loaded config from {}", path.display());
    let base = path.parent().unwrap_or_else(|| Path::new(""));
    config.resolve_paths(base);
    Ok((config, Some(path)))
}

fn spinner(message: &str) -> Result<Option<indicatif::ProgressBar>> {
    if !std::io::stderr().is_terminal() {
        return Ok(None);
    }
    let pb = indicatif::ProgressBar::new_spinner();
    pb.set_style(
        indicatif::ProgressStyle::with_template("{spinner:.cyan} {msg} ({elapsed})")
            .into_diagnostic()?,
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(120));
    Ok(Some(pb))
}

fn run_build(
    config: &DossierConfig,
    project: Option<&str>,
    embedder: &dyn Embedder,
    format: OutputFormat,
) -> Result<()> {
    let projects: Vec<_> = match project {
        Some(id) => match config.project(id) {
            Some(p) => vec![p],
            None => miette::bail!(
                help = "run 'dossier doctor' to list configured projects",
                "unknown project '{id}'"
            ),
        },
        None => config.projects.iter().collect(),
    };
    if projects.is_empty() {
        miette::bail!(
            help = "add [[projects]] entries to .dossier.toml",
            "no projects configured"
        );
    }

    let mut reports: Vec<BuildReport> = Vec::with_capacity(projects.len());
    for p in projects {
        let pb = spinner(&format!("Building {}...", p.label()))?;
        let result =
            build_index_for_project(&p.id, &p.root, &p.index_dir, embedder, &config.ingest);
        if let Some(pb) = &pb {
            match &result {
                Ok(r) => pb.finish_with_message(format!("{}: {} chunks", p.label(), r.chunks)),
                Err(_) => pb.finish_with_message(format!("{}: failed", p.label())),
            }
        }
        reports.push(result?);
    }

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&reports).into_diagnostic()?);
        }
        OutputFormat::Markdown => {
            println!("| Project | Files | Skipped | Chunks | Dimensions | Index |");
            println!("|---|---|---|---|---|---|");
            for r in &reports {
                println!(
                    "| {} | {} | {} | {} | {} | `{}` |",
                    r.project,
                    r.files_scanned,
                    r.files_skipped,
                    r.chunks,
                    r.dimensions,
                    r.index_path.display()
                );
            }
        }
        OutputFormat::Text => {
            for r in &reports {
                println!(
                    "{}: {} chunks from {} files ({} skipped), {} dims -> {}",
                    r.project,
                    r.chunks,
                    r.files_scanned,
                    r.files_skipped,
                    r.dimensions,
                    r.index_path
                        .parent()
                        .unwrap_or(r.index_path.as_path())
                        .display()
                );
            }
        }
    }
    Ok(())
}

fn print_results(results: &[RetrievedChunk], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(results).into_diagnostic()?);
        }
        OutputFormat::Markdown => {
            if results.is_empty() {
                println!("_{}_", dossier_retrieve::context::NO_CONTEXT);
            }
            for (i, r) in results.iter().enumerate() {
                println!("### [{}] {} / `{}`\n", i + 1, r.project, r.chunk.source);
                if let Some(section) = &r.chunk.section_title {
                    println!("**Section:** {section}\n");
                }
                println!("```\n{}\n```\n", r.chunk.text);
            }
        }
        OutputFormat::Text => {
            println!("{}", build_context(results));
        }
    }
    Ok(())
}

fn open_router(config: &DossierConfig, embedder: Arc<dyn Embedder>) -> Result<ProjectRouter> {
    let load = ProjectRouter::from_config(config, embedder)?;
    if load.router.project_ids().is_empty() {
        if load.skipped.is_empty() {
            miette::bail!(
                help = "add [[projects]] entries to .dossier.toml",
                "no projects configured"
            );
        }
        miette::bail!(
            help = "run 'dossier build' first",
            "no project index could be loaded ({} skipped)",
            load.skipped.len()
        );
    }
    Ok(load.router)
}

fn print_routes(config: &DossierConfig, scores: &[RouteScore], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(scores).into_diagnostic()?);
        }
        OutputFormat::Markdown => {
            println!("| Rank | Project | Score |");
            println!("|---|---|---|");
            for (i, s) in scores.iter().enumerate() {
                println!("| {} | {} | {:.4} |", i + 1, label(config, &s.project), s.score);
            }
        }
        OutputFormat::Text => {
            for (i, s) in scores.iter().enumerate() {
                println!("{:>2}. {:<32} {:.4}", i + 1, label(config, &s.project), s.score);
            }
        }
    }
    Ok(())
}

fn label<'a>(config: &'a DossierConfig, id: &'a str) -> &'a str {
    config.project(id).map_or(id, |p| p.label())
}

#[derive(serde::Serialize)]
struct CheckResult {
    name: String,
    status: &'static str,
    detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    hint: Option<String>,
}

impl CheckResult {
    fn pass(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: "pass",
            detail: detail.into(),
            hint: None,
        }
    }

    fn fail(name: impl Into<String>, detail: impl Into<String>, hint: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: "fail",
            detail: detail.into(),
            hint: Some(hint.into()),
        }
    }

    fn info(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: "info",
            detail: detail.into(),
            hint: None,
        }
    }

    fn symbol(&self) -> &'static str {
        match self.status {
            "pass" => "\u{2713}",
            "fail" => "\u{2717}",
            _ => "~",
        }
    }

    fn colored_symbol(&self) -> String {
        match self.status {
            "pass" => "\x1b[32m\u{2713}\x1b[0m".into(),
            "fail" => "\x1b[31m\u{2717}\x1b[0m".into(),
            _ => "\x1b[33m~\x1b[0m".into(),
        }
    }
}

fn run_doctor(
    config: &DossierConfig,
    config_path: Option<&Path>,
    format: OutputFormat,
    use_color: bool,
) -> Result<()> {
    let mut checks: Vec<CheckResult> = Vec::new();

    // 1. Config file
    match config_path {
        Some(path) => checks.push(CheckResult::pass(
            "config_file",
            format!("{} ({} projects)", path.display(), config.projects.len()),
        )),
        None => checks.push(CheckResult::fail(
            "config_file",
            format!("{CONFIG_FILE} not found"),
            "run 'dossier init' to create a default config",
        )),
    }

    // 2. Embedding provider + credentials
    let embedding = &config.embedding;
    match embedder_from_config(embedding) {
        Ok(embedder) => checks.push(CheckResult::pass(
            "embedding",
            format!(
                "{} (model: {}, {} dims)",
                embedding.provider,
                embedder.model_id(),
                embedder.dimensions()
            ),
        )),
        Err(e) => checks.push(CheckResult::fail(
            "embedding",
            e.to_string(),
            "set embedding.api_key or VOYAGE_API_KEY, or use provider = \"hashing\"",
        )),
    }

    // 3. Each project's root and index
    if config.projects.is_empty() {
        checks.push(CheckResult::info("projects", "no projects configured"));
    }
    for project in &config.projects {
        let root_check = format!("{}_root", project.id);
        if project.root.is_dir() {
            checks.push(CheckResult::pass(root_check, project.root.display().to_string()));
        } else {
            checks.push(CheckResult::info(
                root_check,
                format!("{} missing, index will be empty", project.root.display()),
            ));
        }

        let index_check = format!("{}_index", project.id);
        let chunks = read_chunks(&project.index_dir.join(CHUNKS_FILE));
        let index = FlatIndex::read(&project.index_dir.join(INDEX_FILE));
        match (chunks, index) {
            (Ok(chunks), Ok(index)) if chunks.len() == index.len() => {
                let mut detail = format!("{} chunks, {} dims", chunks.len(), index.dimensions());
                if index.model_id() != embedding.model {
                    detail.push_str(&format!(", built with '{}'", index.model_id()));
                }
                checks.push(CheckResult::pass(index_check, detail));
            }
            (Ok(chunks), Ok(index)) => checks.push(CheckResult::fail(
                index_check,
                format!("{} chunks but {} vectors", chunks.len(), index.len()),
                format!("run 'dossier build --project {}'", project.id),
            )),
            (Err(e), _) | (_, Err(e)) => checks.push(CheckResult::fail(
                index_check,
                e.to_string(),
                format!("run 'dossier build --project {}'", project.id),
            )),
        }
    }

    // Output
    match format {
        OutputFormat::Json => {
            let version = env!("CARGO_PKG_VERSION");
            let json = serde_json::json!({
                "version": version,
                "checks": checks,
            });
            println!("{}", serde_json::to_string_pretty(&json).into_diagnostic()?);
        }
        _ => {
            let version = env!("CARGO_PKG_VERSION");
            println!("Dossier v{version}: environment check\n");

            for check in &checks {
                let sym = if use_color {
                    check.colored_symbol()
                } else {
                    check.symbol().to_string()
                };
                let label = check.name.replace('_', " ");
                println!("  {sym} {label:<28} {}", check.detail);
                if let Some(hint) = &check.hint {
                    println!("    hint: {hint}");
                }
            }

            let passed = checks.iter().filter(|c| c.status == "pass").count();
            let failed = checks.iter().filter(|c| c.status == "fail").count();
            let info = checks.iter().filter(|c| c.status == "info").count();
            println!("\n{passed} checks passed, {failed} failed, {info} info");
        }
    }

    Ok(())
}

const DEFAULT_CONFIG: &str = r#"# Dossier Configuration
# Paths are relative to this file.

[embedding]
# provider = "hashing"        # "hashing" (local, deterministic) or "voyage"
# model = "hashing-v1"
# dimensions = 384            # voyage: 256, 512, 1024 or 2048
# api_key = "..."             # voyage only; falls back to VOYAGE_API_KEY
# base_url = "https://api.voyageai.com/v1"

[ingest]
# include_extensions = ["md", "py"]
# exclude_dirs = [".venv", "__pycache__", "data", "models", "outputs", ".git", ".idea"]
# folder_tree = true
# folder_tree_depth = 4
# respect_gitignore = true

[retrieval]
# top_k = 5                   # single-project results
# per_project_top_k = 3       # results per routed project
# select_count = 3            # projects selected by routing
# max_chunks = 10             # cap on merged results

# One entry per indexed project. Every project needs a [routing] descriptor.
# [[projects]]
# id = "ocr_pipeline_project"
# display_name = "OCR Pipeline"
# root = "projects/ocr_pipeline_project"
# index_dir = "indexes/ocr_pipeline"

[routing]
# ocr_pipeline_project = "OCR, YOLO, EasyOCR, document understanding, PDF processing"
"#;

fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .build(),
        )
    }))
    .into_diagnostic()?;
    human_panic::setup_panic!();

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let use_color = match cli.color {
        ColorChoice::Always => true,
        ColorChoice::Never => false,
        ColorChoice::Auto => std::io::stdout().is_terminal() && std::env::var("NO_COLOR").is_err(),
    };

    match cli.command {
        None => {
            print_welcome(use_color);
        }
        Some(Command::Init) => {
            let path = Path::new(CONFIG_FILE);
            if path.exists() {
                miette::bail!("{CONFIG_FILE} already exists");
            }
            std::fs::write(path, DEFAULT_CONFIG).into_diagnostic()?;
            println!("Created {CONFIG_FILE} with default configuration");
        }
        Some(Command::Build { ref project }) => {
            let (config, _) = load_config(cli.config.as_deref())?;
            let embedder = embedder_from_config(&config.embedding)?;
            run_build(&config, project.as_deref(), embedder.as_ref(), cli.format)?;
        }
        Some(Command::Search {
            ref query,
            ref project,
            top_k,
        }) => {
            let (config, _) = load_config(cli.config.as_deref())?;
            let embedder = embedder_from_config(&config.embedding)?;
            let mut settings = config.retrieval;

            let results = match project {
                Some(id) => {
                    let Some(p) = config.project(id) else {
                        miette::bail!(
                            help = "run 'dossier doctor' to list configured projects",
                            "unknown project '{id}'"
                        );
                    };
                    if let Some(k) = top_k {
                        settings.top_k = k;
                    }
                    let retriever = Retriever::open(p.id.as_str(), &p.index_dir, embedder)?;
                    ProjectRouter::retrieve_single(&retriever, query, &settings)?
                }
                None => {
                    if let Some(k) = top_k {
                        settings.per_project_top_k = k;
                    }
                    let router = open_router(&config, embedder)?;
                    router.retrieve(query, &settings)?
                }
            };
            print_results(&results, cli.format)?;
        }
        Some(Command::Route { ref query, count }) => {
            let (config, _) = load_config(cli.config.as_deref())?;
            let embedder = embedder_from_config(&config.embedding)?;
            let router = open_router(&config, embedder)?;
            let scores = router.route(query, count.unwrap_or(config.retrieval.select_count))?;
            print_routes(&config, &scores, cli.format)?;
        }
        Some(Command::Doctor) => {
            let (config, path) = load_config(cli.config.as_deref())?;
            run_doctor(&config, path.as_deref(), cli.format, use_color)?;
        }
        Some(Command::Completions { shell }) => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "dossier", &mut std::io::stdout());
        }
    }

    Ok(())
}
