use anyhow::{bail, Context, Result};
use clap::{Parser as ClapParser, Subcommand};
use form_engine::assembler::assemble;
use form_engine::validation::{BackendIssue, ExpressionValidationConfig};
use form_engine::{
    CollectingSink, DataModel, DataSourceBundle, EngineConfig, FormEngine, LayoutStore, Severity, Snapshot,
};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(ClapParser)]
#[command(name = "form-engine")]
#[command(about = "Builds, resolves and validates form layouts")]
struct Cli {
    /// Engine configuration (.json or .toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args)]
struct RunArgs {
    /// Page files in page order; the file stem is the page name
    #[arg(required = true)]
    pages: Vec<PathBuf>,
    /// Data model JSON
    #[arg(long)]
    data: Option<PathBuf>,
    /// Full data source bundle JSON; `--data` replaces its data model
    #[arg(long)]
    sources: Option<PathBuf>,
    /// Expression validation config JSON
    #[arg(long)]
    validations: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the node tree
    Tree {
        #[command(flatten)]
        run: RunArgs,
    },
    /// Print every resolved item as JSON
    Resolve {
        #[command(flatten)]
        run: RunArgs,
    },
    /// Print validation records; exits non-zero when any error remains
    Validate {
        #[command(flatten)]
        run: RunArgs,
        /// Backend issues JSON to ingest after the run
        #[arg(long)]
        backend: Option<PathBuf>,
    },
    /// Check that the pages assemble without claim conflicts
    Check {
        /// Page files in page order
        #[arg(required = true)]
        pages: Vec<PathBuf>,
    },
    /// Run one of the bundled layouts
    Demo {
        /// repeating, nested, claims, conditional, cyclic or survey
        name: String,
    },
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();
    match run(cli) {
        Ok(clean) => {
            if !clean {
                std::process::exit(1);
            }
        }
        Err(error) => {
            eprintln!("Error: {error:#}");
            std::process::exit(2);
        }
    }
}

/// Returns whether the command finished without findings.
fn run(cli: Cli) -> Result<bool> {
    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => EngineConfig::default(),
    };
    let sink = Arc::new(CollectingSink::new());

    let clean = match cli.command {
        Commands::Tree { run } => {
            let (snapshot, _) = execute(&run, config, sink.clone())?;
            print_tree(&snapshot);
            true
        }
        Commands::Resolve { run } => {
            let (snapshot, _) = execute(&run, config, sink.clone())?;
            let items: serde_json::Map<String, Value> = snapshot
                .resolved()
                .items()
                .map(|item| (snapshot.render_path(&item.path), item.item.clone()))
                .collect();
            println!("{}", serde_json::to_string_pretty(&items)?);
            true
        }
        Commands::Validate { run, backend } => {
            let (mut snapshot, engine) = execute(&run, config, sink.clone())?;
            if let Some(path) = backend {
                let issues: Vec<BackendIssue> = read_json(&path)?;
                engine.ingest_backend(&mut snapshot, issues)?;
            }
            print_validations(&snapshot)
        }
        Commands::Check { pages } => {
            let layout = load_layout(&pages)?;
            let structure = assemble(&layout, FormEngine::new(config).registry(), &*sink);
            for error in &structure.errors {
                println!("{error}");
            }
            eprintln!("{} page(s), {} claim error(s)", structure.pages.len(), structure.errors.len());
            structure.errors.is_empty()
        }
        Commands::Demo { name } => demo(&name, config, sink.clone())?,
    };

    let diagnostics = sink.entries();
    for diagnostic in &diagnostics {
        eprintln!("{diagnostic}");
    }
    Ok(clean && diagnostics.is_empty())
}

fn load_config(path: &Path) -> Result<EngineConfig> {
    let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let config = match path.extension().and_then(|extension| extension.to_str()) {
        Some("toml") => EngineConfig::from_toml_str(&text),
        _ => EngineConfig::from_json_str(&text),
    };
    config.with_context(|| format!("loading {}", path.display()))
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

fn load_layout(pages: &[PathBuf]) -> Result<LayoutStore> {
    let mut named = Vec::with_capacity(pages.len());
    for path in pages {
        let Some(name) = path.file_stem().and_then(|stem| stem.to_str()) else {
            bail!("cannot name a page after {}", path.display());
        };
        named.push((name.to_owned(), read_json::<Value>(path)?));
    }
    Ok(LayoutStore::from_json(1, named.iter().map(|(name, value)| (name.as_str(), value)))?)
}

fn execute(run: &RunArgs, config: EngineConfig, sink: Arc<CollectingSink>) -> Result<(Snapshot, FormEngine)> {
    let layout = load_layout(&run.pages)?;
    let mut sources: DataSourceBundle = match &run.sources {
        Some(path) => read_json(path)?,
        None => DataSourceBundle::default(),
    };
    if let Some(path) = &run.data {
        sources.data_model = DataModel::new(read_json(path)?);
    }
    let mut engine = FormEngine::new(config).with_sink(sink);
    if let Some(path) = &run.validations {
        engine = engine.with_expression_validations(ExpressionValidationConfig::from_json(read_json(path)?)?);
    }
    let snapshot = engine.run(&layout, sources, None)?;
    Ok((snapshot, engine))
}

fn print_tree(snapshot: &Snapshot) {
    for node in snapshot.tree().nodes() {
        let depth = node.path.depth();
        let hidden = if snapshot.is_hidden(&node.path) { " (hidden)" } else { "" };
        println!(
            "{:indent$}{} [{}] {}{hidden}",
            "",
            node.id,
            node.component_type(),
            snapshot.render_path(&node.path),
            indent = depth * 2,
        );
    }
}

/// Returns false when an error-severity record remains.
fn print_validations(snapshot: &Snapshot) -> bool {
    let validations = snapshot.validations();
    for (field, records) in validations.fields() {
        for record in records {
            println!("{field}: {:?} {} {:?}", record.severity, record.message.key, record.message.params);
        }
    }
    for (path, records) in validations.components() {
        for record in records {
            println!(
                "{}: {:?} {} {:?}",
                snapshot.render_path(path),
                record.severity,
                record.message.key,
                record.message.params
            );
        }
    }
    eprintln!("{} validation record(s)", validations.len());
    !validations.records().any(|record| record.severity == Severity::Error)
}

fn demo(name: &str, config: EngineConfig, sink: Arc<CollectingSink>) -> Result<bool> {
    let (pages, data, validations) = match name {
        "repeating" => (
            form_fixtures::repeating_group_pages(),
            form_fixtures::items_data(3),
            Some(form_fixtures::repeating_group_validations()),
        ),
        "nested" => (form_fixtures::nested_group_pages(), form_fixtures::nested_data(), None),
        "claims" => (form_fixtures::conflicting_claims_pages(), Value::Object(Default::default()), None),
        "conditional" => (form_fixtures::conditional_pages(), form_fixtures::conditional_data("Kari"), None),
        "cyclic" => (form_fixtures::cyclic_pages(), form_fixtures::cyclic_data(), None),
        "survey" => (form_fixtures::survey_pages(), form_fixtures::survey_data(), None),
        other => bail!("unknown demo '{other}'"),
    };
    let layout = LayoutStore::from_json(1, pages.iter().map(|(name, value)| (*name, value)))?;
    let mut engine = FormEngine::new(config).with_sink(sink);
    if let Some(validations) = validations {
        engine = engine.with_expression_validations(ExpressionValidationConfig::from_json(validations)?);
    }
    let snapshot = engine.run(&layout, DataSourceBundle::new(DataModel::new(data)), None)?;
    log::info!("demo '{name}' resolved in {} pass(es)", snapshot.resolved().passes());
    print_tree(&snapshot);
    println!();
    print_validations(&snapshot);
    Ok(true)
}
