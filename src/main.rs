//! parajudica CLI: compliance labeling for data catalogs.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};
use serde::Deserialize;
use tracing_subscriber::EnvFilter;

use parajudica::cache::{CacheInputs, ResultCache};
use parajudica::engine::{Engine, EngineConfig};
use parajudica::frameworks;
use parajudica::term::TermPool;
use parajudica::vocab::{FACETS, Vocab};

#[derive(Parser)]
#[command(name = "parajudica", version, about = "Compliance-reasoning engine")]
struct Cli {
    /// Increase diagnostic verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run inference over a catalog and evaluate queries.
    Infer {
        /// Built-in framework bundles to load in addition to Base.
        #[arg(short, long = "framework")]
        frameworks: Vec<String>,

        /// Framework bundle files (text form) to load.
        #[arg(long = "bundle")]
        bundles: Vec<PathBuf>,

        /// Data files to load.
        #[arg(short, long = "data")]
        data: Vec<PathBuf>,

        /// Pattern queries evaluated against the final store.
        #[arg(short, long = "query")]
        queries: Vec<String>,

        /// Restrict queries to one scope's view.
        #[arg(long)]
        scope: Option<String>,

        /// Memoize the result store keyed by a content hash of all inputs.
        #[arg(long)]
        cache: bool,

        /// Force recomputation even if a cache entry exists.
        #[arg(long)]
        rm_cache: bool,

        /// Cache directory.
        #[arg(long, default_value = ".parajudica-cache")]
        cache_dir: PathBuf,

        /// Query output format: "table" or "json".
        #[arg(long, default_value = "table")]
        format: String,

        /// Print the full final store after the queries.
        #[arg(long)]
        dump: bool,

        /// TOML run configuration; command-line flags extend it.
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// List the built-in frameworks and the facet vocabulary.
    Frameworks,
}

/// TOML form of the `infer` options.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RunConfig {
    #[serde(default)]
    frameworks: Vec<String>,
    #[serde(default)]
    bundles: Vec<PathBuf>,
    #[serde(default)]
    data: Vec<PathBuf>,
    #[serde(default)]
    queries: Vec<String>,
    #[serde(default)]
    scope: Option<String>,
    #[serde(default)]
    cache: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Infer {
            mut frameworks,
            mut bundles,
            mut data,
            mut queries,
            scope,
            mut cache,
            rm_cache,
            cache_dir,
            format,
            dump,
            config,
        } => {
            let mut scope = scope;
            if let Some(path) = config {
                let text = std::fs::read_to_string(&path).into_diagnostic()?;
                let file_config: RunConfig = toml::from_str(&text).into_diagnostic()?;
                frameworks.extend(file_config.frameworks);
                bundles.extend(file_config.bundles);
                data.extend(file_config.data);
                queries.extend(file_config.queries);
                scope = scope.or(file_config.scope);
                cache = cache || file_config.cache;
            }
            run_infer(
                frameworks, bundles, data, queries, scope, cache, rm_cache, cache_dir, &format,
                dump,
            )
        }
        Commands::Frameworks => {
            print_frameworks();
            Ok(())
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn run_infer(
    framework_names: Vec<String>,
    bundles: Vec<PathBuf>,
    data: Vec<PathBuf>,
    queries: Vec<String>,
    scope: Option<String>,
    use_cache: bool,
    rm_cache: bool,
    cache_dir: PathBuf,
    format: &str,
    dump: bool,
) -> Result<()> {
    let mut engine = Engine::new(EngineConfig {
        frameworks: framework_names.clone(),
        ..Default::default()
    })?;

    // Read every input up front: the cache key covers all of them.
    let mut inputs: Vec<(String, String)> = Vec::new();
    for path in bundles.iter().chain(data.iter()) {
        let text = std::fs::read_to_string(path).into_diagnostic()?;
        inputs.push((path.display().to_string(), text));
    }
    let (bundle_inputs, data_inputs) = inputs.split_at(bundles.len());

    for (name, text) in bundle_inputs {
        engine.load_framework_str(name, text)?;
    }
    for (name, text) in data_inputs {
        engine.load_data_str(name, text)?;
    }

    let cache = if use_cache || rm_cache {
        Some(ResultCache::open(&cache_dir)?)
    } else {
        None
    };
    let key = CacheInputs {
        frameworks: &framework_names,
        data: &inputs,
    }
    .key();

    let mut replayed = false;
    if let Some(cache) = &cache {
        if rm_cache {
            cache.remove(&key);
        } else if let Some(export) = cache.load(&key) {
            engine.prepare()?;
            engine.import(&export);
            replayed = true;
        }
    }
    if !replayed {
        let outcome = engine.run()?;
        tracing::info!(
            rounds = outcome.rounds,
            new_triples = outcome.new_triples,
            converged = outcome.converged,
            "inference finished"
        );
        if let Some(cache) = &cache {
            cache.store(&key, &engine.export())?;
        }
    }

    for query in &queries {
        let answer = engine.query(query, scope.as_deref())?;
        match format {
            "json" => {
                println!("{}", serde_json::to_string_pretty(&answer).into_diagnostic()?);
            }
            _ => {
                println!("{query}");
                println!("{answer}");
                println!();
            }
        }
    }

    if dump {
        for entry in engine.export() {
            let scope = entry.scope.as_deref().unwrap_or("-");
            println!("{}\t{}\t{}\t{}", entry.subject, entry.predicate, entry.object, scope);
        }
    }
    Ok(())
}

fn print_frameworks() {
    let pool = TermPool::new();
    let vocab = Vocab::resolve(&pool);
    println!("built-in frameworks:");
    for name in frameworks::BUILTIN {
        let fw = frameworks::by_name(name, &pool, &vocab).expect("builtin resolves");
        match &fw.k_policy {
            Some(policy) => println!(
                "  {name:<6} {} rules, k-threshold {}",
                fw.rules.len(),
                policy.threshold
            ),
            None => println!("  {name:<6} {} rules", fw.rules.len()),
        }
    }
    println!("\nfacet vocabulary:");
    for facet in FACETS {
        println!("  {facet}");
    }
}
