//! Music RAG CLI
//!
//! Command-line interface for indexing and searching a local music catalog.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use colored::Colorize;

use music_rag_core::llm::{enhance_or_fallback, explain_or_fallback};
use music_rag_core::{MusicItem, QueryResult, RagConfig, RetrievalQuery, StoreBackend};
use music_rag_server::init_tracing;
use music_rag_server::state::AppState;

/// Music RAG - hybrid music discovery CLI
#[derive(Parser)]
#[command(name = "music-rag")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "CLI for the Music RAG retrieval engine")]
#[command(long_about = "Index music items and search them with dual-track hybrid retrieval.\n\nSettings come from MUSIC_RAG_* environment variables; flags override them.")]
struct Cli {
    /// Data directory (overrides MUSIC_RAG_DATA_DIR)
    #[arg(long, global = true, env = "MUSIC_RAG_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Vector store backend: memory or hnsw
    #[arg(long, global = true)]
    backend: Option<StoreBackend>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Index items from a JSON file holding an array of items
    Index {
        /// Path to the JSON file
        file: PathBuf,
        /// Items per batch
        #[arg(long, default_value = "100")]
        batch_size: usize,
    },

    /// Search the catalog by text, audio or both
    Search {
        /// Free-text query
        query: Option<String>,
        /// WAV file to search by sound
        #[arg(long)]
        audio: Option<PathBuf>,
        /// Number of results (default from MUSIC_RAG_DEFAULT_TOP_K)
        #[arg(short = 'k', long)]
        top_k: Option<usize>,
        /// Genre filter (repeatable)
        #[arg(long)]
        genre: Vec<String>,
        /// Mood filter (repeatable; the first one is applied)
        #[arg(long)]
        mood: Vec<String>,
        /// Cultural origin filter (repeatable)
        #[arg(long)]
        origin: Vec<String>,
        /// Weight of the text modality in [0, 1]
        #[arg(long)]
        weight: Option<f32>,
        /// Skip the unfiltered pass
        #[arg(long)]
        no_broad: bool,
        /// Skip the filtered pass
        #[arg(long)]
        no_targeted: bool,
        /// Rerank with the cross-encoder
        #[arg(long)]
        rerank: bool,
        /// Rewrite the query with the LLM first
        #[arg(long)]
        enhance: bool,
        /// Ask the LLM to explain the results
        #[arg(long)]
        explain: bool,
    },

    /// Show store and catalog statistics
    Stats,

    /// Show one catalogued item
    Show {
        /// Item id
        id: String,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = RagConfig::from_env()?;
    if let Some(dir) = cli.data_dir {
        config.data_dir = dir;
    }
    if let Some(backend) = cli.backend {
        config.store_backend = backend;
    }
    if matches!(&cli.command, Commands::Search { rerank: true, .. }) {
        config.enable_reranking = true;
    }
    if let Commands::Search { enhance, explain, .. } = &cli.command {
        config.enable_query_enhancement |= *enhance;
        config.enable_result_explanation |= *explain;
    }
    config.validate()?;
    init_tracing(&config);

    match cli.command {
        Commands::Index { file, batch_size } => run_index(config, file, batch_size),
        Commands::Search {
            query,
            audio,
            top_k,
            genre,
            mood,
            origin,
            weight,
            no_broad,
            no_targeted,
            rerank,
            enhance,
            explain,
        } => {
            if query.is_none() && audio.is_none() {
                anyhow::bail!("provide a text query, --audio <file>, or both");
            }
            let query = RetrievalQuery {
                text_query: query,
                audio_path: audio,
                ..Default::default()
            }
            .with_top_k(top_k.unwrap_or(config.default_top_k))
            .with_genres(genre)
            .with_moods(mood)
            .with_origins(origin)
            .with_semantic_weight(weight.unwrap_or(config.default_semantic_weight))
            .with_passes(!no_broad, !no_targeted);
            run_search(config, query, rerank, enhance, explain)
        }
        Commands::Stats => run_stats(config),
        Commands::Show { id } => run_show(config, id),
    }
}

/// Run index command
fn run_index(config: RagConfig, file: PathBuf, batch_size: usize) -> anyhow::Result<()> {
    let content = std::fs::read_to_string(&file)?;
    let items: Vec<MusicItem> = serde_json::from_str(&content)?;
    let state = AppState::from_config(config)?;

    println!("{}", "=== Indexing Music Items ===".cyan().bold());
    println!("{}: {}", "Source".white().bold(), file.display());
    println!("{}: {}", "Items".white().bold(), items.len());
    println!();

    let batch_size = batch_size.clamp(1, state.indexer.max_batch_size().max(1));
    let mut indexed = 0;
    let mut batch = Vec::with_capacity(batch_size);
    for item in items {
        batch.push(item);
        if batch.len() == batch_size {
            indexed += state.indexer.index_batch(std::mem::take(&mut batch))?.len();
            println!("  {} {} items", "Indexed".green(), indexed);
        }
    }
    if !batch.is_empty() {
        indexed += state.indexer.index_batch(batch)?.len();
        println!("  {} {} items", "Indexed".green(), indexed);
    }
    state.indexer.flush()?;

    println!();
    println!("{}", format!("Indexed {} music items", indexed).green().bold());
    Ok(())
}

/// Run search command
fn run_search(
    config: RagConfig,
    mut query: RetrievalQuery,
    rerank: bool,
    enhance: bool,
    explain: bool,
) -> anyhow::Result<()> {
    query.validate()?;
    let state = AppState::from_config(config)?;
    let original = query.text_query().unwrap_or_default().to_string();

    println!("{}", "=== Music Search ===".cyan().bold());
    if !original.is_empty() {
        println!("{}: {}", "Query".white().bold(), original);
    }
    if let Some(path) = &query.audio_path {
        println!("{}: {}", "Audio".white().bold(), path.display());
        if state.engine.audio_embedder().is_none() {
            println!("{}", "Audio embeddings unavailable; the audio query is ignored".yellow());
        }
    }

    if enhance && !original.is_empty() {
        match &state.enhancer {
            Some(enhancer) => {
                let enhanced = enhance_or_fallback(enhancer.as_ref(), &original, None);
                enhanced.apply_to(&mut query);
                println!("{}: {}", "Enhanced".white().bold(), enhanced.enhanced_query);
                if !enhanced.intent.is_empty() {
                    println!("{}: {}", "Intent".white().bold(), enhanced.intent);
                }
            }
            None => println!("{}", "Query enhancement unavailable (no LLM configured)".yellow()),
        }
    }
    println!();

    let results = if rerank && state.engine.has_reranker() {
        state.engine.retrieve_with_rerank(&query, state.catalog.as_ref())?
    } else {
        state.engine.retrieve(&query, state.catalog.as_ref())?
    };

    if results.is_empty() {
        println!("{}", "No results found.".dimmed());
        return Ok(());
    }

    for (rank, result) in results.iter().enumerate() {
        print_result(rank + 1, result);
    }

    if explain {
        println!();
        match &state.explainer {
            Some(explainer) => {
                let explanation = explain_or_fallback(explainer.as_ref(), &original, &results);
                println!("{}", "=== Why These Results ===".yellow().bold());
                println!("{}", explanation.summary);
                for item in &explanation.explanations {
                    println!("  {} {}", format!("{}:", item.title).white().bold(), item.explanation);
                }
                for tip in std::iter::once(&explanation.listening_recommendations) {
                    println!("  {} {}", "-".dimmed(), tip);
                }
            }
            None => println!("{}", "Result explanation unavailable (no LLM configured)".yellow()),
        }
    }

    Ok(())
}

fn print_result(rank: usize, result: &QueryResult) {
    let item = &result.music_item;
    println!(
        "{}. {} {} {}",
        rank,
        item.title.white().bold(),
        "by".dimmed(),
        item.artist
    );

    let mut details = Vec::new();
    if let Some(genre) = &item.metadata.genre {
        details.push(genre.clone());
    }
    if !item.metadata.mood.is_empty() {
        details.push(item.metadata.mood.join(", "));
    }
    if let Some(origin) = &item.metadata.cultural_origin {
        details.push(origin.clone());
    }
    if let Some(tempo) = item.metadata.tempo {
        details.push(format!("{:.0} BPM", tempo));
    }
    if !details.is_empty() {
        println!("   {}", details.join(" | ").dimmed());
    }

    let mut score = format!("score {:.3} ({})", result.score, result.retrieval_type);
    if let Some(rerank) = result.rerank_score {
        score.push_str(&format!(", rerank {:.3}", rerank));
    }
    println!("   {}", score.cyan());
}

/// Run stats command
fn run_stats(config: RagConfig) -> anyhow::Result<()> {
    let store = music_rag_server::state::open_store(&config)?;
    let catalog = music_rag_core::SqliteCatalog::new(Some(config.catalog_path()))?;
    let stats = store.stats()?;

    println!("{}", "=== Music RAG Statistics ===".cyan().bold());
    println!();
    println!("{}: {}", "Data Directory".white().bold(), config.data_dir.display());
    println!("{}: {}", "Store Backend".white().bold(), config.store_backend.as_str());
    for (modality, count) in &stats {
        let label = format!("{} Embeddings", capitalize(modality.as_str()));
        println!("{}: {}", label.white().bold(), count);
    }
    println!("{}: {}", "Catalogued Items".white().bold(), music_rag_core::ItemCatalog::count(&catalog)?);
    Ok(())
}

/// Run show command
fn run_show(config: RagConfig, id: String) -> anyhow::Result<()> {
    use music_rag_core::ItemCache;

    let catalog = music_rag_core::SqliteCatalog::new(Some(config.catalog_path()))?;
    match catalog.get_item(&id)? {
        Some(item) => {
            println!("{}", serde_json::to_string_pretty(&item)?);
            Ok(())
        }
        None => anyhow::bail!("Item not found: {}", id),
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
