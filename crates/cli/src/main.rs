use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

use psyche_core::{load_text_files, Document};
use psyche_index::IndexStore;
use psyche_rag::{
    build_indices, generate_profile, prepare_reference_corpus, EmbeddingClient, Language,
    LlmGenerator, ProfileOutcome, ProfileRequest, PsycheConfig, TextGenerator,
};

const DEFAULT_CONFIG: &str = "psyche.toml";

#[derive(Parser, Debug)]
#[command(
    name = "psyche",
    version,
    about = "Retrieval-augmented psychological profiling over a text corpus"
)]
struct Cli {
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Directory holding the character and psych indices.
    #[arg(long, global = true)]
    storage: Option<PathBuf>,
    #[arg(long = "embedding-model", global = true)]
    embedding_model: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write the default psychology reference documents.
    Bootstrap {
        #[arg(long = "reference-dir")]
        reference_dir: Option<PathBuf>,
    },
    /// Rebuild the character and psych indices.
    Build {
        #[arg(long)]
        character: String,
        inputs: Vec<PathBuf>,
        /// Pasted text, indexed as an extra document.
        #[arg(long)]
        text: Option<String>,
        #[arg(long = "chunk-size")]
        chunk_size: Option<usize>,
        #[arg(long)]
        overlap: Option<usize>,
    },
    /// Query a single index.
    Search {
        #[arg(long, default_value = "character")]
        index: String,
        #[arg(long)]
        query: String,
        #[arg(long = "top-k", default_value_t = 5)]
        top_k: usize,
    },
    /// Generate a profile from the built indices.
    Profile {
        #[arg(long)]
        character: String,
        #[arg(long)]
        language: Option<String>,
        #[arg(long = "k-char")]
        k_char: Option<usize>,
        #[arg(long = "k-psych")]
        k_psych: Option<usize>,
        /// Extra instructions appended to the prompt.
        #[arg(long)]
        context: Option<String>,
        #[arg(long = "use-llm", action = ArgAction::SetTrue)]
        use_llm: bool,
        #[arg(long = "no-llm", action = ArgAction::SetTrue, conflicts_with = "use_llm")]
        no_llm: bool,
        #[arg(long)]
        model: Option<String>,
        #[arg(long = "prompt-out")]
        prompt_out: Option<PathBuf>,
        #[arg(long = "json-out")]
        json_out: Option<PathBuf>,
        #[arg(long = "markdown-out")]
        markdown_out: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG));
    let mut config = PsycheConfig::load(Some(config_path.as_path()))?;
    if let Some(storage) = &cli.storage {
        config.storage.root = storage.clone();
    }
    if let Some(model) = &cli.embedding_model {
        config.embedding.model = model.clone();
    }

    match cli.command {
        Commands::Bootstrap { reference_dir } => {
            let dir = reference_dir.unwrap_or_else(|| config.storage.reference_dir.clone());
            let docs = prepare_reference_corpus(&dir)?;
            println!(
                "[psyche] Reference corpus:  {} ({} documents)",
                dir.display(),
                docs.len()
            );
        }
        Commands::Build {
            character,
            inputs,
            text,
            chunk_size,
            overlap,
        } => {
            if let Some(size) = chunk_size {
                config.chunking.chunk_size = size;
            }
            if let Some(overlap) = overlap {
                config.chunking.overlap = overlap;
            }
            let files = gather_input_files(&inputs);
            let mut corpus = load_text_files(&files)?;
            if let Some(text) = text.as_deref().filter(|t| !t.trim().is_empty()) {
                corpus.push(Document::normalized("pasted_text", text));
            }
            if corpus.is_empty() {
                bail!("no input documents: pass files, directories or --text");
            }
            let reference = prepare_reference_corpus(&config.storage.reference_dir)?;
            let embedder = EmbeddingClient::for_model(&config.embedding.model)?;
            let store = IndexStore::open(&config.storage.root)?;
            let summary = build_indices(
                &store,
                &embedder,
                &character,
                &corpus,
                &reference,
                config.chunking,
            )?;
            println!("[psyche] Character:         {}", character.trim());
            println!("[psyche] Aliases:           {}", summary.aliases.join(", "));
            println!(
                "[psyche] Documents:         {} matched of {}{}",
                summary.matched_documents,
                corpus.len(),
                if summary.used_all_documents {
                    " (no match, indexed all)"
                } else {
                    ""
                }
            );
            println!(
                "[psyche] Character chunks:  {}",
                summary.character_chunks
            );
            println!("[psyche] Psych chunks:      {}", summary.psych_chunks);
            println!("[psyche] Embedding dim:     {}", summary.dim);
            println!(
                "[psyche] Storage:           {}",
                store.root().display()
            );
        }
        Commands::Search {
            index,
            query,
            top_k,
        } => {
            let embedder = EmbeddingClient::for_model(&config.embedding.model)?;
            let store = IndexStore::open(&config.storage.root)?;
            if !store.exists(&index)? {
                eprintln!("warning: index {index} has not been built yet");
            }
            let hits = store.search(&index, &query, &embedder, top_k)?;
            for (rank, hit) in hits.iter().enumerate() {
                println!("[{}] {} score={:.3}", rank + 1, hit.id, hit.score);
                println!("{}\n", short_preview(&hit.text, 240));
            }
        }
        Commands::Profile {
            character,
            language,
            k_char,
            k_psych,
            context,
            use_llm,
            no_llm,
            model,
            prompt_out,
            json_out,
            markdown_out,
        } => {
            let language =
                Language::from_tag(language.as_deref().unwrap_or(&config.generation.language));
            let mut request = ProfileRequest::new(&character, language);
            request.query.k_char = k_char.unwrap_or(config.retrieval.k_char);
            request.query.k_psych = k_psych.unwrap_or(config.retrieval.k_psych);
            request.user_context = context;

            let llm_enabled = if use_llm {
                true
            } else if no_llm {
                false
            } else {
                config.generation.use_llm
            };
            let generator = if llm_enabled {
                let generator = LlmGenerator::from_config(&config.generation)?;
                Some(match model {
                    Some(model) => generator.with_model(model),
                    None => generator,
                })
            } else {
                None
            };

            let embedder = EmbeddingClient::for_model(&config.embedding.model)?;
            let store = IndexStore::open(&config.storage.root)?;
            let outcome = generate_profile(
                &store,
                &embedder,
                generator.as_ref().map(|g| g as &dyn TextGenerator),
                &request,
            )?;
            write_outputs(&outcome, prompt_out, json_out, markdown_out)?;
            print_profile(&outcome);
        }
    }
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Expands directories recursively. Plain files and missing paths are passed
/// through; the loader skips the latter with a warning.
fn gather_input_files(inputs: &[PathBuf]) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for input in inputs {
        if input.is_dir() {
            let mut found: Vec<PathBuf> = WalkDir::new(input)
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
                .map(|e| e.into_path())
                .collect();
            found.sort();
            files.extend(found);
        } else {
            files.push(input.clone());
        }
    }
    files
}

fn write_outputs(
    outcome: &ProfileOutcome,
    prompt_out: Option<PathBuf>,
    json_out: Option<PathBuf>,
    markdown_out: Option<PathBuf>,
) -> Result<()> {
    if let Some(path) = prompt_out {
        write_file(&path, &outcome.prompt)?;
    }
    if let Some(path) = json_out {
        let json = serde_json::to_string_pretty(&outcome.report.profile)?;
        write_file(&path, &json)?;
    }
    if let Some(path) = markdown_out {
        write_file(&path, &outcome.report.markdown)?;
    }
    Ok(())
}

fn write_file(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    fs::write(path, contents).with_context(|| format!("failed to write {}", path.display()))?;
    info!(path = %path.display(), "wrote output");
    Ok(())
}

fn print_profile(outcome: &ProfileOutcome) {
    let origin = serde_json::to_value(outcome.report.origin)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_default();
    println!("[psyche] Origin:            {origin}");
    if let Some(reason) = &outcome.report.fallback_reason {
        println!("[psyche] Fallback reason:   {reason}");
    }
    println!(
        "[psyche] Evidence:          {} character / {} psych chunks",
        outcome.hits.character.len(),
        outcome.hits.psych.len()
    );
    match serde_json::to_string_pretty(&outcome.report.profile) {
        Ok(json) => println!("\n{json}"),
        Err(err) => eprintln!("warning: failed to render profile JSON: {err}"),
    }
    println!("\n{}", outcome.report.markdown.trim());
}

fn short_preview(text: &str, limit: usize) -> String {
    let mut preview: String = text.chars().take(limit).collect();
    if text.chars().count() > limit {
        preview.push_str("...");
    }
    preview
}
