//! The `readscope compose` command.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};

use readscope_core::access::{InMemoryCodeStore, StoreLock, DEFAULT_LOCK_TIMEOUT};
use readscope_core::engine::AssessmentEngine;
use readscope_core::model::{parse_structure, TestTakerInfo};
use readscope_core::parser;
use readscope_core::repository::InMemoryRepository;
use readscope_providers::load_config_from;

pub struct ComposeArgs {
    pub bank: PathBuf,
    pub name: String,
    pub age: u32,
    pub structure: Option<String>,
    pub seed: Option<u64>,
    pub code: Option<String>,
    pub codes: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub config: Option<PathBuf>,
}

pub async fn execute(args: ComposeArgs) -> Result<()> {
    let mut config = load_config_from(args.config.as_deref())?;
    if args.seed.is_some() {
        config.composer.seed = args.seed;
    }

    let structure = match &args.structure {
        Some(s) => parse_structure(s).map_err(anyhow::Error::msg)?,
        None => config.structure.clone(),
    };

    let banks = parser::load_banks(&args.bank)?;
    let repository = Arc::new(InMemoryRepository::from_banks(banks));
    anyhow::ensure!(
        !repository.is_empty(),
        "no questions found in {}",
        args.bank.display()
    );

    let mut engine = AssessmentEngine::new(repository, config.engine_config());
    // Held from load until the redeemed store is saved.
    let store = match &args.codes {
        Some(path) => {
            let lock = StoreLock::acquire(path, DEFAULT_LOCK_TIMEOUT).await?;
            let store = Arc::new(InMemoryCodeStore::load_json(path)?);
            engine = engine.with_code_store(store.clone());
            Some((path, store, lock))
        }
        None => None,
    };

    let taker = TestTakerInfo {
        name: args.name,
        age: args.age,
        access_code: args.code,
    };
    let session = engine.start_session(taker, &structure).await?;

    if session.is_empty() {
        anyhow::bail!(
            "no content available for age {} ({} band)",
            session.taker.age,
            session.age_band
        );
    }

    if let Some((path, store, lock)) = store {
        store.save_json(path)?;
        drop(lock);
    }

    let json = serde_json::to_string_pretty(&session).context("failed to serialize session")?;
    match &args.output {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, json)
                .with_context(|| format!("failed to write session to {}", path.display()))?;
            eprintln!("Session saved to: {}", path.display());
        }
        None => println!("{json}"),
    }

    eprintln!(
        "Composed {} questions for {} ({} band)",
        session.questions.len(),
        session.taker.name,
        session.age_band
    );
    Ok(())
}
