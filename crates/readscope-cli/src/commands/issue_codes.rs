//! The `readscope issue-codes` command.

use std::path::PathBuf;

use anyhow::Result;
use rand::rngs::StdRng;
use rand::SeedableRng;

use readscope_core::access::{
    issue_code, InMemoryCodeStore, StoreLock, DEFAULT_LOCK_TIMEOUT, DEFAULT_MAX_ATTEMPTS,
};

pub async fn execute(codes_path: PathBuf, count: u32) -> Result<()> {
    anyhow::ensure!(count >= 1, "count must be at least 1");

    let lock = StoreLock::acquire(&codes_path, DEFAULT_LOCK_TIMEOUT).await?;
    let store = InMemoryCodeStore::load_json(&codes_path)?;
    let mut rng = StdRng::from_entropy();

    let mut issued = Vec::with_capacity(count as usize);
    for _ in 0..count {
        issued.push(issue_code(&store, &mut rng, DEFAULT_MAX_ATTEMPTS).await?);
    }
    store.save_json(&codes_path)?;
    drop(lock);

    for code in &issued {
        println!("{code}");
    }
    eprintln!(
        "Issued {} code(s); store {} now holds {}.",
        issued.len(),
        codes_path.display(),
        store.snapshot().len()
    );
    Ok(())
}
