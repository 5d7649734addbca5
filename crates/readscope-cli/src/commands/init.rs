//! The `readscope init` command.

use std::path::Path;

use anyhow::Result;

pub fn execute() -> Result<()> {
    if Path::new("readscope.toml").exists() {
        println!("readscope.toml already exists, skipping.");
    } else {
        std::fs::write("readscope.toml", SAMPLE_CONFIG)?;
        println!("Created readscope.toml");
    }

    std::fs::create_dir_all("question-banks")?;
    let sample_path = Path::new("question-banks/sample.toml");
    if sample_path.exists() {
        println!("question-banks/sample.toml already exists, skipping.");
    } else {
        std::fs::write(sample_path, SAMPLE_BANK)?;
        println!("Created question-banks/sample.toml");
    }

    println!("\nNext steps:");
    println!("  1. Edit readscope.toml (set ANTHROPIC_API_KEY for generated narratives)");
    println!("  2. Run: readscope validate --bank question-banks");
    println!("  3. Run: readscope compose --bank question-banks --name Alex --age 15 --output session.json");

    Ok(())
}

const SAMPLE_CONFIG: &str = r#"# readscope configuration

default_provider = "anthropic"
default_model = "claude-sonnet-4-20250514"
default_temperature = 0.7
max_retries = 1
narrative_timeout_secs = 30
output_dir = "./readscope-results"
# ledger_path = "./readscope-results/ledger.jsonl"

[providers.anthropic]
type = "anthropic"
api_key = "${ANTHROPIC_API_KEY}"

[providers.ollama]
type = "ollama"
base_url = "http://localhost:11434"

# Questions per raw skill tag.
[structure]
title = 1
theme = 1
argument = 1
inference = 2
pronoun = 1
sentence_ordering = 1
paragraph_ordering = 1
essay = 1

# Raw skill tag -> scoring bucket. Unlisted tags score under their own name.
[taxonomy]
title = "comprehension"
theme = "comprehension"
argument = "critical_thinking"
pronoun = "vocabulary"
sentence_ordering = "logic"
paragraph_ordering = "logic"
essay = "creativity"

[composer]
oversample_factor = 3
balance_categories = true

[timing]
fast_threshold = 0.3
slow_threshold = -0.3
"#;

const SAMPLE_BANK: &str = include_str!("../../../../question-banks/sample.toml");
