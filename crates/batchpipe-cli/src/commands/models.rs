//! `batchpipe models` command implementation

use crate::error::Result;
use crate::models::{DEFAULT_MODEL_KEY, EMBEDDING_MODELS, MODEL_MAP, TEXT_CHAT_MODELS};
use colored::Colorize;

/// List model keys and batch-capable models
pub fn run() -> Result<()> {
    println!("{}", "Model keys:".cyan().bold());
    for (key, model) in MODEL_MAP {
        let marker = if *key == DEFAULT_MODEL_KEY { " (default)" } else { "" };
        println!("  {:<6} {}{}", key.green(), model, marker);
    }

    println!();
    println!("{}", "Chat models:".cyan().bold());
    for model in TEXT_CHAT_MODELS {
        println!("  {model}");
    }

    println!();
    println!("{}", "Embedding models:".cyan().bold());
    for model in EMBEDDING_MODELS {
        println!("  {model}");
    }
    Ok(())
}
