//! Build automation tasks for batchpipe
//!
//! - `generate-cli-docs`: render the CLI reference from the clap definitions

use clap::Parser;
use std::fs;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "xtask")]
#[command(about = "Build automation tasks for batchpipe", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Parser)]
enum Command {
    /// Generate the CLI reference in Markdown
    GenerateCliDocs {
        /// Output directory for generated documentation
        #[arg(short, long, default_value = "docs")]
        output_dir: String,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::GenerateCliDocs { output_dir } => generate_cli_docs(&output_dir)?,
    }

    Ok(())
}

fn generate_cli_docs(output_dir: &str) -> anyhow::Result<()> {
    println!("Generating CLI documentation...");

    let markdown = clap_markdown::help_markdown::<batchpipe_cli::Cli>();

    let content = format!(
        r#"# batchpipe CLI Reference

Generated from the CLI source code on {}.

## Quick Start

```bash
# Package new `news` rows (the last 12 hours on a first run) without submitting
batchpipe dry-run --table news

# Submit and wait for results
batchpipe run --table news --model mini

# Cron: collect finished jobs, then submit every enabled table
batchpipe submit

# After a crash or polling timeout
batchpipe resume batch_6820c5a0b1c88190a2f6b0e4d8a9c1f2
```

## Commands

{}

## Exit Codes

| Code | Meaning |
|------|---------|
| 0 | Success |
| 1 | Local state error, or some tables failed in a multi-table run |
| 2 | Invalid command line |
| 10 | Submission rejected by the API |
| 11 | Ambiguous submission; check the provider console before resubmitting |
| 12 | Polling deadline reached; resume later |
| 13 | Result download failed |
| 14 | Data source unavailable |
| 15 | Inference API unreachable |
| 16 | Interrupted |
| 17 | Packaging error |
| 18 | Configuration error |

## Environment Variables

- `OPENAI_API_KEY` - API key (required except for `dry-run`, `status`, `models`)
- `BATCHPIPE_API_BASE_URL` - API base URL (default: `https://api.openai.com/v1`)
- `BATCHPIPE_SOURCE` - `dynamodb` (default) or `file`
- `BATCHPIPE_SOURCE_DIR` - directory of `<table>.jsonl` files for the file source
- `BATCHPIPE_STATE_DIR` - watermarks and job records (default: `./.batchpipe`)
- `BATCHPIPE_OUTPUT_DIR` - downloaded results (default: `./output`)
- `BATCHPIPE_ARTIFACT_DIR` - archived submission artifacts (default: `./jsonl`)
- `BATCHPIPE_POLL_INITIAL_SECS`, `BATCHPIPE_POLL_MAX_SECS`, `BATCHPIPE_POLL_DEADLINE_SECS` - poll schedule
- `BATCHPIPE_JOB_TABLE` - DynamoDB table mirroring job records
- `LOG_LEVEL`, `LOG_OUTPUT`, `LOG_FORMAT`, `LOG_DIR` - logging

## Configuration

Table behavior lives in `batchpipe.toml`:

```toml
enabled_tables = ["news", "prices"]
full_scan_tables = ["constituents"]
max_chars = 8000

[tables.news]
template = "news"
transform = "collapse_whitespace"

[tables.prices]
fields = ["summary", "lastprice", "symbol"]
```

---

*To update, run `cargo run --manifest-path xtask/Cargo.toml -- generate-cli-docs`.*
"#,
        chrono::Utc::now().format("%Y-%m-%d"),
        markdown
    );

    let output_path = PathBuf::from(output_dir);
    fs::create_dir_all(&output_path)?;

    let file_path = output_path.join("cli-reference.md");
    fs::write(&file_path, content)?;

    println!("Generated CLI documentation at: {}", file_path.display());

    Ok(())
}
