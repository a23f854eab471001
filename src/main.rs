use anyhow::Context;
use clap::Parser;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;
use wordwatch::ui::cli::{Cli, Command};
use wordwatch::{Config, FileIndexer, SearchResult};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = Config::new()
        .with_debounce(Duration::from_millis(cli.debounce_ms))
        .with_follow_links(cli.follow_links);
    let indexer = FileIndexer::builder().config(config).build();

    indexer
        .start(&cli.paths)
        .await
        .context("Failed to start indexer")?;
    eprintln!("Type a word to search, ':add <path>', ':remove <path>' or ':quit'.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match Command::parse(&line) {
            Command::Empty => {}
            Command::Quit => break,
            Command::Add(path) => match indexer.add_path(&path).await {
                Ok(()) => eprintln!("Added {}", path.display()),
                Err(e) => eprintln!("Error: {}", e),
            },
            Command::Remove(path) => match indexer.remove_path(&path).await {
                Ok(()) => eprintln!("Removed {}", path.display()),
                Err(e) => eprintln!("Error: {}", e),
            },
            Command::Search(word) => {
                let results = indexer.search_word(&word).await?;
                print_results(&word, &results, cli.json)?;
            }
        }
    }

    indexer.cancel().await.context("Failed to stop indexer")?;
    Ok(())
}

fn init_logging(verbose: bool) {
    let default = if verbose { "wordwatch=debug" } else { "wordwatch=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn print_results(word: &str, results: &[SearchResult], json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string(results)?);
        return Ok(());
    }

    if results.is_empty() {
        println!("No matches for '{}'", word);
        return Ok(());
    }

    for result in results {
        let locations: Vec<String> = result
            .locations
            .iter()
            .map(|l| format!("({}, {})", l.line, l.column))
            .collect();
        println!("{}: {}", result.file.display(), locations.join(", "));
    }
    Ok(())
}
