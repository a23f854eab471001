use clap::Parser;
use std::path::PathBuf;

/// wordwatch - Search words across files that keep changing
#[derive(Parser, Debug)]
#[command(name = "wordwatch")]
#[command(about = "Index the words of text files and keep the index in sync with the file system", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Files or directories to index and watch
    #[arg(value_name = "PATHS")]
    pub paths: Vec<PathBuf>,

    /// Quiet period before a batch of file system events is processed
    #[arg(long, value_name = "MS", default_value_t = 200)]
    pub debounce_ms: u64,

    /// Descend into symlinked directories
    #[arg(long)]
    pub follow_links: bool,

    /// Print search results as JSON
    #[arg(long)]
    pub json: bool,

    /// Enable debug logging
    #[arg(short, long)]
    pub verbose: bool,
}

/// One line of interactive input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Search(String),
    Add(PathBuf),
    Remove(PathBuf),
    Quit,
    Empty,
}

impl Command {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            return Command::Empty;
        }

        match line.split_once(char::is_whitespace) {
            Some((":add", path)) => Command::Add(PathBuf::from(path.trim())),
            Some((":remove", path)) => Command::Remove(PathBuf::from(path.trim())),
            _ if line == ":quit" || line == ":q" => Command::Quit,
            _ => Command::Search(line.to_string()),
        }
    }
}
