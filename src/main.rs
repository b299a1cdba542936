//! wikistore - A Git-backed versioned document store
//!
//! Command-line access to a wiki repository: read and write pages, inspect
//! history, and revert changes.

use std::io::{Read, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use serde::Serialize;

use wikistore::storage::{Author, ListOptions, WikiRepository};
use wikistore::StoreConfig;

/// wikistore - inspect and edit a Git-backed wiki repository
#[derive(Parser, Debug)]
#[command(name = "wikistore")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the wiki repository
    #[arg(short, long, global = true, env = "WIKISTORE_REPO", default_value = "wiki")]
    repo: PathBuf,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    /// Author name for commits
    #[arg(long, global = true, env = "WIKISTORE_AUTHOR_NAME", default_value = "")]
    author_name: String,

    /// Author email for commits
    #[arg(long, global = true, env = "WIKISTORE_AUTHOR_EMAIL", default_value = "")]
    author_email: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a new repository
    Init,
    /// Print a file, from the working tree or a revision
    Cat {
        path: String,
        #[arg(long, default_value = "")]
        rev: String,
    },
    /// Store stdin as the new content of a file
    Put {
        path: String,
        #[arg(short, long, default_value = "")]
        message: String,
    },
    /// Delete a file or directory
    Rm {
        path: String,
        #[arg(short, long, default_value = "")]
        message: String,
    },
    /// Rename a file or directory
    Mv {
        old: String,
        new: String,
        #[arg(short, long, default_value = "")]
        message: String,
    },
    /// Show history, newest first
    Log {
        #[arg(default_value = "")]
        path: String,
        #[arg(short = 'n', long, default_value_t = 0)]
        max_count: i64,
    },
    /// Show a commit with its files and patch
    Show { rev: String },
    /// Show the patch between two revisions
    Diff { from: String, to: String },
    /// Show per-line attribution
    Blame {
        path: String,
        #[arg(long, default_value = "")]
        rev: String,
    },
    /// Undo a commit with a new commit
    Revert {
        rev: String,
        #[arg(short, long, default_value = "")]
        message: String,
    },
    /// List files and directories
    Ls {
        #[arg(default_value = "")]
        path: String,
        #[arg(long)]
        depth: Option<usize>,
        #[arg(long)]
        exclude: Vec<String>,
    },
    /// Signal the repository was changed out-of-band
    Reload,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.debug { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = StoreConfig::new(&cli.repo);
    let author = Author::new(&cli.author_name, &cli.author_email);

    let repo = match cli.command {
        Command::Init => {
            let repo = WikiRepository::init_with_config(config)?;
            println!("Initialized wiki repository in {}", repo.path().display());
            return Ok(());
        }
        _ => WikiRepository::open_with_config(config)?,
    };

    match cli.command {
        Command::Init => {}
        Command::Cat { path, rev } => {
            let content = repo.load(&path, &rev)?;
            std::io::stdout().write_all(&content)?;
        }
        Command::Put { path, message } => {
            let mut content = Vec::new();
            std::io::stdin().read_to_end(&mut content)?;
            if repo.store(&path, &content, &message, &author)? {
                println!("Saved {}", path);
            } else {
                println!("{} unchanged", path);
            }
        }
        Command::Rm { path, message } => {
            repo.delete(&path, &message, &author)?;
        }
        Command::Mv { old, new, message } => {
            repo.rename(&old, &new, &message, &author)?;
        }
        Command::Log { path, max_count } => {
            let log = repo.log(&path, max_count)?;
            if cli.json {
                print_json(&log)?;
            } else {
                for entry in &log {
                    println!(
                        "{} {} {} {}",
                        entry.revision,
                        entry.timestamp.format("%Y-%m-%d %H:%M"),
                        entry.author_name,
                        entry.summary()
                    );
                }
            }
        }
        Command::Show { rev } => {
            let (meta, patch) = repo.show_commit(&rev)?;
            if cli.json {
                print_json(&meta)?;
            } else {
                println!("commit {}", meta.full_revision);
                println!("Author: {} <{}>", meta.author_name, meta.author_email);
                println!("Date:   {}", meta.timestamp.to_rfc2822());
                println!();
                for line in meta.message.lines() {
                    println!("    {}", line);
                }
                println!();
                print!("{}", patch);
            }
        }
        Command::Diff { from, to } => {
            print!("{}", repo.diff(&from, &to)?);
        }
        Command::Blame { path, rev } => {
            let lines = repo.blame(&path, &rev)?;
            if cli.json {
                print_json(&lines)?;
            } else {
                for line in &lines {
                    println!(
                        "{} ({:<16} {}) {:>4} {}",
                        line.revision,
                        line.author_name,
                        line.timestamp.format("%Y-%m-%d"),
                        line.line_number,
                        line.content
                    );
                }
            }
        }
        Command::Revert { rev, message } => match repo.revert(&rev, &message, &author)? {
            Some(id) => println!("Reverted {} as {}", rev, id.short()),
            None => println!("Nothing to revert"),
        },
        Command::Ls { path, depth, exclude } => {
            let options = ListOptions { depth, exclude };
            let listing = repo.list(&path, &options)?;
            if cli.json {
                print_json(&listing)?;
            } else {
                for dir in &listing.directories {
                    println!("{}/", dir);
                }
                for file in &listing.files {
                    println!("{}", file);
                }
            }
        }
        Command::Reload => {
            repo.signal_reload()?;
        }
    }

    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<(), serde_json::Error> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
