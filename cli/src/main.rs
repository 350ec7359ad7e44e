//! readwise: command-line front-end for the Readwise Reader API.
//!
//! Every subcommand is a thin adapter over `readwise_core::Reader`. Output
//! goes to stdout as JSON or a one-line message; failures print a single
//! `error:` line to stderr and exit with status 1.

use std::path::PathBuf;
use std::process::ExitCode;

use chrono::{DateTime, Utc};
use clap::{ArgGroup, Parser, Subcommand};
use readwise_core::{
    Category, DeleteTarget, ListFilter, Location, Reader, ReaderConfig, RetryPolicy, SaveRequest,
};
use readwise_cli::{print_json, DocumentSummary, UreqTransport};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "readwise")]
#[command(author, version, about = "Command-line client for Readwise Reader")]
#[command(propagate_version = true)]
struct Cli {
    /// API token (defaults to READWISE_TOKEN)
    #[arg(long, global = true)]
    token: Option<String>,

    /// Fail on rate limiting instead of waiting and retrying
    #[arg(long, global = true)]
    no_retry: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List documents
    List {
        /// One of: new, later, shortlist, archive, feed
        #[arg(short, long)]
        location: Option<Location>,

        /// One of: article, email, rss, highlight, note, pdf, epub, tweet, video
        #[arg(short, long)]
        category: Option<Category>,

        /// Only documents updated after this RFC 3339 timestamp
        #[arg(short, long)]
        updated_after: Option<DateTime<Utc>>,

        /// Only documents carrying this tag
        #[arg(short, long)]
        tag: Option<String>,

        /// Fetch a single page of at most this many documents (1-100)
        #[arg(short = 'n', long = "number")]
        limit: Option<u32>,

        /// Start from this page cursor
        #[arg(long)]
        cursor: Option<String>,

        /// Include each document's html content
        #[arg(long)]
        html: bool,

        /// Print full documents instead of a summary
        #[arg(long)]
        full: bool,
    },

    /// Get a single document by its ID
    Get {
        id: String,
    },

    /// Save a document from a URL or an html file
    #[command(group(ArgGroup::new("source").required(true).args(["url", "html_file"])))]
    Save {
        /// URL Readwise will scrape the document from
        url: Option<String>,

        /// Read the document's html from this file instead
        #[arg(long)]
        html_file: Option<PathBuf>,

        /// Let Readwise clean the html and extract metadata (only with --html-file)
        #[arg(long, conflicts_with = "url")]
        clean_html: bool,

        #[arg(long)]
        title: Option<String>,

        #[arg(long)]
        author: Option<String>,

        #[arg(long)]
        summary: Option<String>,

        /// Publication date in ISO 8601
        #[arg(long)]
        published_date: Option<String>,

        #[arg(long)]
        image_url: Option<String>,

        #[arg(short, long)]
        location: Option<Location>,

        #[arg(short, long)]
        category: Option<Category>,

        /// Tag to attach (repeatable)
        #[arg(short, long = "tag")]
        tags: Vec<String>,

        #[arg(long)]
        notes: Option<String>,
    },

    /// Find a document by its URL
    Search {
        url: String,
    },

    /// Move a document to new, later or archive
    Move {
        id: String,
        location: Location,
    },

    /// Delete a document by ID or URL
    #[command(group(ArgGroup::new("target").required(true).args(["id", "url"])))]
    Delete {
        #[arg(long)]
        id: Option<String>,

        #[arg(long)]
        url: Option<String>,
    },

    /// Check whether the token (from --token or READWISE_TOKEN) is valid
    Auth,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn build_reader(cli: &Cli) -> Reader<UreqTransport> {
    let mut config = ReaderConfig::from_env();
    if let Some(token) = &cli.token {
        config.token = Some(token.clone());
    }
    config.retry = if cli.no_retry {
        RetryPolicy::never()
    } else {
        RetryPolicy {
            auto_retry: true,
            max_retries: config.retry.max_retries,
        }
    };
    let transport = UreqTransport::new(config.timeout);
    Reader::from_config(&config, transport)
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let reader = build_reader(&cli);

    match cli.command {
        Commands::List {
            location,
            category,
            updated_after,
            tag,
            limit,
            cursor,
            html,
            full,
        } => {
            let filter = ListFilter {
                location,
                category,
                updated_after,
                tag,
                limit,
                page_cursor: cursor,
                with_html_content: html,
                ..ListFilter::default()
            };
            let documents = reader.list_documents(&filter)?;
            if full {
                print_json(&documents)?;
            } else {
                let summaries: Vec<DocumentSummary> =
                    documents.iter().map(DocumentSummary::from).collect();
                print_json(&summaries)?;
            }
        }
        Commands::Get { id } => match reader.get_document_by_id(&id)? {
            Some(document) => print_json(&document)?,
            None => return Err(format!("no document with ID {id:?} could be found").into()),
        },
        Commands::Save {
            url,
            html_file,
            clean_html,
            title,
            author,
            summary,
            published_date,
            image_url,
            location,
            category,
            tags,
            notes,
        } => {
            let html = html_file.map(std::fs::read_to_string).transpose()?;
            let input = SaveRequest {
                url,
                html,
                should_clean_html: clean_html.then_some(true),
                title,
                author,
                summary,
                published_date,
                image_url,
                location,
                category,
                saved_using: Some("readwise-cli".to_string()),
                tags: (!tags.is_empty()).then_some(tags),
                notes,
            };
            let saved = reader.save_document(&input)?;
            if saved.created {
                println!("Saved new document {:?} ({}).", saved.id, saved.url);
            } else {
                println!(
                    "This document has already been saved earlier with ID {:?} ({}).",
                    saved.id, saved.url
                );
            }
        }
        Commands::Search { url } => match reader.search_document(&url)? {
            Some(document) => print_json(&document)?,
            None => return Err(format!("no document found with URL {url}").into()),
        },
        Commands::Move { id, location } => {
            let result = reader.update_document_location(&id, location)?;
            match result.message {
                Some(message) => println!("Moved {id:?} to {location}: {message}"),
                None => println!("Moved {id:?} to {location}."),
            }
        }
        Commands::Delete { id, url } => {
            let target = match (id, url) {
                (Some(id), _) => DeleteTarget::Id(id),
                (None, Some(url)) => DeleteTarget::Url(url),
                (None, None) => return Err("either --id or --url must be provided".into()),
            };
            let result = reader.delete_document(&target)?;
            if !result.success {
                let message = result.message.unwrap_or_else(|| "delete was rejected".to_string());
                return Err(message.into());
            }
            println!("Deleted.");
        }
        Commands::Auth => {
            if reader.validate_token(None)? {
                println!("Token is valid.");
            } else {
                return Err("token is invalid".into());
            }
        }
    }

    Ok(())
}
