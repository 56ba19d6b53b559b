use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use gdata::async_ops::{
    AsyncDataHandler, AsyncRequest, CompletedEvent, CompletionOutcome, OperationContext,
    OperationEvent, Payload, ProgressEvent, ResponseMode,
};
use gdata::atom::{AtomEntry, AtomFeed, Links};
use gdata::auth::{AuthError, ClientLogin, Credentials};
use gdata::config::Config;
use gdata::query::FeedQuery;
use gdata::transport::HttpTransport;
use secrecy::{ExposeSecret, SecretString};
use std::fmt::Write as _;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use url::Url;

/// Password source for `login`; never taken from the command line.
const PASSWORD_ENV: &str = "GDATA_PASSWORD";

#[derive(Parser, Debug)]
#[command(name = "gdata", about = "Fetch GData feeds and entries from the command line")]
struct Args {
    /// Config file (default: ~/.config/gdata/config.toml)
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch a feed or entry, printing progress to stderr (Ctrl+C cancels)
    Fetch {
        url: String,

        /// Write the response body untouched instead of a summary
        #[arg(long, conflicts_with = "entry")]
        raw: bool,

        /// Parse the response as a single entry rather than a feed
        #[arg(long)]
        entry: bool,

        /// Write output to FILE instead of stdout
        #[arg(long, short, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Correlation token for the operation
        #[arg(long, default_value = "gdata-cli")]
        user_data: String,

        /// Full-text query (q)
        #[arg(long, short)]
        query: Option<String>,

        /// Category filter, repeatable (path /-/a/b)
        #[arg(long)]
        category: Vec<String>,

        #[arg(long)]
        start_index: Option<u32>,

        #[arg(long)]
        max_results: Option<u32>,
    },
    /// Obtain a ClientLogin token (password from GDATA_PASSWORD)
    Login {
        #[arg(long)]
        username: String,

        /// Service code, e.g. `cp` for contacts (default: config `service`)
        #[arg(long)]
        service: Option<String>,

        #[arg(long)]
        account_type: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config_path = args.config.clone().or_else(Config::default_path);
    let mut config = match &config_path {
        Some(path) => Config::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => Config::default(),
    };
    config.apply_env();

    match args.command {
        Command::Fetch {
            url,
            raw,
            entry,
            output,
            user_data,
            query,
            category,
            start_index,
            max_results,
        } => {
            let mut feed_query = FeedQuery::new(Url::parse(&url).context("Invalid URL")?);
            feed_query.text = query;
            feed_query.categories = category;
            if let Some(index) = start_index {
                feed_query = feed_query.start_index(index)?;
            }
            if let Some(max) = max_results {
                feed_query = feed_query.max_results(max)?;
            }
            let mode = if raw {
                ResponseMode::Raw
            } else if entry {
                ResponseMode::Entry
            } else {
                ResponseMode::Feed
            };
            let request = AsyncRequest::get(feed_query.to_url(), user_data).with_mode(mode);
            fetch(&config, request, output.as_deref()).await
        }
        Command::Login {
            username,
            service,
            account_type,
        } => login(&config, username, service, account_type).await,
    }
}

async fn fetch(config: &Config, request: AsyncRequest, output: Option<&Path>) -> Result<()> {
    let authenticator = config
        .authenticator()
        .context("Invalid [auth] configuration")?;
    let transport = HttpTransport::new(config.request_settings(), authenticator);
    let handler = AsyncDataHandler::new(Arc::new(transport));

    let (context, mut events) = OperationContext::channel();
    let id = handler
        .submit(request, context)
        .context("Failed to start request")?;

    let mut cancel_requested = false;
    let done: CompletedEvent = loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(OperationEvent::Progress(progress)) => print_progress(&progress),
                Some(OperationEvent::Completed(done)) => break done,
                None => anyhow::bail!("Operation channel closed without a completion"),
            },
            signal = tokio::signal::ctrl_c(), if !cancel_requested => {
                signal.context("Failed to listen for Ctrl+C")?;
                cancel_requested = true;
                eprintln!("\nCancelling...");
                handler.cancel(&id);
            }
        }
    };
    eprintln!();

    let payload = match done.outcome {
        CompletionOutcome::Succeeded(payload) => payload,
        CompletionOutcome::Cancelled => {
            eprintln!("Cancelled.");
            std::process::exit(130);
        }
        CompletionOutcome::Failed(e) => {
            return Err(anyhow::Error::new(e).context(format!("Request {} failed", done.user_data)))
        }
    };

    let bytes = match payload {
        Payload::Stream(buffer) => buffer.into_inner(),
        Payload::Feed(feed) => summarize_feed(&feed).into_bytes(),
        Payload::Entry(entry) => summarize_entry(&entry).into_bytes(),
        Payload::Empty => {
            eprintln!("Server returned no content.");
            return Ok(());
        }
    };

    match output {
        Some(path) => {
            atomic_write(path, &bytes)?;
            eprintln!("Wrote {} bytes to {}", bytes.len(), path.display());
        }
        None => std::io::stdout()
            .write_all(&bytes)
            .context("Failed to write to stdout")?,
    }
    Ok(())
}

fn print_progress(progress: &ProgressEvent) {
    match progress.complete_size {
        Some(total) => eprint!(
            "\r{} / {} bytes ({}%)",
            progress.position, total, progress.percent
        ),
        None => eprint!("\r{} bytes", progress.position),
    }
}

fn summarize_feed(feed: &AtomFeed) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", feed.title_text());
    if let Some(total) = feed.total_results {
        let _ = writeln!(
            out,
            "{} results (from {}, {} per page)",
            total,
            feed.start_index.unwrap_or(1),
            feed.items_per_page.unwrap_or(feed.entries.len() as u64)
        );
    }
    for entry in &feed.entries {
        let _ = writeln!(out, "  - {}", entry.title_text());
        if let Some(link) = entry.alternate_link().or_else(|| entry.self_link()) {
            let _ = writeln!(out, "    {}", link.href);
        }
    }
    if let Some(next) = feed.next_link() {
        let _ = writeln!(out, "next: {}", next.href);
    }
    out
}

fn summarize_entry(entry: &AtomEntry) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", entry.title_text());
    if let Some(id) = &entry.id {
        let _ = writeln!(out, "id: {}", id);
    }
    if let Some(updated) = entry.updated {
        let _ = writeln!(out, "updated: {}", updated.to_rfc3339());
    }
    if let Some(edit) = entry.edit_link() {
        let _ = writeln!(out, "edit: {}", edit.href);
    }
    for category in &entry.categories {
        let _ = writeln!(out, "category: {}", category.term);
    }
    if let Some(content) = &entry.content {
        let _ = writeln!(out, "\n{}", content.text);
    }
    out
}

async fn login(
    config: &Config,
    username: String,
    service: Option<String>,
    account_type: Option<String>,
) -> Result<()> {
    let password = std::env::var(PASSWORD_ENV)
        .map(SecretString::from)
        .with_context(|| format!("Set {} to the account password", PASSWORD_ENV))?;
    let service = service
        .or_else(|| (!config.service.is_empty()).then(|| config.service.clone()))
        .context("No service given: pass --service or set `service` in the config")?;

    let mut credentials = Credentials::new(username, password);
    if let Some(account_type) = account_type {
        credentials = credentials.with_account_type(account_type);
    }
    let login = ClientLogin::new(credentials, service, config.application_name.clone())?;
    let settings = config.request_settings();

    // The blocking client must not be built or used on a runtime thread
    let token = tokio::task::spawn_blocking(move || {
        let transport = HttpTransport::anonymous(settings);
        let client = transport.client()?;
        login.query_token(client).map_err(anyhow::Error::from)
    })
    .await
    .context("Login task failed")?;

    match token {
        Ok(token) => {
            println!("{}", token.expose_secret());
            Ok(())
        }
        Err(e) => match e.downcast_ref::<AuthError>() {
            Some(AuthError::CaptchaRequired { token, url }) => anyhow::bail!(
                "Login requires a CAPTCHA (token {}); solve it at {} and retry",
                token,
                url.as_deref().unwrap_or("the Google accounts page")
            ),
            _ => Err(e.context("Login failed")),
        },
    }
}

/// Writes via a temp file and rename so `path` is never left half-written.
fn atomic_write(path: &Path, bytes: &[u8]) -> Result<()> {
    use std::time::{SystemTime, UNIX_EPOCH};
    let random_suffix = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let temp_path = path.with_extension(format!("tmp.{:016x}", random_suffix));

    let mut temp_file = std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&temp_path)
        .with_context(|| format!("Failed to create temporary file '{}'", temp_path.display()))?;

    let written = temp_file
        .write_all(bytes)
        .and_then(|_| temp_file.sync_all());
    drop(temp_file);
    if let Err(e) = written {
        let _ = std::fs::remove_file(&temp_path);
        return Err(e).with_context(|| format!("Failed to write '{}'", temp_path.display()));
    }

    std::fs::rename(&temp_path, path).with_context(|| {
        let _ = std::fs::remove_file(&temp_path);
        format!(
            "Failed to rename '{}' to '{}'",
            temp_path.display(),
            path.display()
        )
    })
}
