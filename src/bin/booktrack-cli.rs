//! Booktrack CLI
//!
//! One-shot commands against the reading-tracker backend. The session is kept
//! in the local SQLite credential store between invocations.

use anyhow::{bail, Context, Result};
use booktrack_client::tracker::book::BookListener;
use booktrack_client::{BookDraft, BookResource, BookStatus, ClientConfig, TrackerClient};
use chrono::NaiveDate;
use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Booktrack CLI
#[derive(Parser, Debug)]
#[command(name = "booktrack-cli")]
#[command(about = "Reading tracker client - manage your books from the terminal", long_about = None)]
struct Args {
    /// Backend base URL
    #[arg(long, env = "BOOKTRACK_API_URL", default_value = "http://localhost:3000")]
    api_url: String,

    /// SQLite URL of the credential store
    #[arg(long, env = "BOOKTRACK_DB", default_value = "sqlite://booktrack.db?mode=rwc")]
    db: String,

    /// Stamp today's date on books marked read without a completion date
    #[arg(long, env = "BOOKTRACK_AUTO_STAMP")]
    auto_stamp: bool,

    /// Log filter (RUST_LOG takes precedence)
    #[arg(long, default_value = "warn,booktrack_client=info")]
    log_level: String,

    /// Also append logs to this file
    #[arg(long)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create an account (does not sign in)
    Register {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long, env = "BOOKTRACK_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Sign in and remember the session
    Login {
        #[arg(long)]
        email: String,
        #[arg(long, env = "BOOKTRACK_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Forget the stored session
    Logout,
    /// Show the signed-in user
    Whoami,
    /// List your books
    List,
    /// Add a book
    Add(BookFields),
    /// Edit a book; only the given fields change
    Edit {
        id: String,
        #[command(flatten)]
        fields: EditFields,
    },
    /// Remove a book
    Remove { id: String },
    /// Delete your account and sign out
    DeleteAccount {
        /// Required, the deletion cannot be undone
        #[arg(long)]
        yes: bool,
    },
}

#[derive(ClapArgs, Debug)]
struct BookFields {
    #[arg(long)]
    title: String,
    #[arg(long)]
    author: Option<String>,
    #[arg(long)]
    description: Option<String>,
    /// want-to-read, reading or read
    #[arg(long, default_value = "want-to-read")]
    status: BookStatus,
    /// 1-5, required for read books
    #[arg(long)]
    rating: Option<u8>,
    /// YYYY-MM-DD, required for read books unless auto-stamp is on
    #[arg(long)]
    completed: Option<NaiveDate>,
}

#[derive(ClapArgs, Debug)]
struct EditFields {
    #[arg(long)]
    title: Option<String>,
    #[arg(long)]
    author: Option<String>,
    #[arg(long)]
    description: Option<String>,
    #[arg(long)]
    status: Option<BookStatus>,
    #[arg(long)]
    rating: Option<u8>,
    #[arg(long)]
    completed: Option<NaiveDate>,
}

impl EditFields {
    fn apply(self, draft: &mut BookDraft) {
        if let Some(title) = self.title {
            draft.title = title;
        }
        if let Some(author) = self.author {
            draft.author = author;
        }
        if let Some(description) = self.description {
            draft.description = description;
        }
        if let Some(status) = self.status {
            draft.status = status;
        }
        if let Some(rating) = self.rating {
            draft.rating = rating;
        }
        if let Some(date) = self.completed {
            draft.completion_date = Some(date);
        }
    }
}

/// Logs to stderr, and to `log_file` when given
fn init_logger(log_level: &str, log_file: Option<&PathBuf>) -> Result<()> {
    use std::fs::OpenOptions;
    use std::io;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let filter_layer =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stderr)
        .with_file(true)
        .with_line_number(true)
        .with_target(false)
        .with_ansi(true);

    let file_layer = match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("cannot open log file {}", path.display()))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_writer(file)
                    .with_file(true)
                    .with_line_number(true)
                    .with_target(false)
                    .with_ansi(false),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(stderr_layer)
        .with(file_layer)
        .init();

    if let Some(path) = log_file {
        debug!("[CLI] 📝 logging to {}", path.display());
    }
    Ok(())
}

struct CliBookListener;

#[async_trait::async_trait]
impl BookListener for CliBookListener {
    async fn on_book_list_changed(&self, books_json: String) {
        debug!("[CLI/Books] 📚 collection changed: {}", books_json);
    }

    async fn on_loading_changed(&self, loading: bool) {
        debug!("[CLI/Books] loading={}", loading);
    }

    async fn on_operation_failed(&self, message: String) {
        error!("[CLI/Books] ❌ {}", message);
    }
}

fn print_book(book: &BookResource) {
    let mut line = format!("{:>6}  {:<12} {}", book.id, book.status.as_str(), book.title);
    if let Some(author) = &book.author {
        line.push_str(&format!(" ({author})"));
    }
    if let Some(rating) = book.rating {
        line.push_str(&format!("  {}", "*".repeat(rating as usize)));
    }
    if let Some(date) = book.completion_date {
        line.push_str(&format!("  finished {date}"));
    }
    println!("{line}");
}

fn require_session(client: &TrackerClient) -> Result<()> {
    if !client.session().is_authenticated() {
        bail!("not signed in; run `booktrack-cli login` first");
    }
    Ok(())
}

async fn run(client: &TrackerClient, command: Command) -> Result<()> {
    match command {
        Command::Register {
            name,
            email,
            password,
        } => {
            client.session().register(&name, &email, &password).await?;
            println!("Account created for {email}. Sign in with `booktrack-cli login`.");
        }
        Command::Login { email, password } => {
            let user = client.session().sign_in(&email, &password).await?;
            println!("Signed in as {} <{}>", user.name, user.email);
        }
        Command::Logout => {
            client.session().sign_out().await?;
            println!("Signed out.");
        }
        Command::Whoami => match client.session().current_user() {
            Some(user) => {
                println!("{} <{}> (id {})", user.name, user.email, user.id);
                let expiry = client
                    .session()
                    .bearer_claims()
                    .and_then(|c| c.exp)
                    .and_then(|exp| chrono::DateTime::from_timestamp(exp, 0));
                if let Some(expiry) = expiry {
                    println!("token expires {} (unverified)", expiry.to_rfc3339());
                }
            }
            None => println!("Not signed in."),
        },
        Command::List => {
            require_session(client)?;
            let books = client.collection_with_listener(Arc::new(CliBookListener));
            books.load().await?;
            if books.is_empty() {
                println!("No books yet.");
            }
            for book in books.books() {
                print_book(&book);
            }
            books.detach();
        }
        Command::Add(fields) => {
            require_session(client)?;
            let books = client.collection_with_listener(Arc::new(CliBookListener));
            let mut form = client.form(books.clone());
            form.begin_create();
            let draft = BookDraft {
                id: None,
                title: fields.title,
                author: fields.author.unwrap_or_default(),
                description: fields.description.unwrap_or_default(),
                status: fields.status,
                rating: fields.rating.unwrap_or(0),
                completion_date: fields.completed,
            };
            let book = form.submit(draft).await?;
            print!("Added: ");
            print_book(&book);
            books.detach();
        }
        Command::Edit { id, fields } => {
            require_session(client)?;
            let books = client.collection_with_listener(Arc::new(CliBookListener));
            books.load().await?;
            let Some(book) = books.get(&id) else {
                bail!("no book with id {id} in your collection");
            };
            let mut form = client.form(books.clone());
            form.begin_edit(book);
            fields.apply(form.draft_mut());
            let book = form.submit_current().await?;
            print!("Updated: ");
            print_book(&book);
            books.detach();
        }
        Command::Remove { id } => {
            require_session(client)?;
            let books = client.collection_with_listener(Arc::new(CliBookListener));
            books.remove(&id).await?;
            println!("Removed book {id}.");
            books.detach();
        }
        Command::DeleteAccount { yes } => {
            if !yes {
                bail!("refusing to delete the account without --yes");
            }
            client.session().delete_account().await?;
            println!("Account deleted and signed out.");
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logger(&args.log_level, args.log_file.as_ref())?;

    let mut config = ClientConfig::new(args.api_url);
    config.credential_db_url = args.db;
    config.auto_stamp_completion = args.auto_stamp;
    debug!("[CLI] config: {:?}", config);

    let client = TrackerClient::connect(config).await?;

    if let Err(e) = run(&client, args.command).await {
        if let Some(notice) = client.notices().message() {
            info!("[CLI] last notice: {}", notice);
        }
        return Err(e);
    }
    Ok(())
}
