//! quill - read and write a Quill blog from the terminal

use std::io::{self, Read};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use libquill::api::HttpApi;
use libquill::events::EventReceiver;
use libquill::logging::{level_from_env, LogFormat, LoggingConfig};
use libquill::session::open_token_store;
use libquill::store::STORAGE_FAILED_TITLE;
use libquill::{Config, Event, EventBus, QuillError, Store, StoreBuilder};
use secrecy::SecretString;

#[derive(Parser, Debug)]
#[command(name = "quill")]
#[command(version, about = "Read and write a Quill blog")]
#[command(long_about = "\
quill - Read and write a Quill blog

USAGE:
    # List articles
    quill articles
    quill articles --format json | jq '.[].title'

    # Sign in and stay signed in across runs
    quill sign-in alice --remember

    # Post an article, body from stdin
    echo \"Body text\" | quill post \"My title\"

    # Who am I?
    quill whoami

CONFIGURATION:
    Configuration file: ~/.config/quill/config.toml (or QUILL_CONFIG)

    [api]
    base_url = \"http://localhost:8000\"   # or QUILL_API_URL
    timeout_secs = 30

    [session]
    storage = \"file\"                     # file, keyring or memory
    path = \"~/.local/share/quill/session\"

    QUILL_PASSWORD supplies the password when stdin is not a terminal.

EXIT CODES:
    0 - Success
    1 - Network, storage or configuration error
    2 - Not signed in / authentication failed
    3 - Invalid input
")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Path to the configuration file
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Base URL of the blog API (overrides config)
    #[arg(long, global = true, value_name = "URL")]
    api_url: Option<String>,

    /// Enable verbose logging to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log output format: text, json or pretty
    #[arg(long, global = true, env = "QUILL_LOG_FORMAT", default_value = "text")]
    log_format: LogFormat,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List articles
    Articles {
        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        #[arg(value_parser = ["text", "json"])]
        format: String,
    },

    /// Post a new article
    Post {
        /// Article title
        title: String,

        /// Article body (reads from stdin if not provided)
        body: Option<String>,
    },

    /// Sign in with a username and password
    SignIn {
        username: String,

        /// Remember the session for later runs
        #[arg(long)]
        remember: bool,
    },

    /// Create an account and sign in with it
    SignUp {
        username: String,

        #[arg(long)]
        email: Option<String>,

        /// Remember the session for later runs
        #[arg(long)]
        remember: bool,
    },

    /// Forget the remembered session
    SignOut,

    /// Show the signed-in user
    Whoami,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    LoggingConfig::new(cli.log_format, level_from_env(), cli.verbose).init();

    if let Err(e) = run(cli).await {
        // Failures the store notified about were already printed by drain_events
        let code = match e.downcast_ref::<AlreadyReported>() {
            Some(AlreadyReported(code)) => *code,
            None => {
                eprintln!("Error: {:#}", e);
                e.downcast_ref::<QuillError>()
                    .map(QuillError::exit_code)
                    .unwrap_or(1)
            }
        };
        std::process::exit(code);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = Config::load_from(cli.config.as_deref())?;
    if let Some(url) = cli.api_url {
        config.api.base_url = url;
    }

    let api = Arc::new(HttpApi::new(&config.api)?);
    tracing::debug!("Using API at {}", api.base_url());
    let tokens = open_token_store(&config.session).map_err(QuillError::from)?;

    let events = EventBus::default();
    let mut receiver = events.subscribe();
    let store = StoreBuilder::new(api, tokens)
        .event_bus(events)
        .create()
        .await;

    let result = execute(&store, cli.command, &mut receiver).await;
    drain_events(&mut receiver);
    result
}

async fn execute(store: &Store, command: Command, receiver: &mut EventReceiver) -> Result<()> {
    match command {
        Command::Articles { format } => {
            // The list was fetched while the store initialized
            if !drain_events(receiver).articles_loaded {
                return Err(AlreadyReported(1).into());
            }
            print_articles(store, &format)
        }
        Command::Post { title, body } => {
            let body = match body {
                Some(body) => body,
                None => read_stdin().context("Failed to read article body from stdin")?,
            };
            if title.trim().is_empty() {
                return Err(QuillError::Validation("Title cannot be empty".to_string()).into());
            }
            store
                .post_article(&title, &body)
                .await
                .map_err(|e| AlreadyReported(e.exit_code()))?;
            println!("Posted \"{}\" ({} articles)", title, store.article_count());
            Ok(())
        }
        Command::SignIn { username, remember } => {
            let password = read_password(&username)?;
            store.sign_in(&username, password, remember).await;
            require_signed_in(store)
        }
        Command::SignUp {
            username,
            email,
            remember,
        } => {
            let password = read_password(&username)?;
            store
                .sign_up(&username, email.as_deref(), password, remember)
                .await;
            require_signed_in(store)
        }
        Command::SignOut => {
            store.sign_out();
            let reported = drain_events(receiver);
            if reported.titles.iter().any(|t| t == STORAGE_FAILED_TITLE) {
                return Err(AlreadyReported(1).into());
            }
            println!("Signed out");
            Ok(())
        }
        Command::Whoami => require_signed_in(store),
    }
}

fn print_articles(store: &Store, format: &str) -> Result<()> {
    let articles = store.articles();
    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&articles)?);
        return Ok(());
    }

    if articles.is_empty() {
        println!("No articles");
    }
    for article in articles {
        println!("{}", article.title);
        if !article.body.is_empty() {
            println!("    {}", article.body.replace('\n', "\n    "));
        }
    }
    Ok(())
}

fn require_signed_in(store: &Store) -> Result<()> {
    match store.user() {
        Some(user) => {
            match user.email {
                Some(email) => println!("{} <{}>", user.username, email),
                None => println!("{}", user.username),
            }
            Ok(())
        }
        None => Err(QuillError::NotAuthenticated("no active session".to_string()).into()),
    }
}

/// Password from `QUILL_PASSWORD`, or a prompt when stdin is a terminal
fn read_password(username: &str) -> Result<SecretString> {
    if let Ok(password) = std::env::var("QUILL_PASSWORD") {
        return Ok(SecretString::from(password));
    }

    if !atty::is(atty::Stream::Stdin) {
        return Err(QuillError::Validation(
            "Not a TTY. Set QUILL_PASSWORD to sign in non-interactively.".to_string(),
        )
        .into());
    }

    let password = rpassword::prompt_password(format!("Password for {}: ", username))?;
    Ok(SecretString::from(password))
}

fn read_stdin() -> io::Result<String> {
    let mut buffer = String::new();
    io::stdin().read_to_string(&mut buffer)?;
    Ok(buffer.trim_end_matches('\n').to_string())
}

/// A failure the store already reported, carrying only the exit code
#[derive(Debug)]
struct AlreadyReported(i32);

impl std::fmt::Display for AlreadyReported {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "failure already reported (exit code {})", self.0)
    }
}

impl std::error::Error for AlreadyReported {}

/// What the store reported since the last drain
#[derive(Default)]
struct Reported {
    titles: Vec<String>,
    articles_loaded: bool,
}

/// Print pending error notifications to stderr
fn drain_events(receiver: &mut EventReceiver) -> Reported {
    let mut reported = Reported::default();
    while let Ok(event) = receiver.try_recv() {
        match event {
            Event::Notification { title, description } => {
                eprintln!("{}: {}", title, description);
                reported.titles.push(title);
            }
            Event::ArticlesLoaded { .. } => reported.articles_loaded = true,
            _ => {}
        }
    }
    reported
}
