use std::fs::OpenOptions;

use anyhow::{Result, anyhow};
use clap::{Parser, Subcommand};
use log::{LevelFilter, info, warn};
use serde::Serialize;

use rs_delivery_mail::auth::callback::{CallbackListener, DEFAULT_CALLBACK_TIMEOUT, open_in_browser};
use rs_delivery_mail::auth::{OAuthClient, OAuthSettings, Session, secret_store};
use rs_delivery_mail::config::{Config, load_config, log_path};
use rs_delivery_mail::delivery::{self, DeliveryHint};
use rs_delivery_mail::domain::email::MessageSummary;
use rs_delivery_mail::inbox::{Inbox, PageLoad};
use rs_delivery_mail::mail::gmail_client::GmailClient;
use rs_delivery_mail::mail::decoders::body_snippet;
use rs_delivery_mail::mail::provider::MailProvider;
use rs_delivery_mail::store::{DeliveryRepository, SqliteRepo, now_epoch, record_deliveries};
use rs_delivery_mail::terminal::{Backend, run_tui};

#[derive(Parser)]
#[command(name = "rs_delivery_mail")]
#[command(about = "Read-only Gmail client that spots delivery e-mails", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the TUI (default)
    Tui,

    /// Print messages to stdout
    List {
        /// Messages per page (defaults to the configured page size)
        #[arg(long)]
        page_size: Option<u32>,

        /// How many pages to walk
        #[arg(long, default_value_t = 1)]
        pages: u32,

        /// Only print messages that look like delivery e-mails
        #[arg(long)]
        delivery_only: bool,

        /// Emit JSON instead of one line per message
        #[arg(long)]
        json: bool,

        /// Do not add flagged messages to the delivery history
        #[arg(long)]
        no_history: bool,
    },

    /// Print the recorded delivery e-mails of the signed-in account
    History {
        /// Emit JSON instead of one line per record
        #[arg(long)]
        json: bool,
    },

    /// Delete the recorded delivery e-mails of the signed-in account
    ClearHistory,

    /// Store the OAuth client secret in keyring
    SetClientSecret {
        #[arg(long)]
        client_id: String,
    },

    /// Remove the OAuth client secret from keyring
    ForgetClientSecret {
        #[arg(long)]
        client_id: String,
    },
}

#[derive(Serialize)]
struct ListedMessage<'a> {
    #[serde(flatten)]
    message: &'a MessageSummary,
    delivery: Option<DeliveryHint>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let cmd = cli.cmd.unwrap_or(Command::Tui);
    init_logging(matches!(cmd, Command::Tui));

    match cmd {
        Command::SetClientSecret { client_id } => {
            eprintln!("Paste client secret (end with Ctrl-D):");
            let mut secret = String::new();
            std::io::Read::read_to_string(&mut std::io::stdin(), &mut secret)?;
            let secret = secret.trim();
            if secret.is_empty() {
                return Err(anyhow!("empty client secret, nothing saved"));
            }
            secret_store::save_client_secret(&client_id, secret)?;
            println!("Saved client secret for client_id {}", client_id);
            Ok(())
        }

        Command::ForgetClientSecret { client_id } => {
            secret_store::delete_client_secret(&client_id)?;
            println!("Removed client secret for client_id {}", client_id);
            Ok(())
        }

        Command::Tui => {
            let cfg = load_config().map_err(|e| anyhow!("Configuration error: {e}"))?;
            let history: Option<Box<dyn DeliveryRepository>> = match open_history(&cfg) {
                Ok(repo) => Some(Box::new(repo)),
                Err(e) => {
                    warn!("Delivery history unavailable: {e}");
                    None
                }
            };
            run_tui(Backend {
                session: build_session(&cfg)?,
                inbox: Inbox::new(cfg.page_size()),
                provider: GmailClient::new(cfg.api_base_url())?,
                redirect_uri: cfg.redirect_uri().to_string(),
                history,
            })
        }

        Command::List {
            page_size,
            pages,
            delivery_only,
            json,
            no_history,
        } => {
            let cfg = load_config().map_err(|e| anyhow!("Configuration error: {e}"))?;
            let page_size = page_size.unwrap_or(cfg.page_size()).clamp(1, 500);
            let history = if no_history { None } else { Some(open_history(&cfg)?) };
            list(&cfg, page_size, pages.max(1), delivery_only, json, history.as_ref())
        }

        Command::History { json } => {
            let cfg = load_config().map_err(|e| anyhow!("Configuration error: {e}"))?;
            let repo = open_history(&cfg)?;
            let account = signed_in_account(&cfg)?;
            print_history(&repo, &account, json)
        }

        Command::ClearHistory => {
            let cfg = load_config().map_err(|e| anyhow!("Configuration error: {e}"))?;
            let repo = open_history(&cfg)?;
            let account = signed_in_account(&cfg)?;
            let removed = repo.clear(&account)?;
            println!("Removed {removed} delivery record(s) for {account}");
            Ok(())
        }
    }
}

fn init_logging(to_file: bool) {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"));
    // The TUI owns the terminal, so its logs go to a file.
    if to_file {
        let file = log_path().and_then(|p| Ok(OpenOptions::new().create(true).append(true).open(p)?));
        match file {
            Ok(f) => {
                builder.target(env_logger::Target::Pipe(Box::new(f)));
            }
            Err(e) => {
                eprintln!("Logging disabled: {e}");
                builder.filter_level(LevelFilter::Off);
            }
        }
    }
    builder.init();
}

fn build_session(cfg: &Config) -> Result<Session<OAuthClient>> {
    let secret = secret_store::resolve_client_secret(&cfg.client_id);
    if secret.is_none() {
        info!("No client secret found; relying on PKCE alone");
    }
    let settings = OAuthSettings::from_config(cfg, secret);
    Ok(Session::new(OAuthClient::new(&settings)?))
}

fn open_history(cfg: &Config) -> Result<SqliteRepo> {
    let path = cfg.history_path()?;
    SqliteRepo::open(&path).map_err(|e| anyhow!("Cannot open delivery history {}: {e}", path.display()))
}

/// Signs in (through the browser when needed) and loads the first page.
fn signed_in<P: MailProvider>(
    cfg: &Config,
    inbox: &mut Inbox,
    provider: &P,
) -> Result<Session<OAuthClient>> {
    let mut session = build_session(cfg)?;
    if let PageLoad::SignInRequired(pending) = inbox.load_first(&mut session, provider)? {
        let listener = CallbackListener::bind(cfg.redirect_uri())?;
        eprintln!("Opening browser for consent...");
        eprintln!("If it doesn't open, visit:\n{}", pending.authorize_url);
        open_in_browser(pending.authorize_url.as_str());

        let code = listener.wait_for_code(&pending.state, DEFAULT_CALLBACK_TIMEOUT)?;
        session.complete_authorization(&code)?;
        if let PageLoad::SignInRequired(_) = inbox.load_first(&mut session, provider)? {
            return Err(anyhow!("sign-in did not produce a usable credential"));
        }
    }
    Ok(session)
}

/// History is kept per account, so commands on it need the address.
fn signed_in_account(cfg: &Config) -> Result<String> {
    let provider = GmailClient::new(cfg.api_base_url())?;
    let mut inbox = Inbox::new(1);
    let mut session = signed_in(cfg, &mut inbox, &provider)?;
    inbox
        .account(&mut session, &provider)
        .map(str::to_string)
        .ok_or_else(|| anyhow!("could not look up the signed-in account"))
}

fn print_history(repo: &SqliteRepo, account: &str, json: bool) -> Result<()> {
    let records = repo.history(account)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }
    if records.is_empty() {
        println!("No delivery e-mails recorded for {account} yet.");
        return Ok(());
    }
    for r in &records {
        println!(
            "{:<31} {:<10} {} | {}",
            r.date,
            r.carrier.as_deref().unwrap_or("-"),
            r.sender,
            r.subject
        );
    }
    let counts: Vec<String> = repo
        .carrier_counts(account)?
        .into_iter()
        .map(|(carrier, n)| format!("{carrier}: {n}"))
        .collect();
    println!("{} record(s); {}", records.len(), counts.join(", "));
    Ok(())
}

fn list(
    cfg: &Config,
    page_size: u32,
    pages: u32,
    delivery_only: bool,
    json: bool,
    history: Option<&SqliteRepo>,
) -> Result<()> {
    let provider = GmailClient::new(cfg.api_base_url())?;
    let mut inbox = Inbox::new(page_size);
    inbox.set_delivery_only(delivery_only);
    let mut session = signed_in(cfg, &mut inbox, &provider)?;

    if let Some(account) = inbox.account(&mut session, &provider) {
        eprintln!("Signed in as {account}");
    }

    let mut listed = Vec::new();
    for n in 0..pages {
        if n > 0 {
            if !inbox.has_next() {
                break;
            }
            inbox.next_page(&mut session, &provider)?;
        }
        if let (Some(repo), Some(account)) = (history, inbox.cached_account()) {
            let added = record_deliveries(repo, account, &inbox.page().messages, now_epoch())?;
            if added > 0 {
                info!("Added {added} delivery e-mail(s) to the history");
            }
        }
        for message in inbox.visible() {
            if json {
                listed.push(serde_json::to_value(ListedMessage {
                    message,
                    delivery: delivery::classify(message),
                })?);
            } else {
                println!(
                    "{:<16} {:<31} {} | {} | {}",
                    message.id,
                    message.date,
                    message.sender,
                    message.subject,
                    body_snippet(message, 80)
                );
            }
        }
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&listed)?);
    }
    Ok(())
}
