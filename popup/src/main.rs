// GreenPoints popup: balance lookups and admin actions routed through the
// extension bridge.

mod status;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use greenpoints_bridge::{
    build_local, AddressBook, BalanceQuery, BridgeConfig, BridgeError, DecimalsCache, Dispatcher,
    LedgerClient, LocalTab, PageCompatibility, ProviderSlot, Request, TabInfo,
};
use status::Status;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "greenpoints")]
#[command(about = "GreenPoints popup: balances and admin actions", long_about = None)]
struct Cli {
    /// Config file (falls back to CONFIG_PATH, then greenpoints.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Remembered addresses
    #[arg(long, global = true, default_value = ".greenpoints/addresses.json")]
    settings: PathBuf,

    /// URL of the active tab
    #[arg(long, global = true, default_value = "https://example.com")]
    url: String,

    /// Admin (coin publisher) address
    #[arg(long, global = true)]
    admin: Option<String>,

    /// Student address
    #[arg(long, global = true)]
    student: Option<String>,

    /// Merchant address
    #[arg(long, global = true)]
    merchant: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect the wallet
    Connect,

    /// Show the student's balance
    Balance,

    /// Award points to the student
    Award {
        #[arg(short, long)]
        amount: String,
    },

    /// Redeem points from the student
    Redeem {
        #[arg(short, long)]
        amount: String,
    },

    /// Register the connected wallet as a student
    Register,

    /// Approve the merchant
    AddMerchant,

    /// Revoke the merchant
    RemoveMerchant,

    /// Re-inject the content script into the active page
    Reload,

    /// Look up an account on the ledger
    Account { address: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "greenpoints_bridge=info,greenpoints=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let config_path = cli
        .config
        .clone()
        .or_else(|| std::env::var("CONFIG_PATH").ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("greenpoints.toml"));
    let config = BridgeConfig::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;
    info!("Ledger endpoint: {}", config.ledger.rpc_url);

    let mut book = AddressBook::load(&cli.settings)?;
    let before = book.clone();
    book.merge(cli.admin.clone(), cli.student.clone(), cli.merchant.clone());
    if book != before {
        book.save(&cli.settings)?;
    }

    let lines = match &cli.command {
        Commands::Account { address } => account(&config, address, book.admin.as_deref()).await?,
        command => {
            let dispatcher = build_local(&config, TabInfo::new(1, cli.url.clone()), ProviderSlot::empty())?;
            match dispatcher.prepare().await {
                PageCompatibility::Compatible => info!("Page compatible with extension"),
                PageCompatibility::Limited => println!(
                    "⚠️  Limited features on this page. For full features, visit a regular website"
                ),
                PageCompatibility::NoTab => {}
            }
            run(&dispatcher, command, &book).await
        }
    };

    let failed = lines.iter().any(|s| s.is_error);
    for line in &lines {
        println!("{}", line);
    }
    if failed {
        std::process::exit(1);
    }
    Ok(())
}

fn required(value: &Option<String>, missing: &str) -> Result<String, Status> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => Err(Status::error(missing)),
    }
}

async fn run(dispatcher: &Dispatcher<LocalTab>, command: &Commands, book: &AddressBook) -> Vec<Status> {
    match execute(dispatcher, command, book).await {
        Ok(lines) => lines,
        Err(status) => vec![status],
    }
}

async fn execute(
    dispatcher: &Dispatcher<LocalTab>,
    command: &Commands,
    book: &AddressBook,
) -> Result<Vec<Status>, Status> {
    match command {
        Commands::Connect => {
            let resp = dispatcher.dispatch(Request::Connect).await;
            Ok(status::connect_status(&resp))
        }
        Commands::Balance => {
            let admin = required(&book.admin, "Please enter the admin address")?;
            let subject = required(&book.student, "Please enter a student address")?;
            Ok(balance(dispatcher, admin, subject).await)
        }
        Commands::Award { amount } | Commands::Redeem { amount } => {
            let amount = status::parse_amount(amount)?;
            let admin = required(&book.admin, "Please enter the admin address")?;
            let subject = required(&book.student, "Please enter a student address")?;

            let awarding = matches!(command, Commands::Award { .. });
            let request = if awarding {
                Request::Award { admin: admin.clone(), subject: subject.clone(), amount }
            } else {
                Request::Redeem { admin: admin.clone(), subject: subject.clone(), amount }
            };
            let resp = dispatcher.dispatch(request).await;

            let line = if awarding {
                status::action_status(
                    &resp,
                    &format!("Successfully awarded {} points!", amount),
                    "Failed to award points",
                )
            } else {
                status::action_status(
                    &resp,
                    &format!("Successfully redeemed {} points!", amount),
                    "Failed to redeem points",
                )
            };

            let mut lines = vec![line];
            if resp.success {
                lines.extend(balance(dispatcher, admin, subject).await);
            }
            Ok(lines)
        }
        Commands::Register => {
            let admin = required(&book.admin, "Please enter the admin address")?;
            let resp = dispatcher.dispatch(Request::Register { admin }).await;
            Ok(vec![status::action_status(
                &resp,
                "Successfully registered as student!",
                "Failed to register",
            )])
        }
        Commands::AddMerchant | Commands::RemoveMerchant => {
            let merchant = required(&book.merchant, "Please enter a merchant address")?;
            let admin = required(&book.admin, "Please enter the admin address")?;
            let approved = matches!(command, Commands::AddMerchant);

            let resp = dispatcher
                .dispatch(Request::SetMerchant { admin, merchant, approved })
                .await;
            let done = if approved {
                "Merchant approved successfully!"
            } else {
                "Merchant removed successfully!"
            };
            Ok(vec![status::action_status(&resp, done, "Failed to update merchant")])
        }
        Commands::Reload => {
            let resp = dispatcher.reload().await;
            Ok(vec![status::action_status(
                &resp,
                "Content script reloaded",
                "Failed to reload content script",
            )])
        }
        Commands::Account { .. } => Ok(Vec::new()),
    }
}

async fn balance(dispatcher: &Dispatcher<LocalTab>, admin: String, subject: String) -> Vec<Status> {
    let resp = dispatcher.dispatch(Request::GetBalance { admin, subject }).await;
    status::balance_status(&resp)
}

async fn account(config: &BridgeConfig, address: &str, admin: Option<&str>) -> Result<Vec<Status>> {
    let ledger = LedgerClient::with_timeout(
        config.ledger.rpc_url.clone(),
        config.ledger.request_timeout(),
    )?;

    let mut lines = match ledger.account(address).await {
        Ok(info) => vec![
            Status::info(format!("Account {}", address)),
            Status::info(format!("Sequence number: {}", info.sequence_number)),
            Status::info(format!("Authentication key: {}", info.authentication_key)),
        ],
        Err(BridgeError::NotFound(_)) => {
            return Ok(vec![Status::error(format!("Account not found: {}", address))])
        }
        Err(e) => return Ok(vec![Status::error(e.to_string())]),
    };

    if let Some(admin) = admin.filter(|a| !a.trim().is_empty()) {
        let query = BalanceQuery::new(ledger, config.coin.clone(), DecimalsCache::default());
        lines.push(status::registration_status(query.is_registered(admin.trim(), address).await));
    }
    Ok(lines)
}
