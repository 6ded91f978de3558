use anyhow::Context;
use clap::{Args, Parser, Subcommand, ValueEnum};
use coopmarket_config::load as load_config;
use coopmarket_marketplace::{ListingStatus, PriceSort, VerificationDecision};
use coopmarket_runtime::{session_store::SessionStore, telemetry, ClientServices};
use tracing::info;

mod commands;
mod demo;
mod render;

#[derive(Parser)]
#[command(name = "coopmarket")]
#[command(about = "Mining cooperative marketplace client")]
struct Cli {
    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand)]
enum Mode {
    /// Run a complete flow against an in-memory store
    Demo,
    #[command(flatten)]
    Online(Commands),
}

/// Commands that talk to the configured backend.
#[derive(Subcommand)]
enum Commands {
    /// Register a cooperative and its administrator account
    Register {
        #[arg(long)]
        name: String,
        #[arg(long)]
        registration_number: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
        #[arg(long, default_value = "")]
        phone: String,
        #[arg(long, default_value = "")]
        address: String,
    },
    /// Sign in and remember the session
    Login {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    /// Sign out and forget the session
    Logout,
    /// Show the signed-in account
    Whoami,
    /// Manage cooperative members (administrators)
    #[command(subcommand)]
    Members(MemberCommands),
    /// Manage your mineral listings (members)
    #[command(subcommand)]
    Listings(ListingCommands),
    /// Submit a delivery against one of your listings
    Submit {
        #[arg(long)]
        listing: String,
        #[arg(long)]
        quantity: String,
        #[arg(long, default_value = "")]
        notes: String,
    },
    /// Your ten most recent submissions
    History,
    /// Pending submissions awaiting verification
    Queue,
    /// Verify or reject a pending submission
    Verify {
        submission: String,
        #[arg(value_parser = parse_decision)]
        decision: VerificationDecision,
    },
    /// Dashboard totals for the signed-in account
    Stats,
    /// Browse available listings from every cooperative
    Marketplace(BrowseArgs),
    /// Follow a view and print it every time it changes
    Watch {
        #[arg(value_enum)]
        view: WatchTarget,
        #[command(flatten)]
        filters: BrowseArgs,
    },
    /// Show whether a page path is open to the current session
    Route { path: String },
}

#[derive(Subcommand)]
enum MemberCommands {
    Add {
        #[arg(long)]
        full_name: String,
        #[arg(long)]
        member_code: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
        #[arg(long, default_value = "")]
        phone: String,
    },
    List,
}

#[derive(Subcommand)]
enum ListingCommands {
    New {
        #[arg(long)]
        mineral: String,
        #[arg(long)]
        quantity: String,
        /// kg, g or ton
        #[arg(long, default_value = "")]
        unit: String,
        #[arg(long)]
        grade: String,
        #[arg(long)]
        price: String,
        #[arg(long, default_value = "")]
        notes: String,
    },
    List {
        #[arg(long, default_value = "")]
        search: String,
        #[arg(long, default_value = "")]
        mineral: String,
        #[arg(long, value_parser = parse_listing_status)]
        status: Option<ListingStatus>,
    },
}

#[derive(Args, Clone, Default)]
struct BrowseArgs {
    #[arg(long, default_value = "")]
    search: String,
    /// price-low-high or price-high-low
    #[arg(long, default_value = "price-low-high", value_parser = parse_sort)]
    sort: PriceSort,
}

#[derive(Clone, Copy, ValueEnum)]
enum WatchTarget {
    Roster,
    Queue,
    History,
    Listings,
    Stats,
    Marketplace,
}

fn parse_decision(value: &str) -> Result<VerificationDecision, String> {
    VerificationDecision::parse(value).ok_or_else(|| "expected verified or rejected".to_string())
}

fn parse_listing_status(value: &str) -> Result<ListingStatus, String> {
    ListingStatus::parse(value).ok_or_else(|| "expected available, pending or sold".to_string())
}

fn parse_sort(value: &str) -> Result<PriceSort, String> {
    match value {
        "price-low-high" | "price-high-low" => Ok(PriceSort::from(value)),
        _ => Err("expected price-low-high or price-high-low".to_string()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    telemetry::init_tracing().context("failed to initialise tracing")?;

    let result = match cli.mode {
        Mode::Demo => demo::run().await,
        Mode::Online(command) => run_online(command).await,
    };

    if let Err(error) = result {
        std::process::exit(render::error(&error));
    }
    Ok(())
}

async fn run_online(command: Commands) -> anyhow::Result<()> {
    let config = load_config().context("failed to load configuration")?;
    let store = SessionStore::from_env();
    let restored = store.load()?;

    let services = ClientServices::initialise(&config, restored)
        .await
        .context("failed to initialise client services")?;
    info!(url = %config.remote.url, "client ready");

    commands::run(command, &services, &store).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_verify() {
        let cli = Cli::try_parse_from(["coopmarket", "verify", "sub-1", "reject"]).unwrap();
        match cli.mode {
            Mode::Online(Commands::Verify {
                submission,
                decision,
            }) => {
                assert_eq!(submission, "sub-1");
                assert_eq!(decision, VerificationDecision::Rejected);
            }
            _ => panic!("expected verify"),
        }
        assert!(Cli::try_parse_from(["coopmarket", "verify", "sub-1", "maybe"]).is_err());
    }

    #[test]
    fn test_parses_listing_filters() {
        let cli = Cli::try_parse_from([
            "coopmarket",
            "listings",
            "list",
            "--search",
            "gol",
            "--status",
            "available",
        ])
        .unwrap();
        match cli.mode {
            Mode::Online(Commands::Listings(ListingCommands::List { search, status, .. })) => {
                assert_eq!(search, "gol");
                assert_eq!(status, Some(ListingStatus::Available));
            }
            _ => panic!("expected listings list"),
        }
    }

    #[test]
    fn test_marketplace_sort_is_checked() {
        let cli =
            Cli::try_parse_from(["coopmarket", "marketplace", "--sort", "price-high-low"]).unwrap();
        match cli.mode {
            Mode::Online(Commands::Marketplace(args)) => assert_eq!(args.sort, PriceSort::HighToLow),
            _ => panic!("expected marketplace"),
        }
        assert!(Cli::try_parse_from(["coopmarket", "marketplace", "--sort", "cheap"]).is_err());
    }

    #[test]
    fn test_demo_runs_offline() {
        let cli = Cli::try_parse_from(["coopmarket", "demo"]).unwrap();
        assert!(matches!(cli.mode, Mode::Demo));
        assert!(Cli::try_parse_from(["coopmarket", "whoami"]).is_ok());
    }
}
