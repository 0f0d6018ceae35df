// pitchlens command-line entry point.
//
// Startup sequence:
// 1. Initialize tracing (stderr, so stdout stays machine-readable JSON)
// 2. Parse the command line
// 3. Load config, writing defaults on first run
// 4. Load the dataset and build the engine on a blocking worker
// 5. Run the command; Ctrl+C trips the cancellation token
// 6. Print the result as JSON

use pitchlens_core::cancel::CancellationToken;
use pitchlens_core::config::{self, Config};
use pitchlens_core::engine::{Engine, Session};
use pitchlens_core::index::cache::SystemClock;
use pitchlens_core::ingest;
use pitchlens_core::similarity::DistanceMetric;
use pitchlens_core::store::entity::{Player, Team};
use pitchlens_core::store::position::PositionCategory;

use anyhow::{anyhow, Context};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

// ---------------------------------------------------------------------------
// Command line
// ---------------------------------------------------------------------------

#[derive(Debug, Parser)]
#[command(name = "pitchlens")]
#[command(about = "Football player analytics over scouting tables", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, PartialEq, Subcommand)]
enum Command {
    /// Dataset and load statistics
    Summary,

    /// Players, teams and leagues matching text
    Search {
        #[arg(required = true)]
        query: Vec<String>,

        #[arg(long, default_value_t = 10)]
        limit: usize,
    },

    /// Profile, percentiles, best roles and shots for one player
    Player {
        #[arg(required = true)]
        name: Vec<String>,
    },

    /// Players statistically closest to one player
    Similar(SimilarArgs),

    /// Role scores for one player
    Roles {
        #[arg(required = true)]
        name: Vec<String>,
    },

    /// Every eligible player ranked for a role
    Rank {
        #[arg(required = true)]
        role: Vec<String>,

        #[arg(long)]
        limit: Option<usize>,
    },

    /// K-means archetypes
    Clusters {
        /// Cluster only this position category, on its own metric list
        #[arg(long, value_enum)]
        category: Option<CategoryArg>,
    },

    /// Squad, shots and per-90 averages for one team
    Team {
        #[arg(required = true)]
        name: Vec<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Args)]
struct SimilarArgs {
    #[arg(required = true)]
    name: Vec<String>,

    /// Maximum results (defaults to the configured limit)
    #[arg(long)]
    limit: Option<usize>,

    /// Compare on the player's strongest metrics instead of the position list
    #[arg(long)]
    strengths: bool,

    #[arg(long)]
    same_position: bool,

    #[arg(long)]
    exclude_team: bool,

    /// Include per-metric differences
    #[arg(long)]
    breakdown: bool,

    #[arg(long, value_enum, default_value_t = DistanceArg::Euclidean)]
    distance: DistanceArg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum DistanceArg {
    Euclidean,
    #[value(alias = "weighted")]
    WeightedEuclidean,
    Manhattan,
    Cosine,
}

impl From<DistanceArg> for DistanceMetric {
    fn from(arg: DistanceArg) -> Self {
        match arg {
            DistanceArg::Euclidean => DistanceMetric::Euclidean,
            DistanceArg::WeightedEuclidean => DistanceMetric::WeightedEuclidean,
            DistanceArg::Manhattan => DistanceMetric::Manhattan,
            DistanceArg::Cosine => DistanceMetric::Cosine,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum CategoryArg {
    Goalkeeper,
    CentreBack,
    FullBack,
    Midfielder,
    AttackingMidfielder,
    Winger,
    Forward,
}

impl From<CategoryArg> for PositionCategory {
    fn from(arg: CategoryArg) -> Self {
        match arg {
            CategoryArg::Goalkeeper => PositionCategory::Goalkeeper,
            CategoryArg::CentreBack => PositionCategory::CentreBack,
            CategoryArg::FullBack => PositionCategory::FullBack,
            CategoryArg::Midfielder => PositionCategory::Midfielder,
            CategoryArg::AttackingMidfielder => PositionCategory::AttackingMidfielder,
            CategoryArg::Winger => PositionCategory::Winger,
            CategoryArg::Forward => PositionCategory::Forward,
        }
    }
}

/// Unquoted multi-word names arrive as separate words.
fn joined(words: &[String]) -> String {
    words.join(" ")
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Initialize tracing
    init_tracing()?;

    // 2. Parse the command line
    let command = Cli::parse().command;

    // 3. Load config
    let config = config::load_config().context("failed to load configuration")?;
    info!(
        "Config loaded: {} roles, players from {}",
        config.roles.len(),
        config.data_paths.players
    );

    // 4-5. Build and run on a blocking worker; Ctrl+C cancels long analyses.
    let token = CancellationToken::new();
    let interrupt = {
        let token = token.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, cancelling");
                token.cancel();
            }
        })
    };

    let output = tokio::task::spawn_blocking(move || run(command, config, &token))
        .await
        .context("worker task panicked")??;
    interrupt.abort();

    // 6. Print
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

#[derive(Debug, Serialize)]
struct SearchOutput<'a> {
    players: Vec<PlayerHit<'a>>,
    teams: Vec<&'a str>,
    leagues: Vec<&'a str>,
}

#[derive(Debug, Serialize)]
struct PlayerHit<'a> {
    id: &'a str,
    name: &'a str,
    team: &'a str,
    position: &'a str,
}

impl<'a> From<&'a Player> for PlayerHit<'a> {
    fn from(p: &'a Player) -> Self {
        PlayerHit {
            id: p.id.as_str(),
            name: &p.name,
            team: &p.team_name,
            position: &p.position,
        }
    }
}

fn run(command: Command, config: Config, token: &CancellationToken) -> anyhow::Result<serde_json::Value> {
    let dataset = ingest::load_dataset(&config.data_paths).context("failed to load dataset")?;
    let session = Session::new();
    let engine = session.load(&dataset, config, Arc::new(SystemClock));

    let value = match command {
        Command::Summary => serde_json::json!({
            "summary": engine.summary(),
            "load_report": engine.report(),
        }),
        Command::Search { query, limit } => {
            let query = joined(&query);
            serde_json::to_value(SearchOutput {
                players: engine
                    .search_players(&query, limit)
                    .into_iter()
                    .map(PlayerHit::from)
                    .collect(),
                teams: engine
                    .search_teams(&query, limit)
                    .into_iter()
                    .map(|t| t.name.as_str())
                    .collect(),
                leagues: engine.search_leagues(&query, limit),
            })?
        }
        Command::Player { name } => {
            serde_json::to_value(engine.player_snapshot(find_player(&engine, &joined(&name))?))?
        }
        Command::Similar(args) => {
            let player = find_player(&engine, &joined(&args.name))?;
            let mut options = engine.similarity_options();
            if let Some(limit) = args.limit {
                options.limit = limit;
            }
            options.same_position_only = args.same_position;
            options.exclude_same_team = args.exclude_team;
            options.include_breakdown = args.breakdown;
            options.distance = args.distance.into();
            let results = engine
                .similar(player, &options, args.strengths, Some(token))
                .context("similarity search interrupted")?;
            serde_json::json!({ "reference": PlayerHit::from(player), "similar": results })
        }
        Command::Roles { name } => {
            let player = find_player(&engine, &joined(&name))?;
            serde_json::json!({ "player": PlayerHit::from(player), "roles": engine.best_roles(player) })
        }
        Command::Rank { role, limit } => {
            let role = joined(&role);
            let mut ranked = engine
                .rank_role(&role)
                .ok_or_else(|| anyhow!("unknown role '{role}'"))?;
            if let Some(limit) = limit {
                ranked.truncate(limit);
            }
            serde_json::to_value(ranked)?
        }
        Command::Clusters { category } => {
            let outcome = engine
                .clusters(category.map(PositionCategory::from), Some(token))
                .context("clustering interrupted")?;
            serde_json::to_value(outcome)?
        }
        Command::Team { name } => {
            serde_json::to_value(engine.team_report(find_team(&engine, &joined(&name))?))?
        }
    };
    Ok(value)
}

fn find_player<'e>(engine: &'e Engine, name: &str) -> anyhow::Result<&'e Player> {
    engine
        .find_player(name)
        .ok_or_else(|| anyhow!("no player matching '{name}'"))
}

fn find_team<'e>(engine: &'e Engine, name: &str) -> anyhow::Result<&'e Team> {
    engine
        .find_team(name)
        .ok_or_else(|| anyhow!("no team matching '{name}'"))
}

/// Initialize tracing to stderr, leaving stdout for command output.
fn init_tracing() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("pitchlens=info,pitchlens_core=info,warn")),
        )
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
