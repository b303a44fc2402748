//! Neighborly CLI - browse community-service data from the local cache.
//!
//! Every read is served from the cache; `refresh` (or `list --refresh`) asks
//! the staleness policy whether the backend needs to be contacted.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use neighborly_core::auth::SessionData;
use neighborly_core::models::{
    Domain, Entity, EntityId, Favorited, GeoPoint, Info, Office, Ticket,
};
use neighborly_core::providers::{FixedLocation, LocationProvider, NoLocation};
use neighborly_core::store::SqliteStore;
use neighborly_core::{Config, Neighborly, RefreshOutcome, Repository, RepositoryError};

// ============================================================================
// Constants
// ============================================================================

/// File name prefix for the daily rolling log
const LOG_FILE_PREFIX: &str = "neighborly.log";

/// Offices shown by `list office` when a position is known
const DEFAULT_NEAREST_LIMIT: usize = 10;

#[derive(Parser, Debug)]
#[command(name = "neighborly")]
#[command(about = "Offline-first client for community services")]
#[command(version)]
struct Args {
    /// Override the API base URL (also NEIGHBORLY_API_URL)
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Current latitude, enables spatial filtering for tickets and offices
    #[arg(long, global = true, requires = "lon", allow_hyphen_values = true)]
    lat: Option<f64>,

    /// Current longitude
    #[arg(long, global = true, requires = "lat", allow_hyphen_values = true)]
    lon: Option<f64>,

    /// Also write logs to a daily rotated file in this directory
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Refresh one domain, or all of them, if the cache is stale
    Refresh {
        #[arg(value_parser = parse_domain)]
        domain: Option<Domain>,
        /// Fetch even if the cache is fresh
        #[arg(short, long)]
        force: bool,
    },
    /// List cached entities
    List {
        #[arg(value_parser = parse_domain)]
        domain: Domain,
        /// Only favorites
        #[arg(long)]
        favorites: bool,
        /// Only tickets reported by the signed-in user
        #[arg(long)]
        mine: bool,
        /// Refresh first if the cache is stale
        #[arg(short, long)]
        refresh: bool,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Show one cached entity
    Show {
        #[arg(value_parser = parse_domain)]
        domain: Domain,
        id: EntityId,
        /// Fetch the latest version from the backend first
        #[arg(long)]
        fetch: bool,
    },
    /// Toggle the favorite flag of an entity
    Favorite {
        #[arg(value_parser = parse_domain)]
        domain: Domain,
        id: EntityId,
    },
    /// Show cache ages and session state
    Status,
    /// Store a bearer token obtained from the backend
    Login {
        #[arg(long)]
        token: String,
        #[arg(long)]
        user_id: i64,
        #[arg(long)]
        username: Option<String>,
    },
    /// Forget the stored session
    Logout,
}

fn parse_domain(s: &str) -> Result<Domain, String> {
    Domain::parse(s).ok_or_else(|| format!("unknown domain '{}' (ticket, office, info)", s))
}

/// Initialize the tracing subscriber for logging
fn init_tracing(log_dir: Option<&PathBuf>) -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=neighborly_core=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_ansi(false).with_writer(writer)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();
    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let args = Args::parse();
    let _log_guard = init_tracing(args.log_dir.as_ref());

    let mut config = Config::load()?;
    if let Some(url) = args.api_url {
        config.api_base_url = url;
    }

    let location: Arc<dyn LocationProvider> = match (args.lat, args.lon) {
        (Some(lat), Some(lon)) => Arc::new(FixedLocation(GeoPoint::new(lat, lon))),
        _ => Arc::new(NoLocation),
    };
    let here = location.current();

    let app = Neighborly::open(&config, location)?;
    info!(api = %config.api_base_url, cache = ?app.cache_dir(), "Neighborly ready");

    match args.command {
        Command::Refresh { domain, force } => refresh(&app, domain, force).await,
        Command::List {
            domain,
            favorites,
            mine,
            refresh: refresh_first,
            json,
        } => {
            if refresh_first {
                refresh(&app, Some(domain), false).await?;
            }
            let filter = ListFilter { favorites, mine, json };
            match domain {
                Domain::Ticket => {
                    let tickets = if mine {
                        app.tickets.owned_by_current_user()?
                    } else {
                        app.tickets.entities()?
                    };
                    print_list(filter, tickets)
                }
                Domain::Office => match here {
                    Some(point) if !favorites => {
                        let nearest = app.offices.nearest(point, DEFAULT_NEAREST_LIMIT)?;
                        print_nearest(filter, &nearest)
                    }
                    _ => print_list(filter, app.offices.entities()?),
                },
                Domain::Info => print_list(filter, app.infos.active()?),
            }
        }
        Command::Show { domain, id, fetch } => match domain {
            Domain::Ticket => show(&app.tickets, id, fetch).await,
            Domain::Office => show(&app.offices, id, fetch).await,
            Domain::Info => show(&app.infos, id, fetch).await,
        },
        Command::Favorite { domain, id } => {
            let now_favorite = match domain {
                Domain::Ticket => app.tickets.toggle_favorite(id)?,
                Domain::Office => app.offices.toggle_favorite(id)?,
                Domain::Info => app.infos.toggle_favorite(id)?,
            };
            if now_favorite {
                println!("Added {} {} to favorites", domain, id);
            } else {
                println!("Removed {} {} from favorites", domain, id);
            }
            Ok(())
        }
        Command::Status => status(&app),
        Command::Login {
            token,
            user_id,
            username,
        } => {
            app.session.update(SessionData::new(token, user_id, username));
            app.session.save().context("Failed to save session")?;
            // A new user sees different owned records and favorites
            app.invalidate_all();
            println!("Signed in as user {}", user_id);
            Ok(())
        }
        Command::Logout => {
            app.session.clear()?;
            app.invalidate_all();
            println!("Signed out");
            Ok(())
        }
    }
}

async fn refresh(app: &Neighborly, domain: Option<Domain>, force: bool) -> Result<()> {
    let results = match domain {
        None => app.refresh_all(force).await,
        Some(Domain::Ticket) => vec![(Domain::Ticket, app.tickets.refresh(force).await)],
        Some(Domain::Office) => vec![(Domain::Office, app.offices.refresh(force).await)],
        Some(Domain::Info) => vec![(Domain::Info, app.infos.refresh(force).await)],
    };

    let mut failed = 0;
    for (domain, result) in results {
        match result {
            Ok(RefreshOutcome::Skipped) => println!("{:<8} up to date", domain),
            Ok(RefreshOutcome::Refreshed { stored, backfilled }) => {
                println!("{:<8} {} cached ({} favorites backfilled)", domain, stored, backfilled)
            }
            Err(RepositoryError::Fetch(e)) if e.is_offline() => {
                failed += 1;
                eprintln!("{:<8} offline, showing cached data ({})", domain, e);
            }
            Err(e) => {
                failed += 1;
                eprintln!("{:<8} refresh failed: {}", domain, e);
            }
        }
    }
    if failed > 0 {
        bail!("{} domain(s) failed to refresh, cached data kept", failed);
    }
    Ok(())
}

async fn show<E: Entity>(
    repo: &Repository<E, SqliteStore>,
    id: EntityId,
    fetch: bool,
) -> Result<()> {
    if fetch {
        repo.refresh_entity(id).await?;
    }
    let Some(entity) = repo.entity(id)? else {
        bail!("{} {} is not cached (try --fetch)", E::DOMAIN, id);
    };
    println!("{}", serde_json::to_string_pretty(&entity)?);
    Ok(())
}

fn status(app: &Neighborly) -> Result<()> {
    let now = app.sync().now();
    for domain in Domain::ALL {
        let state = app.sync().state(domain);
        let position = state
            .last_location
            .map(|p| format!(" at {:.4},{:.4}", p.latitude, p.longitude))
            .unwrap_or_default();
        println!("{:<8} fetched {}{}", domain, state.age_display(now), position);
    }
    match app.session.data() {
        Some(data) if !data.is_expired() => println!(
            "Signed in as {} ({} min left)",
            data.username.clone().unwrap_or_else(|| data.user_id.to_string()),
            data.minutes_until_expiry()
        ),
        Some(_) => println!("Session expired"),
        None => println!("Signed out"),
    }
    Ok(())
}

// ============================================================================
// Output
// ============================================================================

#[derive(Debug, Clone, Copy)]
struct ListFilter {
    favorites: bool,
    mine: bool,
    json: bool,
}

/// One-line description used in listings.
trait Summary {
    fn summary(&self) -> String;
}

impl Summary for Ticket {
    fn summary(&self) -> String {
        format!("[{}] {}", self.status, self.title)
    }
}

impl Summary for Office {
    fn summary(&self) -> String {
        match self.address {
            Some(ref address) => format!("{} - {}", self.name, address),
            None => self.name.clone(),
        }
    }
}

impl Summary for Info {
    fn summary(&self) -> String {
        match self.published_at {
            Some(at) => format!("{} ({})", self.title, at.format("%Y-%m-%d")),
            None => self.title.clone(),
        }
    }
}

fn marker<E>(item: &Favorited<E>) -> char {
    if item.is_favorite {
        '*'
    } else {
        ' '
    }
}

/// JSON rows for `list office --json` when sorted by distance.
fn nearest_rows(nearest: &[(Favorited<Office>, f64)]) -> Vec<serde_json::Value> {
    nearest
        .iter()
        .map(|(office, meters)| {
            serde_json::json!({ "office": office, "distanceMeters": meters.round() })
        })
        .collect()
}

fn print_nearest(filter: ListFilter, nearest: &[(Favorited<Office>, f64)]) -> Result<()> {
    if filter.json {
        println!("{}", serde_json::to_string_pretty(&nearest_rows(nearest))?);
        return Ok(());
    }
    if nearest.is_empty() {
        println!("No cached offices with a position");
        return Ok(());
    }
    for (office, meters) in nearest {
        println!("{} {:>6.0} m  {}", marker(office), meters, office.entity.summary());
    }
    Ok(())
}

fn print_list<E: Entity + Summary>(filter: ListFilter, items: Vec<Favorited<E>>) -> Result<()> {
    let items: Vec<_> = items
        .into_iter()
        .filter(|item| !filter.favorites || item.is_favorite)
        .collect();

    if filter.json {
        println!("{}", serde_json::to_string_pretty(&items)?);
        return Ok(());
    }
    if items.is_empty() {
        let hint = if filter.mine { " (signed in?)" } else { "" };
        println!("Nothing cached{}", hint);
        return Ok(());
    }
    for item in &items {
        println!("{} {:>6}  {}", marker(item), item.entity.id(), item.entity.summary());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn office(id: EntityId) -> Office {
        Office {
            id,
            name: format!("office {}", id),
            address: None,
            phone: None,
            email: None,
            website: None,
            opening_hours: None,
            location: Some(GeoPoint::new(48.0, 11.0)),
        }
    }

    #[test]
    fn test_nearest_rows_carry_office_and_distance() {
        let nearest = vec![(
            Favorited {
                entity: office(3),
                is_favorite: true,
            },
            123.4,
        )];
        let rows = nearest_rows(&nearest);

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["office"]["id"], 3);
        assert_eq!(rows[0]["office"]["isFavorite"], true);
        assert_eq!(rows[0]["distanceMeters"], 123.0);
    }

    #[test]
    fn test_parse_domain_accepts_resource_names() {
        assert_eq!(parse_domain("offices"), Ok(Domain::Office));
        assert!(parse_domain("parks").is_err());
    }
}
