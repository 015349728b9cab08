use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use trip_discovery::{
    attractions::{DEFAULT_COUNTRY, DEFAULT_POPULAR_LIMIT},
    route::ordered_stops,
    Attraction, DiscoveryApp, DiscoveryConfig, SearchQuery, SortOrder,
};

#[derive(Parser)]
#[command(author, version, about = "Search attractions and plan trips", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Search attractions with a shareable query string, e.g. "q=louvre&minRating=4"
    Search {
        query: String,
        #[arg(short, long, default_value = "relevance")]
        sort: SortOrder,
    },
    /// List popular attractions of a country
    Popular {
        #[arg(short, long, default_value = DEFAULT_COUNTRY)]
        country: String,
        #[arg(short, long, default_value_t = DEFAULT_POPULAR_LIMIT)]
        limit: u32,
    },
    /// Compute an optimized driving route through a trip
    Route { compilation_id: i64 },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    for filename in [".env.local", ".env"] {
        let _ = dotenvy::from_filename(filename);
    }

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "trip_discovery=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = DiscoveryConfig::from_env().context("invalid configuration")?;
    let app = DiscoveryApp::new(config).context("could not open session")?;

    match cli.command {
        Commands::Search { query, sort } => {
            let query = SearchQuery::from_query_string(&query);
            let results = app.search_controller().search_now(&query).await?;
            let mut results = results.to_vec();
            sort.sort(&mut results);
            print_attractions(&results);
        }
        Commands::Popular { country, limit } => {
            let results = app.attractions.popular(&country, limit).await?;
            print_attractions(&results);
        }
        Commands::Route { compilation_id } => {
            let trip = app.trip_detail();
            let compilation = trip.load(compilation_id).await?;
            if !trip.can_calculate_route() {
                bail!(
                    "trip \"{}\" needs two geocoded stops and a maps API key",
                    compilation.name
                );
            }

            let stops = trip.stops();
            let Some(route) = trip.calculate_route().await else {
                bail!("no route found for trip \"{}\"", compilation.name);
            };

            for (position, stop) in ordered_stops(&stops, &route.waypoint_order).iter().enumerate() {
                println!("{:>2}. {} ({})", position + 1, stop.name, stop.position);
            }
            println!(
                "{:.1} km, {} min, cost estimate {}",
                route.total_distance_m() as f64 / 1000.0,
                route.total_duration_s() / 60,
                trip.cost_estimate()
            );
        }
    }

    Ok(())
}

fn print_attractions(attractions: &[Attraction]) {
    if attractions.is_empty() {
        println!("No attractions found.");
        return;
    }

    for attraction in attractions {
        println!(
            "{:<40} {:>3.1}★ {:>6} reviews  {:<5} {}",
            attraction.name,
            attraction.rating,
            attraction.user_ratings_total,
            attraction.price_label(),
            attraction.link_target()
        );
    }
}
