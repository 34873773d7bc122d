use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use bookslot::api::HttpAppointmentApi;
use bookslot::booking::{
    AttemptState, BookingAttempt, BookingCoordinator, BookingDraft, CoordinatorSettings,
};
use bookslot::clock::SystemClock;
use bookslot::config::Config;
use bookslot::limits::MAX_BUFFER_MINUTES;
use bookslot::model::{Minutes, TimeOfDay};

#[derive(Parser)]
#[command(name = "bookslot")]
#[command(about = "Query availability and book appointments against an appointment store")]
struct Cli {
    /// Base URL of the appointment store API
    #[arg(long, env = "BOOKSLOT_API_URL", global = true)]
    api_url: Option<String>,

    /// Bearer token attached to every request
    #[arg(long, env = "BOOKSLOT_API_TOKEN", global = true, hide_env_values = true)]
    token: Option<String>,

    /// Minimum gap around appointments, in minutes
    #[arg(long, env = "BOOKSLOT_BUFFER_MINUTES", global = true)]
    buffer: Option<Minutes>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List bookable start times for a date
    Slots {
        #[arg(short, long)]
        business: String,
        /// Date (YYYY-MM-DD)
        #[arg(short, long)]
        date: NaiveDate,
        /// Service duration in minutes
        #[arg(long)]
        duration: Minutes,
    },
    /// Book one slot
    Book {
        #[arg(short, long)]
        business: String,
        #[arg(short, long)]
        service: String,
        #[arg(short, long)]
        user: String,
        /// Date (YYYY-MM-DD)
        #[arg(short, long)]
        date: NaiveDate,
        /// Start time, "14:30" or "2:30 PM"
        #[arg(short, long)]
        time: TimeOfDay,
        #[arg(long)]
        duration: Minutes,
        #[arg(long)]
        notes: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut cfg = Config::from_env();
    if let Some(url) = cli.api_url {
        cfg.api_url = url;
    }
    if cli.token.is_some() {
        cfg.api_token = cli.token;
    }
    if let Some(buffer) = cli.buffer {
        cfg.buffer_minutes = buffer.min(MAX_BUFFER_MINUTES);
    }

    bookslot::observability::init(cfg.metrics_port).context("failed to install metrics exporter")?;
    info!("appointment store: {}", cfg.api_url);
    info!("  buffer: {} min, lookahead: {} days", cfg.buffer_minutes, cfg.lookahead_days);

    let api = HttpAppointmentApi::new(&cfg.api_url, cfg.api_token.clone(), cfg.submit_timeout)?;
    let coordinator = BookingCoordinator::new(
        Arc::new(api),
        Arc::new(SystemClock),
        CoordinatorSettings::from(&cfg),
    );

    match cli.command {
        Commands::Slots {
            business,
            date,
            duration,
        } => {
            let slots = coordinator
                .available_slots(&business.as_str().into(), date, duration)
                .await?;
            if slots.is_empty() {
                println!("no slots on {date}");
            }
            for slot in slots {
                println!("{slot}");
            }
        }
        Commands::Book {
            business,
            service,
            user,
            date,
            time,
            duration,
            notes,
        } => {
            let mut draft = BookingDraft::new(
                business.as_str().into(),
                service.as_str().into(),
                user.as_str().into(),
                duration,
            )
            .on(date)
            .at(time);
            if let Some(notes) = notes {
                draft = draft.with_notes(notes);
            }

            let mut attempt = BookingAttempt::new();
            coordinator.submit(&mut attempt, &draft).await?;
            match attempt.state() {
                AttemptState::Committed { appointment } => {
                    println!(
                        "booked {} on {} at {}",
                        appointment.id, appointment.date, appointment.time
                    );
                }
                AttemptState::AwaitingReselection { conflict, slots, .. } => {
                    println!("{time} was just taken ({conflict}); still free on {date}:");
                    for slot in slots {
                        println!("  {slot}");
                    }
                    std::process::exit(2);
                }
                AttemptState::AwaitingDateChange { conflict, .. } => {
                    println!(
                        "{time} was just taken ({conflict}) and {date} is now full; \
                         pick another date"
                    );
                    std::process::exit(2);
                }
                other => anyhow::bail!("unexpected attempt state: {other:?}"),
            }
        }
    }

    Ok(())
}
