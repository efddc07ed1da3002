//! container-events command line entry point.
//!
//! Reads or follows the configured event log, or records a single event.
//! The backend comes from the environment (see [`EventsConfig`]).

use std::collections::BTreeMap;

use anyhow::Context;
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use container_events::backend::{ReadOptions, select_eventer};
use container_events::config::{EventsConfig, LogFormat};
use container_events::domain::{Event, EventType, Status};
use container_events::service::EventService;

#[derive(Debug, Parser)]
#[command(name = "container-events", version, about = "Read and record container lifecycle events")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print recorded events (the default).
    Read(ReadArgs),
    /// Record a single event.
    Emit(EmitArgs),
}

#[derive(Debug, Clone, Copy, Default, ValueEnum)]
enum OutputFormat {
    #[default]
    Human,
    Json,
}

#[derive(Debug, Default, Args)]
struct ReadArgs {
    /// Filter as key=value; repeat to combine.
    #[arg(long = "filter", short = 'f')]
    filters: Vec<String>,

    /// Only events after this time (RFC 3339, Unix seconds, or a duration like 10m).
    #[arg(long)]
    since: Option<String>,

    /// Only events before this time; ends --stream once reached.
    #[arg(long)]
    until: Option<String>,

    /// Keep printing new events.
    #[arg(long)]
    stream: bool,

    /// With --stream, print existing events first.
    #[arg(long)]
    from_start: bool,

    /// Output format.
    #[arg(long, value_enum, default_value_t = OutputFormat::Human)]
    format: OutputFormat,

    /// Do not truncate IDs.
    #[arg(long)]
    no_trunc: bool,
}

#[derive(Debug, Args)]
struct EmitArgs {
    /// Event type.
    #[arg(long = "type")]
    event_type: EventType,

    /// Event status.
    #[arg(long)]
    status: Status,

    /// Object ID; a random one is generated when omitted.
    #[arg(long)]
    id: Option<String>,

    /// Object name.
    #[arg(long, default_value = "")]
    name: String,

    /// Image name.
    #[arg(long, default_value = "")]
    image: String,

    /// Attribute as key=value; repeatable.
    #[arg(long = "label")]
    labels: Vec<String>,

    /// Container exit code.
    #[arg(long)]
    exit_code: Option<i32>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = EventsConfig::from_env().context("loading event configuration")?;
    init_tracing(config.log_format);

    // Select backend
    let eventer = select_eventer(&config.eventer_options(), config.fallback)
        .with_context(|| format!("selecting {} event logger", config.logger))?;
    let service = EventService::new(eventer);

    match cli.command {
        Some(Command::Emit(args)) => emit(&service, args).await,
        Some(Command::Read(args)) => read(&service, args).await,
        None => read(&service, ReadArgs::default()).await,
    }
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

async fn emit(service: &EventService, args: EmitArgs) -> anyhow::Result<()> {
    let mut attributes = BTreeMap::new();
    for label in &args.labels {
        let (key, value) = label
            .split_once('=')
            .with_context(|| format!("label {label:?} is not of the form key=value"))?;
        attributes.insert(key.to_string(), value.to_string());
    }

    let id = args.id.unwrap_or_else(random_id);
    let mut event = Event::new(args.event_type, args.status)
        .with_id(id)
        .with_name(args.name)
        .with_image(args.image);
    event.attributes = attributes;
    event.container_exit_code = args.exit_code;

    service.write(event.clone()).await.context("writing event")?;
    println!("{}", event.to_json_string()?);
    Ok(())
}

async fn read(service: &EventService, args: ReadArgs) -> anyhow::Result<()> {
    let options = ReadOptions {
        filters: args.filters,
        since: args.since,
        until: args.until,
        stream: args.stream,
        from_start: args.from_start,
    };
    // Validate before spawning so bad filters fail loudly.
    options.compile()?;

    let print = |event: &Event| -> anyhow::Result<()> {
        match args.format {
            OutputFormat::Json => println!("{}", event.to_json_string()?),
            OutputFormat::Human => println!("{}", event.to_human_readable(!args.no_trunc)),
        }
        Ok(())
    };

    if !options.stream {
        for event in service.events(options).await? {
            print(&event)?;
        }
        return Ok(());
    }

    let mut rx = service.stream(options);
    loop {
        tokio::select! {
            event = rx.recv() => match event {
                Some(event) => print(&event)?,
                None => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }
    Ok(())
}

/// Returns a 64-character hex ID in the style of container IDs.
fn random_id() -> String {
    format!(
        "{}{}",
        uuid::Uuid::new_v4().simple(),
        uuid::Uuid::new_v4().simple()
    )
}
