mod cli;
mod config;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use fhircast_hub_connection::commands::{self, SEND_FHIRCAST};
use fhircast_hub_connection::{CommandOutput, EventKind, FhircastClient, FhircastConfig, HubEvent};
use fhircast_protocol::{ContextEntry, FhircastMessage};

use cli::{Cli, Commands, ListenArgs, PublishArgs};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,fhircast=debug")),
        )
        .init();

    if let Err(e) = run().await {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let mut settings = config::load(cli.config.as_deref())?;
    if let Some(hub) = cli.hub {
        settings.default_hub = Some(hub);
    }

    match cli.command {
        Commands::Hubs => {
            list_hubs(&settings);
            Ok(())
        }
        Commands::Listen(args) => listen(settings, args).await,
        Commands::Publish(args) => publish(settings, args).await,
    }
}

fn list_hubs(settings: &FhircastConfig) {
    let Some(hubs) = settings.hubs.as_deref() else {
        println!("no hubs configured");
        return;
    };
    for hub in hubs {
        let marker = if settings.default_hub.as_deref() == Some(hub.name.as_str()) {
            "*"
        } else {
            " "
        };
        let state = if hub.enabled { "enabled" } else { "disabled" };
        println!(
            "{marker} {:<16} {:<24} {:<8} {}",
            hub.name,
            hub.display_name(),
            state,
            hub.hub_endpoint
        );
    }
}

/// Starts the client on the selected hub and makes sure it holds a token.
async fn connect(settings: FhircastConfig, topic: Option<&str>) -> Result<FhircastClient> {
    let client = FhircastClient::start(settings).await?;
    let hub = client.hub().await;
    if hub.name.is_empty() {
        bail!("no hub selected: set defaultHub in the config or pass --hub");
    }
    if hub.token.is_empty() && !client.acquire_token().await {
        bail!("token request to {} failed", hub.display_name());
    }
    if let Some(topic) = topic {
        client.set_topic(topic).await;
    }
    Ok(client)
}

async fn listen(settings: FhircastConfig, args: ListenArgs) -> Result<()> {
    let client = connect(settings, args.topic.as_deref()).await?;

    let _messages = client
        .events()
        .subscribe(EventKind::MessageReceived, |event| {
            if let HubEvent::MessageReceived(message) = event {
                match serde_json::to_string(message) {
                    Ok(line) => println!("{line}"),
                    Err(e) => tracing::warn!(error = %e, "failed to print event"),
                }
            }
        });
    let _closed = client.events().subscribe(EventKind::ChannelClosed, |event| {
        if let HubEvent::ChannelClosed { hub } = event {
            info!(hub = %hub, "event channel closed");
        }
    });

    if !client.is_subscribed().await {
        let outcome = client.subscribe().await;
        if !outcome.is_accepted() {
            bail!("subscribe failed: {outcome}");
        }
    }
    info!(topic = ?client.topic().await, "listening, press Ctrl-C to stop");

    tokio::signal::ctrl_c()
        .await
        .context("failed to wait for Ctrl-C")?;
    client.shutdown().await;
    Ok(())
}

async fn publish(settings: FhircastConfig, args: PublishArgs) -> Result<()> {
    let message = build_message(&args)?;
    let client = connect(settings, args.topic.as_deref()).await?;

    let payload = serde_json::json!({ "fhircastMessage": message });
    let output = commands::dispatch(&client, SEND_FHIRCAST, payload).await?;
    client.shutdown().await;

    match output {
        CommandOutput::Published(Some(status)) => {
            println!("published ({status})");
            Ok(())
        }
        CommandOutput::Published(None) => bail!("publish failed: no response from hub"),
        CommandOutput::Acknowledged => Ok(()),
    }
}

fn build_message(args: &PublishArgs) -> Result<FhircastMessage> {
    if let Some(path) = &args.file {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        return serde_json::from_str(&content)
            .with_context(|| format!("failed to parse {}", path.display()));
    }

    let Some(event) = &args.event else {
        bail!("either --event or --file is required");
    };
    let context = args
        .context
        .iter()
        .map(|raw| parse_context_entry(raw))
        .collect::<Result<Vec<_>>>()?;
    Ok(FhircastMessage::new(event.as_str(), context))
}

/// Parses `key=<json>`.
fn parse_context_entry(raw: &str) -> Result<ContextEntry> {
    let Some((key, resource)) = raw.split_once('=') else {
        bail!("context entry {raw:?} is not key=<json>");
    };
    let resource = serde_json::from_str(resource)
        .with_context(|| format!("context entry {key:?} is not valid JSON"))?;
    Ok(ContextEntry::new(key.trim(), resource))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_entry_parsing() {
        let entry = parse_context_entry(r#"patient={"resourceType":"Patient","id":"p1"}"#).unwrap();
        assert_eq!(entry.key, "patient");
        assert_eq!(entry.resource["id"], "p1");

        assert!(parse_context_entry("patient").is_err());
        assert!(parse_context_entry("patient={oops").is_err());
    }

    #[test]
    fn publish_args_build_message() {
        let cli = Cli::try_parse_from([
            "fhircast",
            "publish",
            "--event",
            "patient-open",
            "-x",
            r#"patient={"id":"p1"}"#,
            "-x",
            r#"study={"uid":"1.2"}"#,
        ])
        .unwrap();
        let Commands::Publish(args) = cli.command else {
            panic!("expected publish");
        };
        let message = build_message(&args).unwrap();
        assert_eq!(message.event.event, "patient-open");
        let keys: Vec<_> = message.event.context.iter().map(|c| c.key.as_str()).collect();
        assert_eq!(keys, ["patient", "study"]);
    }

    #[test]
    fn publish_requires_event_or_file() {
        assert!(Cli::try_parse_from(["fhircast", "publish"]).is_err());
        assert!(
            Cli::try_parse_from(["fhircast", "publish", "--file", "m.json", "--event", "x"])
                .is_err()
        );
    }

    #[test]
    fn global_hub_override() {
        let cli = Cli::try_parse_from(["fhircast", "listen", "--hub", "B", "--topic", "room1"])
            .unwrap();
        assert_eq!(cli.hub.as_deref(), Some("B"));
        let Commands::Listen(args) = cli.command else {
            panic!("expected listen");
        };
        assert_eq!(args.topic.as_deref(), Some("room1"));
    }
}
