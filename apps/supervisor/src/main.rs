use std::{path::PathBuf, time::Duration};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use control_core::{
    commands::{self, DurationUnit},
    Availability, ControlClient, ControlCommand, Outcome,
};
use shared::domain::{Control, Snapshot};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod config;
mod render;

use config::load_settings;

#[derive(Parser, Debug)]
#[command(name = "supervisor", about = "Operator console for the pond controller")]
struct Cli {
    #[arg(long)]
    config: Option<PathBuf>,
    /// Overrides the controller base URL from settings.
    #[arg(long)]
    controller_url: Option<String>,
    /// Skip the availability gates and send straight to the controller.
    #[arg(long)]
    force: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print every state update until interrupted.
    Watch {
        #[arg(long)]
        period_ms: Option<u64>,
        #[arg(long)]
        count: Option<usize>,
        #[arg(long)]
        json: bool,
    },
    Status {
        #[arg(long)]
        json: bool,
    },
    TogglePh,
    ToggleO2,
    DoseUp {
        preset: u8,
    },
    DoseDown {
        preset: u8,
    },
    Aerate {
        amount: u64,
        #[arg(default_value = "min")]
        unit: String,
    },
    StopAerators,
    EmergencyStop,
    ResetLock,
    /// Send a raw controller token.
    Send {
        token: String,
        #[arg(long = "control", value_parser = parse_control)]
        controls: Vec<Control>,
    },
}

fn parse_control(raw: &str) -> Result<Control, String> {
    match raw.to_ascii_lowercase().as_str() {
        "ph" => Ok(Control::Ph),
        "o2" => Ok(Control::O2),
        other => Err(format!("unknown control '{other}', expected ph or o2")),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut settings = load_settings(cli.config.as_deref())?;
    if let Some(url) = cli.controller_url.clone() {
        settings.controller_url = url;
    }

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.log_filter))
        .context("invalid log filter")?;
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let client = ControlClient::connect(
        &settings.transport_config()?,
        settings.confirmation_policy(),
    )?;

    match cli.command {
        Command::Watch {
            period_ms,
            count,
            json,
        } => {
            let period = period_ms
                .map(Duration::from_millis)
                .unwrap_or_else(|| settings.poll_period());
            watch(&client, period, count, json).await
        }
        Command::Status { json } => {
            let (snapshot, availability) = client.refresh().await?;
            print_state(&snapshot, &availability, json)
        }
        command => {
            let command = resolve(&client, command).await?;
            run_action(&client, &command, cli.force).await
        }
    }
}

/// Builds the controller command for an action subcommand. Toggles need the
/// current mode, so they poll first.
async fn resolve(client: &ControlClient, command: Command) -> Result<ControlCommand> {
    Ok(match command {
        Command::TogglePh => commands::toggle_ph(&client.refresh().await?.0),
        Command::ToggleO2 => commands::toggle_o2(&client.refresh().await?.0),
        Command::DoseUp { preset } => ControlCommand::DosePhUp { preset },
        Command::DoseDown { preset } => ControlCommand::DosePhDown { preset },
        Command::Aerate { amount, unit } => {
            let unit: DurationUnit = unit.parse()?;
            commands::aerate_for(amount, unit)?
        }
        Command::StopAerators => ControlCommand::StopAerators,
        Command::EmergencyStop => ControlCommand::EmergencyStop,
        Command::ResetLock => ControlCommand::ResetSafetyLock,
        Command::Send { token, controls } => ControlCommand::raw(token, controls),
        Command::Watch { .. } | Command::Status { .. } => {
            bail!("not an operator action")
        }
    })
}

async fn run_action(client: &ControlClient, command: &ControlCommand, force: bool) -> Result<()> {
    let outcome = if force {
        warn!(token = %command, "sending without availability checks");
        client.dispatcher().dispatch(command).await
    } else {
        client.perform(command).await?
    };

    println!("{}", render::outcome_line(&command.token(), &outcome));
    match outcome {
        Outcome::TransportError { message } => bail!("command was not delivered: {message}"),
        Outcome::Confirmed { snapshot, .. } => {
            if let Some(availability) = client.reconciler().availability() {
                print_state(&snapshot, &availability, false)?;
            }
            Ok(())
        }
        Outcome::Unconfirmed { .. } => Ok(()),
    }
}

async fn watch(
    client: &ControlClient,
    period: Duration,
    count: Option<usize>,
    json: bool,
) -> Result<()> {
    let mut subscription = client.reconciler().subscribe(period);
    info!(period_ms = period.as_millis() as u64, "watching controller state");

    let mut seen = 0usize;
    let mut shown: Vec<String> = Vec::new();
    loop {
        tokio::select! {
            update = subscription.recv() => {
                let Some(update) = update else { break };
                // Countdowns tick on every heartbeat, so compare rendered text.
                let lines = render::update_lines(&update);
                if lines != shown {
                    if json {
                        print_json(&update.snapshot, &update.availability, update.is_stale())?;
                    } else {
                        print_lines(&lines);
                    }
                    shown = lines;
                }
                seen += 1;
                if count.is_some_and(|limit| seen >= limit) {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }
    Ok(())
}

fn print_state(snapshot: &Snapshot, availability: &Availability, json: bool) -> Result<()> {
    if json {
        print_json(snapshot, availability, false)
    } else {
        print_lines(&render::status_lines(snapshot, availability));
        Ok(())
    }
}

fn print_json(snapshot: &Snapshot, availability: &Availability, stale: bool) -> Result<()> {
    let value = serde_json::json!({
        "snapshot": snapshot,
        "availability": availability,
        "stale": stale,
    });
    println!("{}", serde_json::to_string(&value)?);
    Ok(())
}

fn print_lines(lines: &[String]) {
    for line in lines {
        println!("{line}");
    }
    println!();
}
