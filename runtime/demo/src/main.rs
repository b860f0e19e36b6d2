use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use pbxlink_client::dialer::dial_all;
use pbxlink_client::{Client, ClientConfig, OutCall};
use pbxlink_fabric::Transport;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const APP_NAME: &str = "PBX client demo app";
const CALL_TIMEOUT: Duration = Duration::from_secs(5);

/// Place a handful of demo calls through a PBX server
#[derive(Parser, Debug)]
#[command(name = "pbxlink-demo", version)]
struct Cli {
    /// TOML file with client settings
    #[arg(long)]
    config: Option<PathBuf>,

    /// Comma-separated NATS servers, overrides the config file
    #[arg(long)]
    servers: Option<String>,

    /// Comma-separated CA certificate files for TLS servers
    #[arg(long)]
    root_cas: Option<String>,

    /// Use the simulated transport instead of a live server
    #[arg(long)]
    simulate: bool,

    /// Seconds to wait for each call result
    #[arg(long, default_value_t = 6)]
    timeout: u64,
}

struct NumberData {
    phone_number: &'static str,
    caller_id: &'static str,
    carrier_id: u32,
    igrp: u32,
    endpoint: &'static str,
    pbx_host: &'static str,
}

const NUMBERS: [NumberData; 3] = [
    NumberData {
        phone_number: "11111",
        caller_id: "+1234",
        carrier_id: 1,
        igrp: 1,
        endpoint: "demo",
        pbx_host: "demo",
    },
    NumberData {
        phone_number: "11112",
        caller_id: "+1234",
        carrier_id: 1,
        igrp: 1,
        endpoint: "demo",
        pbx_host: "demo",
    },
    NumberData {
        phone_number: "11113",
        caller_id: "+1234",
        carrier_id: 1,
        igrp: 1,
        endpoint: "demo",
        pbx_host: "demo",
    },
];

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Started {}", APP_NAME);

    let cli = Cli::parse();
    let config = load_config(&cli)?;
    let calls = NUMBERS
        .iter()
        .map(|number| {
            OutCall::builder()
                .dest_phone_number(number.phone_number)
                .src_phone_number(number.caller_id)
                .carrier_id(number.carrier_id)
                .igrp(number.igrp)
                .endpoint(number.endpoint)
                .pbx_host(number.pbx_host)
                .call_timeout(CALL_TIMEOUT)
                .timeout(Duration::from_secs(cli.timeout))
                .build()
        })
        .collect::<pbxlink_client::Result<Vec<_>>>()?;

    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_signal(cancel.clone()));

    if cli.simulate {
        run(Client::simulated(), calls, cancel).await;
    } else {
        let client = Client::connect(&config)
            .await
            .context("Error initialising pbxclient")?;
        run(client, calls, cancel).await;
    }

    info!("Finished {}", APP_NAME);
    Ok(())
}

fn load_config(cli: &Cli) -> Result<ClientConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            toml::from_str(&text).with_context(|| format!("Invalid config {}", path.display()))?
        }
        None => ClientConfig::default(),
    };

    if let Some(servers) = &cli.servers {
        config.servers = servers.clone();
    }
    if let Some(root_cas) = &cli.root_cas {
        config.root_cas = root_cas.clone();
    }
    Ok(config)
}

async fn run<T: Transport + 'static>(
    client: Client<T>,
    calls: Vec<OutCall>,
    cancel: CancellationToken,
) {
    for outcome in dial_all(&client, calls, cancel).await {
        match outcome.result {
            Ok(response) => info!(
                phone_number = %outcome.call.dest_phone_number,
                status = response.response_status,
                data = ?response.response_data,
                "Call finished"
            ),
            Err(e) => error!(
                phone_number = %outcome.call.dest_phone_number,
                error = %e,
                "Call failed"
            ),
        }
    }
    client.close().await;
}

/// Cancel outstanding calls on SIGINT, SIGTERM or SIGHUP
async fn cancel_on_signal(cancel: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let (Ok(mut term), Ok(mut hup)) =
            (signal(SignalKind::terminate()), signal(SignalKind::hangup()))
        else {
            error!("Failed to install signal handlers");
            return;
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = term.recv() => {}
            _ = hup.recv() => {}
        }
    }

    #[cfg(not(unix))]
    if tokio::signal::ctrl_c().await.is_err() {
        error!("Failed to install signal handlers");
        return;
    }

    info!("Got signal, cancelling calls");
    cancel.cancel();
}
