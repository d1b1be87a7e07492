use std::path::PathBuf;

use anyhow::{anyhow, Context};
use clap::Parser;
use grbl_report::{ReportConfig, Reporter};
use machine_mock::{
    simulated::SimulatedMachine,
    socat_port::{serve_on_port, DEFAULT_BAUD_RATE},
    trinamic::Tmc2130,
};
use tokio::sync::oneshot;
use tracing::info;

#[derive(Parser, Debug)]
#[command(version = "0.1.0", about = "Serve a simulated GRBL controller on a pseudo-terminal.", long_about = None)]
struct Args {
    /// JSON report configuration; the standard 3-axis build when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
    #[arg(short, long, default_value_t = DEFAULT_BAUD_RATE)]
    baud: u32,
    /// Echo every received line back before acknowledging it.
    #[arg(long)]
    echo: bool,
    /// Axis letters whose stepper drivers report a stall, e.g. `XZ`.
    #[arg(long, default_value = "")]
    stall: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => ReportConfig::load(path)
            .with_context(|| format!("Failed to load configuration from {:?}", path))?,
        None => ReportConfig::standard_3_axis(),
    };
    let machine = SimulatedMachine::new(&config).with_echo(args.echo);
    let driver = Tmc2130::new(config.axis_count).with_stalled_axes(&args.stall)?;
    let reporter = Reporter::new(config.clone()).with_driver(driver);

    let (sender, receiver) = oneshot::channel();
    let mut sender = Some(sender);
    ctrlc::set_handler(move || {
        if let Some(sender) = sender.take() {
            drop(sender.send(()));
        }
    })
    .map_err(|err| anyhow!("Failed to install Ctrl-C handler: {}", err))?;

    let port = serve_on_port(machine, reporter, args.baud).await?;
    println!("{}", port.path().display());
    info!("press Ctrl-C to stop");

    drop(receiver.await);
    info!("shutting down");
    port.close().await?;
    Ok(())
}
