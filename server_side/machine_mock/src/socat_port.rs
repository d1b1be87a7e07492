//! Puts a simulated controller behind a pseudo-terminal pair, so any sender
//! that can open a serial port can talk to it.
//!
//! Needs `socat` on the `PATH`.

use std::{
    convert::Infallible,
    future::Future,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{anyhow, Context, Result};
use grbl_report::Reporter;
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tempdir::TempDir;
use tokio::{
    io::{split, ReadHalf, WriteHalf},
    join,
    process::{Child, Command},
    sync::oneshot,
    task::JoinHandle,
};
use tokio_serial::{DataBits, FlowControl, Parity, SerialPortBuilderExt, SerialStream, StopBits};
use tracing::{debug, info, warn};

use crate::simulated::{simulated_machine, SimulatedMachine};

pub const DEFAULT_BAUD_RATE: u32 = 115_200;
const CREATION_WAIT_RETRIES: u32 = 10;

pub type PortReader = ReadHalf<SerialStream>;
pub type PortWriter = WriteHalf<SerialStream>;

/// Resolves once `path` exists. The watcher is armed before the existence check,
/// so a creation between the two is not missed.
fn watch_for_creation(path: &Path) -> Result<impl Future<Output = Result<()>>> {
    let file_name = path
        .file_name()
        .ok_or_else(|| anyhow!("Invalid port path: {:?}", path))?
        .to_owned();
    let directory = path
        .parent()
        .ok_or_else(|| anyhow!("Invalid port path: {:?}", path))?;
    let (sender, receiver) = oneshot::channel();
    let mut sender = Some(sender);
    let mut watcher = RecommendedWatcher::new(
        move |event: notify::Result<notify::Event>| match event {
            Ok(event) => {
                let created = matches!(event.kind, EventKind::Create(_))
                    && event.paths.iter().any(|path| path.ends_with(&file_name));
                if created {
                    if let Some(sender) = sender.take() {
                        drop(sender.send(()));
                    }
                }
            }
            Err(err) => warn!(%err, "port watcher failed"),
        },
        notify::Config::default(),
    )?;
    watcher.watch(directory, RecursiveMode::NonRecursive)?;
    let path = path.to_owned();
    Ok(async move {
        let result = if path.exists() { Ok(()) } else { receiver.await };
        drop(watcher);
        result.map_err(|_| anyhow!("Watcher stopped before {:?} was created", path))
    })
}

async fn wait_for_creation(path: &Path) -> Result<()> {
    let mut retries = 0;
    loop {
        let result = match watch_for_creation(path) {
            Ok(created) => created.await,
            Err(err) => Err(err),
        };
        match result {
            Ok(()) => return Ok(()),
            Err(err) if retries < CREATION_WAIT_RETRIES => {
                retries += 1;
                debug!(?path, %err, retries, "waiting for port again");
            }
            Err(err) => return Err(err),
        }
    }
}

/// Sends SIGINT so socat removes its links; killing it would leave them behind.
async fn interrupt(mut child: Child) -> Result<()> {
    if let Some(pid) = child.id() {
        Command::new("kill")
            .arg("-2")
            .arg(pid.to_string())
            .spawn()?
            .wait()
            .await?;
        child.wait().await?;
    }
    Ok(())
}

/// The socat process joining the two pseudo-terminals.
struct Bridge(Option<Child>);

impl Bridge {
    async fn shutdown(mut self) -> Result<()> {
        match self.0.take() {
            Some(child) => interrupt(child).await,
            None => Ok(()),
        }
    }
}

impl Drop for Bridge {
    fn drop(&mut self) {
        if let Some(child) = self.0.take() {
            tokio::spawn(interrupt(child));
        }
    }
}

async fn create_port_pair(host_path: &Path, machine_path: &Path) -> Result<Bridge> {
    let child = Command::new("socat")
        .arg(format!("pty,raw,echo=0,link={}", host_path.to_string_lossy()))
        .arg(format!("pty,raw,echo=0,link={}", machine_path.to_string_lossy()))
        .kill_on_drop(true)
        .spawn()
        .context("Failed to start socat")?;
    let bridge = Bridge(Some(child));
    let (host, machine) = join!(wait_for_creation(host_path), wait_for_creation(machine_path));
    host?;
    machine?;
    Ok(bridge)
}

/// Opens a port 8N1 without flow control, as GRBL controllers expect.
pub fn open_port(path: &Path, baud_rate: u32) -> Result<(PortReader, PortWriter)> {
    let port = tokio_serial::new(path.to_string_lossy(), baud_rate)
        .data_bits(DataBits::Eight)
        .flow_control(FlowControl::None)
        .timeout(Duration::from_millis(30))
        .parity(Parity::None)
        .stop_bits(StopBits::One)
        .open_native_async()
        .with_context(|| format!("Failed to open {:?}", path))?;
    Ok(split(port))
}

/// Host end of a running simulated port. Dropping it stops the machine task and
/// tears the port pair down.
pub struct SimulatedPort {
    path: PathBuf,
    halt: oneshot::Sender<Infallible>,
    teardown: JoinHandle<()>,
}

impl SimulatedPort {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Like dropping, but waits until socat has exited and its links are gone.
    pub async fn close(self) -> Result<()> {
        drop(self.halt);
        self.teardown.await.context("Port teardown panicked")
    }
}

/// Runs `machine` on one end of a fresh port pair and returns the other end.
/// Must be called from within a tokio runtime.
pub async fn spawn_on_port<F, Fut>(baud_rate: u32, machine: F) -> Result<SimulatedPort>
where
    F: FnOnce(PortReader, PortWriter) -> Fut,
    Fut: Future<Output = ()> + Send + 'static,
{
    let directory = TempDir::new("grbl-port")?;
    let host_path = directory.path().join("host_port");
    let machine_path = directory.path().join("machine_port");
    let bridge = create_port_pair(&host_path, &machine_path).await?;
    let (input, output) = open_port(&machine_path, baud_rate)?;
    let machine_task = tokio::spawn(machine(input, output));

    let (halt, halted) = oneshot::channel::<Infallible>();
    let teardown = tokio::spawn(async move {
        drop(halted.await);
        machine_task.abort();
        drop(machine_task.await);
        if let Err(err) = bridge.shutdown().await {
            warn!("failed to stop socat: {:#}", err);
        }
        // Outlives the links socat created inside it.
        drop(directory);
        debug!("simulated port closed");
    });

    info!(path = ?host_path, baud_rate, "simulated port ready");
    Ok(SimulatedPort { path: host_path, halt, teardown })
}

/// Serves `machine` on a new pseudo-terminal.
pub async fn serve_on_port(
    machine: SimulatedMachine,
    reporter: Reporter,
    baud_rate: u32,
) -> Result<SimulatedPort> {
    spawn_on_port(baud_rate, move |input, output| {
        simulated_machine(machine, reporter, input, output)
    })
    .await
}
