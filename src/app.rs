//! radio-tuner application.
//!
//! This module contains a top-level structure [`App`] that represents the whole
//! radio-tuner application and a structure [`AppState`] that contains the
//! application state.

use crate::{
    args::{Args, Command},
    configure::{Configurator, RadioRequest},
    fifo, httpd,
    lock::HardwareLock,
    report::TextReport,
    regs::{DevMem, MemoryBus},
    streamer::{self, Streamer},
};
use anyhow::Result;
use radio_tuner_json::Report;
use std::net::SocketAddr;
use std::sync::Arc;

/// radio-tuner application.
///
/// This struct represents the radio-tuner application. It owns the
/// application state and runs the command given in the CLI arguments.
#[derive(Debug)]
pub struct App {
    state: AppState,
    command: Command,
}

impl App {
    /// Creates a new application.
    #[tracing::instrument(name = "App::new", level = "debug")]
    pub fn new(args: &Args) -> App {
        let lock = if args.no_lock {
            HardwareLock::disabled()
        } else {
            HardwareLock::new(&args.lock_file)
        };
        let backend = if args.simulate {
            tracing::info!("using simulated registers");
            Backend::simulated(MemoryBus::new(), lock)
        } else {
            Backend::DevMem(Configurator::new(DevMem::with_path(&args.devmem), lock))
        };
        App {
            state: AppState::new(backend),
            command: args.command.clone(),
        }
    }

    /// Runs the application.
    ///
    /// For the `httpd` and the unbounded `stream` commands this only returns
    /// if there is a fatal error.
    #[tracing::instrument(name = "App::run", level = "debug", skip_all)]
    pub async fn run(self) -> Result<()> {
        match self.command {
            Command::Configure {
                adc_freq_hz,
                tune_freq_hz,
                streaming,
                json,
            } => {
                let request = RadioRequest {
                    adc_freq_hz,
                    tune_freq_hz,
                    streaming,
                };
                let state = self.state.clone();
                let report = tokio::task::spawn_blocking(move || state.configure(&request)).await?;
                if json {
                    println!("{}", serde_json::to_string_pretty(&report)?);
                } else {
                    print!("{}", TextReport(&report));
                }
                if let Some(error) = report.error {
                    anyhow::bail!("radio was not configured: {error}");
                }
                Ok(())
            }
            Command::Httpd { listen } => httpd::Server::new(&listen, self.state).await?.run().await,
            Command::Stream {
                dest_ip,
                dest_port,
                frames,
            } => {
                let destination = SocketAddr::new(dest_ip, dest_port);
                match self.state.backend() {
                    Backend::DevMem(configurator) => {
                        Streamer::new(configurator.bus().clone(), destination, frames)
                            .run()
                            .await
                    }
                    Backend::Simulated(configurator) => {
                        Streamer::new(configurator.bus().clone(), destination, frames)
                            .run()
                            .await
                    }
                }
            }
            Command::FifoDrain { words } => {
                let state = self.state.clone();
                let summary = tokio::task::spawn_blocking(move || match state.backend() {
                    Backend::DevMem(configurator) => fifo::drain(configurator.bus(), words),
                    Backend::Simulated(configurator) => fifo::drain(configurator.bus(), words),
                })
                .await??;
                tracing::info!(
                    words = summary.words,
                    elapsed = ?summary.elapsed,
                    words_per_second = summary.words_per_second(),
                    "FIFO drain finished"
                );
                println!(
                    "Read {} words in {:.3} s",
                    summary.words,
                    summary.elapsed.as_secs_f64()
                );
                Ok(())
            }
            Command::SendTestPackets {
                dest_ip,
                count,
                port,
            } => {
                let destination = SocketAddr::new(dest_ip, port);
                let sent = streamer::send_test_packets(
                    destination,
                    count,
                    streamer::TEST_PACKET_INTERVAL,
                )
                .await?;
                println!("Sent {sent} of {count} packets to {destination}");
                Ok(())
            }
        }
    }
}

/// Register backend.
///
/// This selects whether the application accesses the FPGA registers through
/// `/dev/mem` or uses simulated registers.
#[derive(Debug, Clone)]
pub enum Backend {
    /// Registers accessed through the physical memory device.
    DevMem(Configurator<DevMem>),
    /// Simulated registers held in memory.
    Simulated(Configurator<MemoryBus>),
}

impl Backend {
    /// Creates a simulated backend using `bus`.
    pub fn simulated(bus: MemoryBus, lock: HardwareLock) -> Backend {
        Backend::Simulated(Configurator::new(bus, lock))
    }
}

/// Application state.
///
/// This struct contains the application state that needs to be shared between
/// different modules, such as different Axum handlers in the HTTP server. The
/// struct behaves as an `Arc<...>`. It is cheaply clonable and clones represent
/// a reference to a shared object.
#[derive(Debug, Clone)]
pub struct AppState(Arc<State>);

#[derive(Debug)]
struct State {
    backend: Backend,
}

impl AppState {
    /// Creates the application state.
    pub fn new(backend: Backend) -> AppState {
        AppState(Arc::new(State { backend }))
    }

    /// Gives access to the register backend.
    pub fn backend(&self) -> &Backend {
        &self.0.backend
    }

    /// Configures the radio.
    ///
    /// This blocks while the registers are accessed. See
    /// [`Configurator::configure`].
    pub fn configure(&self, request: &RadioRequest) -> Report {
        match self.backend() {
            Backend::DevMem(configurator) => configurator.configure(request),
            Backend::Simulated(configurator) => configurator.configure(request),
        }
    }
}
