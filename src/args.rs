//! radio-tuner CLI arguments.
//!
//! This module contains the definition of the CLI arguments for the
//! radio-tuner application.

use crate::{
    fifo::DEFAULT_DRAIN_WORDS, lock::DEFAULT_LOCK_FILE, regs::DevMem,
    streamer::TEST_PACKET_PORT,
};
use clap::{Parser, Subcommand};
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

/// radio-tuner CLI arguments.
#[derive(Parser, Debug, Clone, PartialEq)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// Physical memory device
    #[clap(long, global = true, default_value = DevMem::DEFAULT_PATH)]
    pub devmem: PathBuf,
    /// Lock file used to serialize access to the radio registers
    #[clap(long, global = true, default_value = DEFAULT_LOCK_FILE)]
    pub lock_file: PathBuf,
    /// Access the radio registers without taking the lock file
    #[clap(long, global = true)]
    pub no_lock: bool,
    /// Use simulated registers instead of the FPGA
    #[clap(long, global = true)]
    pub simulate: bool,
    /// Command to run
    #[clap(subcommand)]
    pub command: Command,
}

/// radio-tuner commands.
#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Set the NCO frequencies and the streaming enable
    Configure {
        /// ADC reference frequency in Hz
        #[clap(long, default_value_t = 0.0, allow_negative_numbers = true)]
        adc_freq_hz: f64,
        /// Tuner LO frequency in Hz
        #[clap(long, default_value_t = 0.0, allow_negative_numbers = true)]
        tune_freq_hz: f64,
        /// Enable sample streaming
        #[clap(long)]
        streaming: bool,
        /// Print the report as JSON
        #[clap(long)]
        json: bool,
    },
    /// Serve the radio configuration API over HTTP
    Httpd {
        /// Listen address for the HTTP server
        #[clap(long, default_value = "0.0.0.0:8000")]
        listen: SocketAddr,
    },
    /// Stream IQ frames from the receive FIFO over UDP
    Stream {
        /// Destination IP address
        dest_ip: IpAddr,
        /// Destination UDP port
        dest_port: u16,
        /// Stop after sending this number of frames
        #[clap(long)]
        frames: Option<u64>,
    },
    /// Read and discard words from the receive FIFO
    FifoDrain {
        /// Number of words to read
        #[clap(long, default_value_t = DEFAULT_DRAIN_WORDS)]
        words: usize,
    },
    /// Send UDP test packets
    SendTestPackets {
        /// Destination IP address
        dest_ip: IpAddr,
        /// Number of packets to send
        #[clap(long, default_value_t = 10)]
        count: u32,
        /// Destination UDP port
        #[clap(long, default_value_t = TEST_PACKET_PORT)]
        port: u16,
    },
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn configure() {
        let args = Args::parse_from([
            "radio-tuner",
            "--no-lock",
            "configure",
            "--adc-freq-hz",
            "10e6",
            "--tune-freq-hz",
            "-5e6",
            "--streaming",
        ]);
        assert!(args.no_lock);
        assert!(!args.simulate);
        assert_eq!(args.devmem, PathBuf::from("/dev/mem"));
        assert_eq!(
            args.command,
            Command::Configure {
                adc_freq_hz: 10e6,
                tune_freq_hz: -5e6,
                streaming: true,
                json: false,
            }
        );
    }

    #[test]
    fn global_flags_after_subcommand() {
        let args = Args::parse_from(["radio-tuner", "fifo-drain", "--simulate"]);
        assert!(args.simulate);
        assert_eq!(
            args.command,
            Command::FifoDrain {
                words: DEFAULT_DRAIN_WORDS
            }
        );
    }

    #[test]
    fn send_test_packets() {
        let args = Args::parse_from([
            "radio-tuner",
            "send-test-packets",
            "192.168.1.2",
            "--count",
            "3",
        ]);
        assert_eq!(
            args.command,
            Command::SendTestPackets {
                dest_ip: "192.168.1.2".parse().unwrap(),
                count: 3,
                port: 25344,
            }
        );
    }

    #[test]
    fn verify() {
        use clap::CommandFactory;
        Args::command().debug_assert();
    }
}
