//! radio-tuner is a userspace configurator for the radio tuner FPGA
//! peripheral of a Zynq SDR design. It computes the phase increments of the
//! NCOs from the requested frequencies, writes them to the memory-mapped
//! registers of the peripheral together with the streaming enable GPIO, and
//! reads them back. The configuration is available from the CLI and through an
//! HTTP API. It also includes tools to read IQ samples from the receive FIFO
//! and stream them over UDP.

#![warn(missing_docs)]

pub mod app;
pub mod args;
pub mod configure;
pub mod fifo;
pub mod httpd;
pub mod lock;
pub mod phase;
pub mod registers;
pub mod regs;
pub mod report;
pub mod streamer;
