//! Radio configuration.
//!
//! This module contains the configuration sequence of the radio tuner: the
//! requested frequencies are converted to phase increments, which are written
//! to the radio tuner registers together with the streaming enable GPIO, and
//! the registers are read back to produce a [`Report`].

use crate::{
    lock::HardwareLock,
    phase,
    registers::{RadioTuner, StreamGpio, MAP_SIZE, RADIO_PERIPH_ADDRESS, STREAM_GPIO_ADDRESS},
    regs::{RegisterBus, RegisterPort},
};
use anyhow::Result;
use radio_tuner_json::{PhaseIncrement, PutRadio, Readback, RegisterValue, Report, Streaming};

/// Value of the `streaming` parameter that enables streaming.
pub const STREAMING_TOKEN: &str = "streaming";

/// Radio configuration request.
#[derive(Debug, Copy, Clone, PartialEq, Default)]
pub struct RadioRequest {
    /// ADC reference frequency in Hz.
    pub adc_freq_hz: f64,
    /// Tuner LO frequency in Hz.
    pub tune_freq_hz: f64,
    /// Enable sample streaming.
    pub streaming: bool,
}

impl RadioRequest {
    /// Parses a request from an URL query string.
    ///
    /// The query string can contain the parameters `adc_freq_hz`,
    /// `tune_freq_hz` and `streaming`. See [`RadioRequest::from_pairs`].
    pub fn from_query(query: &str) -> RadioRequest {
        match serde_urlencoded::from_str::<Vec<(String, String)>>(query) {
            Ok(pairs) => RadioRequest::from_pairs(pairs),
            Err(err) => {
                tracing::debug!("malformed query string {query:?}: {err}");
                RadioRequest::default()
            }
        }
    }

    /// Parses a request from a list of key-value pairs.
    ///
    /// Parsing is lenient: frequencies that are missing or cannot be parsed
    /// are taken as `0.0`, and streaming is only enabled if the value of
    /// `streaming` is exactly [`STREAMING_TOKEN`]. If a parameter appears
    /// several times, the first occurrence is used.
    pub fn from_pairs<I, K, V>(pairs: I) -> RadioRequest
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut adc_freq_hz = None;
        let mut tune_freq_hz = None;
        let mut streaming = None;
        for (key, value) in pairs {
            let slot = match key.as_ref() {
                "adc_freq_hz" => &mut adc_freq_hz,
                "tune_freq_hz" => &mut tune_freq_hz,
                "streaming" => &mut streaming,
                _ => continue,
            };
            if slot.is_none() {
                *slot = Some(value.as_ref().to_string());
            }
        }
        RadioRequest {
            adc_freq_hz: parse_frequency("adc_freq_hz", adc_freq_hz.as_deref()),
            tune_freq_hz: parse_frequency("tune_freq_hz", tune_freq_hz.as_deref()),
            streaming: streaming.as_deref() == Some(STREAMING_TOKEN),
        }
    }
}

fn parse_frequency(name: &str, value: Option<&str>) -> f64 {
    let Some(value) = value else {
        return 0.0;
    };
    match value.trim().parse::<f64>() {
        Ok(frequency) => frequency,
        Err(err) => {
            tracing::debug!("invalid {name} {value:?} ({err}), using 0.0");
            0.0
        }
    }
}

impl From<PutRadio> for RadioRequest {
    fn from(put: PutRadio) -> RadioRequest {
        RadioRequest {
            adc_freq_hz: put.adc_freq_hz,
            tune_freq_hz: put.tune_freq_hz,
            streaming: put.streaming,
        }
    }
}

/// Radio configurator.
///
/// The configurator opens the radio tuner and the streaming GPIO on a
/// [`RegisterBus`] each time that a request is handled, and closes them before
/// returning, so no hardware resources are held between requests. The
/// [`HardwareLock`] is held during the whole register access sequence.
#[derive(Debug, Clone)]
pub struct Configurator<B> {
    bus: B,
    lock: HardwareLock,
}

impl<B: RegisterBus> Configurator<B> {
    /// Creates a new configurator.
    pub fn new(bus: B, lock: HardwareLock) -> Configurator<B> {
        Configurator { bus, lock }
    }

    /// Gives access to the register bus.
    pub fn bus(&self) -> &B {
        &self.bus
    }

    /// Configures the radio.
    ///
    /// Hardware access errors do not make this function fail. Instead, they
    /// are included in the [`Report`], which then contains no readback values.
    /// If any of the peripherals cannot be opened, no register is written.
    #[tracing::instrument(name = "Configurator::configure", level = "debug", skip(self))]
    pub fn configure(&self, request: &RadioRequest) -> Report {
        if phase::adc_phase_increment_saturates(request.adc_freq_hz) {
            tracing::warn!(
                frequency = request.adc_freq_hz,
                "ADC phase increment out of range, saturating"
            );
        }
        if phase::tuner_phase_increment_saturates(request.tune_freq_hz) {
            tracing::warn!(
                frequency = request.tune_freq_hz,
                "tuner phase increment out of range, saturating"
            );
        }
        let adc_pinc = phase::adc_phase_increment(request.adc_freq_hz);
        let tuner_pinc = phase::tuner_phase_increment(request.tune_freq_hz);
        tracing::info!(
            adc_pinc,
            tuner_pinc,
            streaming = request.streaming,
            "configuring radio"
        );

        let (readback, error) = match self.write_registers(adc_pinc, tuner_pinc, request.streaming)
        {
            Ok(readback) => (Some(readback), None),
            Err(err) => {
                tracing::error!("could not access radio registers: {err:#}");
                (None, Some(format!("{err:#}")))
            }
        };

        Report {
            adc_freq_hz: request.adc_freq_hz,
            tune_freq_hz: request.tune_freq_hz,
            adc_phase_increment: PhaseIncrement::new(adc_pinc),
            tuner_phase_increment: PhaseIncrement::new(tuner_pinc),
            streaming: Streaming::from(request.streaming),
            readback,
            error,
        }
    }

    fn write_registers(&self, adc_pinc: i32, tuner_pinc: i32, streaming: bool) -> Result<Readback> {
        let _lock = self.lock.acquire()?;
        // If the GPIO fails to open, the radio port is dropped (and therefore
        // closed) before anything is written.
        let mut radio = RadioTuner::new(self.bus.open(RADIO_PERIPH_ADDRESS, MAP_SIZE)?);
        let mut gpio = StreamGpio::new(self.bus.open(STREAM_GPIO_ADDRESS, MAP_SIZE)?);

        radio.set_adc_phase_increment(adc_pinc);
        radio.set_tuner_phase_increment(tuner_pinc);
        gpio.set_streaming(streaming);

        let readback = Readback {
            adc_phase_increment: RegisterValue::new(radio.adc_phase_increment()),
            tuner_phase_increment: RegisterValue::new(radio.tuner_phase_increment()),
        };

        // GPIO is closed before the radio. Both are closed even if the first
        // close fails.
        let gpio_closed = gpio.port_mut().close();
        let radio_closed = radio.port_mut().close();
        gpio_closed?;
        radio_closed?;
        Ok(readback)
    }
}
