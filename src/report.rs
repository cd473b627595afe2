//! Text rendering of configuration reports.

use radio_tuner_json::Report;
use std::fmt;

/// Human-readable form of a [`Report`].
///
/// The `Display` implementation renders the report as plain text, one item per
/// line.
#[derive(Debug, Copy, Clone)]
pub struct TextReport<'a>(pub &'a Report);

impl fmt::Display for TextReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let report = self.0;
        writeln!(f, "Radio Configurator")?;
        writeln!(
            f,
            "ADC Freq = {:.3} Hz, Tune Freq = {:.3} Hz",
            report.adc_freq_hz, report.tune_freq_hz
        )?;
        writeln!(
            f,
            "Computed ADC phase_input = {} ({})",
            report.adc_phase_increment.value, report.adc_phase_increment.hex
        )?;
        writeln!(
            f,
            "Computed Tuner phase_input = {} ({})",
            report.tuner_phase_increment.value, report.tuner_phase_increment.hex
        )?;
        writeln!(f, "Streaming requested: {}", report.streaming)?;
        match (&report.readback, &report.error) {
            (_, Some(error)) => writeln!(f, "ERROR: {error}"),
            (Some(readback), None) => {
                writeln!(f, "Register Readback")?;
                writeln!(f, "Fake ADC PINC = {}", readback.adc_phase_increment.hex)?;
                writeln!(f, "Tuner PINC    = {}", readback.tuner_phase_increment.hex)?;
                writeln!(f, "Streaming is {}", report.streaming)
            }
            (None, None) => Ok(()),
        }
    }
}
