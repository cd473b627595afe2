//! radio-tuner-json contains the JSON schemas used by the radio-tuner
//! configurator API.

#![warn(missing_docs)]

use serde::{Deserialize, Serialize};

/// Radio configuration report JSON schema.
///
/// This JSON schema corresponds to the responses to GET and PUT requests on
/// `/api/radio`. It contains the requested frequencies, the phase increments
/// computed from them, the streaming state, and either the values read back
/// from the radio tuner registers or the error that prevented accessing the
/// hardware.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Report {
    /// Requested ADC reference frequency in Hz.
    pub adc_freq_hz: f64,
    /// Requested tuner LO frequency in Hz.
    pub tune_freq_hz: f64,
    /// Phase increment computed for the ADC NCO.
    pub adc_phase_increment: PhaseIncrement,
    /// Phase increment computed for the tuner NCO.
    pub tuner_phase_increment: PhaseIncrement,
    /// Requested streaming state.
    pub streaming: Streaming,
    /// Values read back from the radio tuner registers.
    ///
    /// This is `None` if the hardware could not be accessed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub readback: Option<Readback>,
    /// Description of the error that prevented accessing the hardware.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Radio configuration PUT JSON schema.
///
/// This JSON schema corresponds to PUT requests on `/api/radio`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct PutRadio {
    /// ADC reference frequency in Hz.
    #[serde(default)]
    pub adc_freq_hz: f64,
    /// Tuner LO frequency in Hz.
    #[serde(default)]
    pub tune_freq_hz: f64,
    /// Enable sample streaming.
    #[serde(default)]
    pub streaming: bool,
}

/// NCO phase increment.
///
/// The phase increment is given as a signed decimal value and as the
/// hexadecimal representation of its 32-bit two's complement.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
pub struct PhaseIncrement {
    /// Signed value.
    pub value: i32,
    /// 8-digit uppercase hexadecimal, prefixed by `0x`.
    pub hex: String,
}

impl PhaseIncrement {
    /// Creates a phase increment from its signed value.
    pub fn new(value: i32) -> PhaseIncrement {
        PhaseIncrement {
            value,
            hex: hex32(value as u32),
        }
    }
}

/// Register readback JSON schema.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
pub struct Readback {
    /// Contents of the ADC phase increment register.
    pub adc_phase_increment: RegisterValue,
    /// Contents of the tuner phase increment register.
    pub tuner_phase_increment: RegisterValue,
}

/// Contents of a 32-bit register.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
pub struct RegisterValue {
    /// Raw register value.
    pub value: u32,
    /// 8-digit uppercase hexadecimal, prefixed by `0x`.
    pub hex: String,
}

impl RegisterValue {
    /// Creates a register value.
    pub fn new(value: u32) -> RegisterValue {
        RegisterValue {
            value,
            hex: hex32(value),
        }
    }
}

fn hex32(value: u32) -> String {
    format!("0x{value:08X}")
}

/// Sample streaming state.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Streaming {
    /// Samples are streamed out of the peripheral.
    Enabled,
    /// Sample streaming is gated off.
    Disabled,
}

impl From<bool> for Streaming {
    fn from(enabled: bool) -> Streaming {
        if enabled {
            Streaming::Enabled
        } else {
            Streaming::Disabled
        }
    }
}

impl Streaming {
    /// Returns `true` if streaming is enabled.
    pub fn is_enabled(self) -> bool {
        self == Streaming::Enabled
    }
}

macro_rules! impl_str_conv {
    ($ty:ty, $($s:expr => $v:ident),*) => {
        impl std::str::FromStr for $ty {
            type Err = ();

            fn from_str(s: &str) -> Result<Self, ()> {
                Ok(match s {
                    $(
                        $s => <$ty>::$v,
                    )*
                        _ => return Err(()),
                })
            }
        }

        impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> Result<(), std::fmt::Error> {
                write!(f, "{}", match self {
                    $(
                        <$ty>::$v => $s,
                    )*
                })
            }
        }
    }
}

impl_str_conv!(Streaming,
               "Enabled" => Enabled,
               "Disabled" => Disabled);

/// Versions JSON schema.
///
/// This JSON schema corresponds to GET requests on `/api/version`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
pub struct Versions {
    /// Git version of radio-tuner.
    pub radio_tuner_git: String,
    /// Version of radio-tuner.
    pub radio_tuner_version: String,
}
