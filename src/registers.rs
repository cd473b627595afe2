//! Register map of the radio FPGA design.
//!
//! This module contains the physical addresses and register offsets of the
//! peripherals in the FPGA design, and typed wrappers that access them through
//! a [`RegisterPort`].

use crate::regs::RegisterPort;

/// Size of the register window mapped for each peripheral, in bytes.
pub const MAP_SIZE: usize = 4096;

/// Physical address of the radio tuner peripheral.
pub const RADIO_PERIPH_ADDRESS: usize = 0x43C0_0000;

/// Physical address of the AXI GPIO that enables sample streaming.
pub const STREAM_GPIO_ADDRESS: usize = 0x4120_0000;

/// Physical address of the AXI-Stream receive FIFO.
pub const FIFO_ADDRESS: usize = 0x43C1_0000;

/// Word offsets of the radio tuner registers.
pub mod radio {
    /// Phase increment of the fake ADC NCO.
    pub const ADC_PINC: usize = 0;
    /// Phase increment of the tuner NCO.
    pub const TUNER_PINC: usize = 1;
    /// Control register.
    pub const CONTROL: usize = 2;
    /// Free-running timer.
    pub const TIMER: usize = 3;
}

/// Word offsets of the streaming GPIO registers.
pub mod gpio {
    /// GPIO data register. Bit 0 enables streaming.
    pub const DATA: usize = 0;
    /// Streaming enable bit.
    pub const STREAMING_ENABLE: u32 = 1 << 0;
}

/// Word offsets of the receive FIFO registers.
pub mod fifo {
    /// Receive data FIFO occupancy (RDFO, byte offset `0x1c`).
    pub const RDFO: usize = 0x1c / 4;
    /// Receive data FIFO data (RDFD, byte offset `0x20`).
    pub const RDFD: usize = 0x20 / 4;
}

/// Radio tuner peripheral.
#[derive(Debug)]
pub struct RadioTuner<P>(P);

impl<P: RegisterPort> RadioTuner<P> {
    /// Wraps a port opened at [`RADIO_PERIPH_ADDRESS`].
    pub fn new(port: P) -> RadioTuner<P> {
        RadioTuner(port)
    }

    /// Sets the phase increment of the fake ADC NCO.
    pub fn set_adc_phase_increment(&mut self, pinc: i32) {
        self.0.write_word(radio::ADC_PINC, pinc as u32);
    }

    /// Sets the phase increment of the tuner NCO.
    pub fn set_tuner_phase_increment(&mut self, pinc: i32) {
        self.0.write_word(radio::TUNER_PINC, pinc as u32);
    }

    /// Reads the ADC phase increment register.
    pub fn adc_phase_increment(&self) -> u32 {
        self.0.read_word(radio::ADC_PINC)
    }

    /// Reads the tuner phase increment register.
    pub fn tuner_phase_increment(&self) -> u32 {
        self.0.read_word(radio::TUNER_PINC)
    }

    /// Reads the control register.
    pub fn control(&self) -> u32 {
        self.0.read_word(radio::CONTROL)
    }

    /// Reads the timer register.
    pub fn timer(&self) -> u32 {
        self.0.read_word(radio::TIMER)
    }

    /// Gives access to the underlying port.
    pub fn port_mut(&mut self) -> &mut P {
        &mut self.0
    }
}

/// Streaming enable GPIO.
#[derive(Debug)]
pub struct StreamGpio<P>(P);

impl<P: RegisterPort> StreamGpio<P> {
    /// Wraps a port opened at [`STREAM_GPIO_ADDRESS`].
    pub fn new(port: P) -> StreamGpio<P> {
        StreamGpio(port)
    }

    /// Enables or disables sample streaming.
    ///
    /// The whole data register is written, so the other GPIO lines are
    /// cleared.
    pub fn set_streaming(&mut self, enable: bool) {
        let value = if enable { gpio::STREAMING_ENABLE } else { 0 };
        self.0.write_word(gpio::DATA, value);
    }

    /// Returns `true` if streaming is enabled.
    pub fn streaming(&self) -> bool {
        self.0.read_word(gpio::DATA) & gpio::STREAMING_ENABLE != 0
    }

    /// Gives access to the underlying port.
    pub fn port_mut(&mut self) -> &mut P {
        &mut self.0
    }
}

/// Complex sample produced by the radio.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default)]
pub struct IqSample {
    /// In-phase component.
    pub i: i16,
    /// Quadrature component.
    pub q: i16,
}

impl From<u32> for IqSample {
    /// Unpacks a FIFO word, which has I in bits 15:0 and Q in bits 31:16.
    fn from(word: u32) -> IqSample {
        IqSample {
            i: word as u16 as i16,
            q: (word >> 16) as u16 as i16,
        }
    }
}

impl IqSample {
    /// Serializes the sample as little-endian I followed by little-endian Q.
    pub fn to_le_bytes(self) -> [u8; 4] {
        let [i0, i1] = self.i.to_le_bytes();
        let [q0, q1] = self.q.to_le_bytes();
        [i0, i1, q0, q1]
    }
}

/// AXI-Stream receive FIFO.
#[derive(Debug)]
pub struct RxFifo<P>(P);

impl<P: RegisterPort> RxFifo<P> {
    /// Wraps a port opened at [`FIFO_ADDRESS`].
    pub fn new(port: P) -> RxFifo<P> {
        RxFifo(port)
    }

    /// Returns the number of words available in the FIFO.
    pub fn occupancy(&self) -> u32 {
        self.0.read_word(fifo::RDFO)
    }

    /// Pops a word from the FIFO.
    ///
    /// The FIFO must not be empty.
    pub fn read_data(&self) -> u32 {
        self.0.read_word(fifo::RDFD)
    }

    /// Waits until the FIFO is not empty and pops a word.
    ///
    /// This busy-waits on the occupancy register.
    pub fn read_word_blocking(&self) -> u32 {
        while self.occupancy() == 0 {
            std::hint::spin_loop();
        }
        self.read_data()
    }

    /// Waits until the FIFO is not empty and pops a sample.
    pub fn read_sample_blocking(&self) -> IqSample {
        IqSample::from(self.read_word_blocking())
    }

    /// Waits until the FIFO is not empty and pops a word, unless cancelled.
    ///
    /// While the FIFO is empty, `cancelled` is polled on each spin. `None` is
    /// returned as soon as it returns `true`.
    pub fn read_word_until(&self, mut cancelled: impl FnMut() -> bool) -> Option<u32> {
        while self.occupancy() == 0 {
            if cancelled() {
                return None;
            }
            std::hint::spin_loop();
        }
        Some(self.read_data())
    }

    /// Waits until the FIFO is not empty and pops a sample, unless cancelled.
    ///
    /// See [`RxFifo::read_word_until`].
    pub fn read_sample_until(&self, cancelled: impl FnMut() -> bool) -> Option<IqSample> {
        self.read_word_until(cancelled).map(IqSample::from)
    }

    /// Pops `words` words from the FIFO, discarding them.
    ///
    /// Returns the number of words read.
    pub fn drain(&self, words: usize) -> usize {
        let mut count = 0;
        while count < words {
            if self.occupancy() > 0 {
                let _ = self.read_data();
                count += 1;
            } else {
                std::hint::spin_loop();
            }
        }
        count
    }

    /// Gives access to the underlying port.
    pub fn port_mut(&mut self) -> &mut P {
        &mut self.0
    }
}
