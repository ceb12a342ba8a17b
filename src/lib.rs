/*
Copyright (c) 2020 Todd Stellanova
LICENSE: BSD3 (see LICENSE file)
*/

#![cfg_attr(not(test), no_std)]

use embedded_hal as hal;
use hal::blocking::delay::DelayUs;
use hal::digital::v2::{InputPin, OutputPin};

#[cfg(feature = "rttdebug")]
use panic_rtt_core::rprintln;

mod interface;
pub use interface::{SensorInterface, SpiInterface};

/// Part number printed on the sensor module
pub const PART_NUMBER: &str = "MicroMag3 12349";
/// Sensor vendor
pub const VENDOR: &str = "PNI Corporation";

/// Errors in this crate
#[derive(Debug)]
pub enum Error<CommE, PinE> {
    /// Sensor communication error
    Comm(CommE),
    /// Pin setting error
    Pin(PinE),

    /// Sensor not responding
    Unresponsive,
}

pub struct Builder {}

impl Builder {
    /// Create a new driver using SPI interface.
    ///
    /// In addition to the SPI port and slave select, the MicroMag3 needs
    /// two dedicated GPIO lines: DRDY (input, rises when a conversion
    /// result is available) and RESET (output, rests low).
    pub fn new_spi<SPI, SSN, DRDY, RST, CommE, PinE>(
        spi: SPI,
        ssn: SSN,
        drdy: DRDY,
        reset: RST,
    ) -> MicroMag3<SpiInterface<SPI, SSN>, DRDY, RST>
    where
        SPI: hal::blocking::spi::Transfer<u8, Error = CommE>
            + hal::blocking::spi::Write<u8, Error = CommE>,
        SSN: OutputPin<Error = PinE>,
        DRDY: InputPin<Error = PinE>,
        RST: OutputPin<Error = PinE>,
        CommE: core::fmt::Debug,
        PinE: core::fmt::Debug,
    {
        let iface = interface::SpiInterface::new(spi, ssn);
        MicroMag3::new_with_interface(iface, drdy, reset)
    }
}

pub struct MicroMag3<SI, DRDY, RST> {
    pub(crate) si: SI,

    /// data ready line, driven high by the sensor when a result is available
    drdy: DRDY,
    /// reset line, rests low
    reset: RST,

    period: Period,
    mag_scale: f32,
    /// DRDY poll budget used by `update` (0 = poll until the internal guard)
    drdy_timeout: u16,

    /// most recent X/Y/Z readings, in microtesla
    readings: [f32; 3],
    valid: bool,
}

impl<SI, DRDY, RST, CommE, PinE> MicroMag3<SI, DRDY, RST>
where
    SI: SensorInterface<InterfaceError = Error<CommE, PinE>>,
    DRDY: InputPin<Error = PinE>,
    RST: OutputPin<Error = PinE>,
{
    pub(crate) fn new_with_interface(sensor_interface: SI, drdy: DRDY, reset: RST) -> Self {
        Self {
            si: sensor_interface,
            drdy,
            reset,
            period: Period::default(),
            mag_scale: Period::default().scale(),
            drdy_timeout: 0,
            readings: [0.0; 3],
            valid: false,
        }
    }

    /// Reset the sensor and verify it responds.
    ///
    /// Call once before the first `update`. DRDY rests low after a reset;
    /// a line stuck high means the sensor is absent or miswired.
    pub fn setup(&mut self, delay_source: &mut impl DelayUs<u16>) -> Result<(), SI::InterfaceError> {
        self.pulse_reset(delay_source)?;

        let mut drdy_clear = false;
        for _ in 0..10 {
            if self.drdy.is_low().map_err(Error::Pin)? {
                drdy_clear = true;
                break;
            }
            delay_source.delay_us(DRDY_POLL_INTERVAL_US);
        }
        if !drdy_clear {
            #[cfg(feature = "rttdebug")]
            rprintln!("drdy stuck high after reset");
            return Err(Error::Unresponsive);
        }

        Ok(())
    }

    /// Run one full measurement cycle over all three axes, in X, Y, Z order.
    ///
    /// Readings are stored per axis as each read succeeds; `is_valid`
    /// reports true only if the whole cycle succeeded. An axis whose read
    /// failed keeps its previously stored reading.
    pub fn update(&mut self, delay_source: &mut impl DelayUs<u16>) {
        let mut all_ok = true;
        for &axis in &[Axis::X, Axis::Y, Axis::Z] {
            if self.update_axis(axis, delay_source).is_err() {
                all_ok = false;
            }
        }
        self.valid = all_ok;
    }

    /// Read a single axis with the configured period and poll budget.
    ///
    /// Returns the freshly stored reading, or the last stored reading for
    /// the axis if the read failed.
    pub fn read_axis(&mut self, axis: Axis, delay_source: &mut impl DelayUs<u16>) -> f32 {
        self.update_axis(axis, delay_source)
            .unwrap_or(self.readings[axis.index()])
    }

    /// Request a conversion and retrieve the raw result.
    ///
    /// With `timeout == 0` the DRDY line is polled until it rises, bounded
    /// only by an internal guard against a dead sensor. With `timeout > 0`
    /// the line is polled at most `timeout` times; if it never rises, the
    /// datasheet's worst-case conversion delay for the period is waited out
    /// and the result is clocked out anyway. The datasheet allows skipping
    /// DRDY this way when I/O lines to the host are scarce.
    pub fn read(
        &mut self,
        axis: Axis,
        period: Period,
        timeout: u16,
        delay_source: &mut impl DelayUs<u16>,
    ) -> Result<i16, SI::InterfaceError> {
        self.convert(axis, period)?;

        if timeout == 0 {
            let mut ready = false;
            for _ in 0..MAX_DRDY_POLLS {
                if self.drdy.is_high().map_err(Error::Pin)? {
                    ready = true;
                    break;
                }
                delay_source.delay_us(DRDY_POLL_INTERVAL_US);
            }
            if !ready {
                #[cfg(feature = "rttdebug")]
                rprintln!("drdy never rose for cmd 0x{:x}", command_byte(axis, period));
                return Err(Error::Unresponsive);
            }
        } else {
            let mut ready = false;
            for _ in 0..timeout {
                if self.drdy.is_high().map_err(Error::Pin)? {
                    ready = true;
                    break;
                }
                delay_source.delay_us(DRDY_POLL_INTERVAL_US);
            }
            if !ready {
                // open-loop fallback: conversion is complete after the
                // worst-case delay even if we never saw DRDY rise
                #[cfg(feature = "rttdebug")]
                rprintln!(
                    "drdy timeout, open-loop wait {} us",
                    period.max_conversion_delay_us()
                );
                delay_source.delay_us(period.max_conversion_delay_us());
            }
        }

        self.get_result()
    }

    /// Toggle the reset line low-high-low.
    ///
    /// The line is left low afterward regardless of its prior state.
    /// Used at setup and for recovering a wedged sensor.
    pub fn pulse_reset(
        &mut self,
        delay_source: &mut impl DelayUs<u16>,
    ) -> Result<(), SI::InterfaceError> {
        self.reset.set_low().map_err(Error::Pin)?;
        delay_source.delay_us(RESET_PULSE_US);
        self.reset.set_high().map_err(Error::Pin)?;
        delay_source.delay_us(RESET_PULSE_US);
        self.reset.set_low().map_err(Error::Pin)?;
        Ok(())
    }

    /// Set the period select used by `update` and `read_axis`.
    /// Longer periods integrate longer: finer resolution, slower conversion.
    pub fn set_period(&mut self, period: Period) {
        self.period = period;
        self.mag_scale = period.scale();
    }

    /// Set the DRDY poll budget used by `update` and `read_axis`.
    /// 0 polls DRDY until it rises (recommended when the line is wired up).
    pub fn set_drdy_timeout(&mut self, timeout: u16) {
        self.drdy_timeout = timeout;
    }

    /// The most recent X axis field strength, in microtesla
    pub fn x(&self) -> f32 {
        self.readings[0]
    }

    /// The most recent Y axis field strength, in microtesla
    pub fn y(&self) -> f32 {
        self.readings[1]
    }

    /// The most recent Z axis field strength, in microtesla
    pub fn z(&self) -> f32 {
        self.readings[2]
    }

    /// True if every axis read of the most recent `update` cycle succeeded
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// Release owned resources
    pub fn release(self) -> (SI, DRDY, RST) {
        (self.si, self.drdy, self.reset)
    }

    /// Send the conversion command for one axis. Only issues the request;
    /// completion is signaled on DRDY.
    fn convert(&mut self, axis: Axis, period: Period) -> Result<(), SI::InterfaceError> {
        self.si.send_command(command_byte(axis, period))
    }

    /// Clock the 16-bit conversion result out of the sensor
    fn get_result(&mut self) -> Result<i16, SI::InterfaceError> {
        self.si.read_result()
    }

    fn update_axis(
        &mut self,
        axis: Axis,
        delay_source: &mut impl DelayUs<u16>,
    ) -> Result<f32, SI::InterfaceError> {
        let raw = self.read(axis, self.period, self.drdy_timeout, delay_source)?;
        let scaled = self.mag_scale * f32::from(raw);
        self.readings[axis.index()] = scaled;
        Ok(scaled)
    }
}

/// Protocol constants
///
/// Upper bound on DRDY polls when no poll budget is given
const MAX_DRDY_POLLS: u32 = 100_000;
/// Spacing between DRDY polls, in microseconds
const DRDY_POLL_INTERVAL_US: u16 = 10;
/// Hold time for each level of the reset pulse, in microseconds
const RESET_PULSE_US: u16 = 100;

/// Encode a conversion command: period select in bits 6:4,
/// axis select in bits 1:0.
fn command_byte(axis: Axis, period: Period) -> u8 {
    ((period as u8) << 4) | (axis as u8)
}

#[repr(u8)]
#[derive(Copy, Clone, Debug)]
/// Measurement axis, with the axis select bits of the command byte
pub enum Axis {
    X = 0b01,
    Y = 0b10,
    Z = 0b11,
}

impl Axis {
    /// Slot of this axis in the readings vector
    pub(crate) fn index(&self) -> usize {
        match self {
            Axis::X => 0,
            Axis::Y => 1,
            Axis::Z => 2,
        }
    }
}

#[repr(u8)]
#[allow(non_camel_case_types)]
#[derive(Copy, Clone, Debug)]
/// Period select: divider applied to the internal oscillator to set the
/// conversion integration time. Doubling the divider doubles both the
/// count magnitude per unit field and the conversion time.
pub enum Period {
    /// osc / 32
    Div_32 = 0b000,
    /// osc / 64
    Div_64 = 0b001,
    /// osc / 128
    Div_128 = 0b010,
    /// osc / 256
    Div_256 = 0b011,
    /// osc / 512
    Div_512 = 0b100,
    /// osc / 1024
    Div_1024 = 0b101,
    /// osc / 2048
    Div_2048 = 0b110,
    /// osc / 4096
    Div_4096 = 0b111,
}

impl Default for Period {
    fn default() -> Self {
        Period::Div_1024
    }
}

impl Period {
    const MICROTESLA_PER_GAUSS: f32 = 100.0;

    /// Field strength in microtesla per count at this period
    pub(crate) fn scale(&self) -> f32 {
        Self::MICROTESLA_PER_GAUSS * self.resolution()
    }

    /// Field resolution in gauss per count.
    /// Note that each period step doubles the counts per gauss.
    pub(crate) fn resolution(&self) -> f32 {
        match self {
            Period::Div_32 => 0.0192,
            Period::Div_64 => 0.0096,
            Period::Div_128 => 0.0048,
            Period::Div_256 => 0.0024,
            Period::Div_512 => 0.0012,
            Period::Div_1024 => 0.0006,
            Period::Div_2048 => 0.0003,
            Period::Div_4096 => 0.00015,
        }
    }

    /// Maximum delay from the end of the command until the rise of DRDY,
    /// in microseconds. The maximum occurs when the sampled sensor is in a
    /// zero field. Used as the open-loop wait when DRDY is not consulted.
    pub(crate) fn max_conversion_delay_us(&self) -> u16 {
        match self {
            Period::Div_32 => 500,
            Period::Div_64 => 1_000,
            Period::Div_128 => 2_000,
            Period::Div_256 => 4_000,
            Period::Div_512 => 7_500,
            Period::Div_1024 => 15_000,
            Period::Div_2048 => 30_000,
            Period::Div_4096 => 60_000,
        }
    }
}
