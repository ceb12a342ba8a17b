use embedded_hal as hal;
use hal::digital::v2::OutputPin;

use super::SensorInterface;
use crate::Error;
#[cfg(feature = "rttdebug")]
use panic_rtt_core::rprintln;

/// This combines the SPI peripheral and
/// associated control pins such as:
/// - SSN : active-low Slave Select (aka SSNOT)
///
/// The sensor runs as an SPI mode 0 slave with SCLK at 1 MHz or less.
pub struct SpiInterface<SPI, SSN> {
    /// the SPI port to use when communicating
    spi: SPI,
    /// the Slave Select pin (GPIO output) to use when communicating
    ssn: SSN,
}

impl<SPI, SSN, CommE, PinE> SpiInterface<SPI, SSN>
where
    SPI: hal::blocking::spi::Transfer<u8, Error = CommE>
        + hal::blocking::spi::Write<u8, Error = CommE>,
    SSN: OutputPin<Error = PinE>,
{
    pub fn new(spi: SPI, ssn: SSN) -> Self {
        let mut inst = Self { spi, ssn };
        //ensure that the device is initially deselected
        let _ = inst.ssn.set_high();
        inst
    }

    /// Release owned resources
    pub fn release(self) -> (SPI, SSN) {
        (self.spi, self.ssn)
    }
}

impl<SPI, SSN, CommE, PinE> SensorInterface for SpiInterface<SPI, SSN>
where
    SPI: hal::blocking::spi::Transfer<u8, Error = CommE>
        + hal::blocking::spi::Write<u8, Error = CommE>,
    SSN: OutputPin<Error = PinE>,
{
    type InterfaceError = Error<CommE, PinE>;

    fn send_command(&mut self, cmd: u8) -> Result<(), Self::InterfaceError> {
        #[cfg(feature = "rttdebug")]
        rprintln!("cmd 0x{:x} ", cmd);

        self.ssn.set_low().map_err(Error::Pin)?;
        let rc = self.spi.write(&[cmd]);
        self.ssn.set_high().map_err(Error::Pin)?;
        rc.map_err(Error::Comm)?;

        Ok(())
    }

    fn read_result(&mut self) -> Result<i16, Self::InterfaceError> {
        let mut block: [u8; 2] = [0; 2];
        self.ssn.set_low().map_err(Error::Pin)?;
        let rc = self.spi.transfer(&mut block);
        self.ssn.set_high().map_err(Error::Pin)?;
        rc.map_err(Error::Comm)?;

        Ok(((block[0] as i16) << 8) | (block[1] as i16))
    }
}
