pub mod spi;

pub use self::spi::SpiInterface;

/// A method of communicating with the sensor.
///
/// The MicroMag3 speaks a simple command/response protocol: the host sends
/// a single command byte to start a conversion, waits for DRDY, then clocks
/// out a 16-bit two's-complement result, most significant byte first.
/// The slave select line must be held low for the whole of each exchange.
pub trait SensorInterface {
    /// Interface error type
    type InterfaceError;

    /// Send a single command byte to the sensor
    fn send_command(&mut self, cmd: u8) -> Result<(), Self::InterfaceError>;

    /// Clock the 16-bit conversion result out of the sensor
    fn read_result(&mut self) -> Result<i16, Self::InterfaceError>;
}
