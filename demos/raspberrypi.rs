use std::thread;
use std::time::Duration;

use linux_embedded_hal::spidev::{self, SpidevOptions};
use linux_embedded_hal::sysfs_gpio::Direction;
use linux_embedded_hal::{Delay, Pin, Spidev};
use micromag3::{Builder, Period};

fn main() {
    let mut spi = Spidev::open("/dev/spidev0.0").expect("SPI device");
    let options = SpidevOptions::new()
        .bits_per_word(8)
        .max_speed_hz(1_000_000) // sensor SCLK limit
        .mode(spidev::SpiModeFlags::SPI_MODE_0)
        .build();
    spi.configure(&options).expect("SPI configuration");

    let ssn = Pin::new(8); // CE0 pin
    ssn.export().expect("ssn export");
    while !ssn.is_exported() {}
    ssn.set_direction(Direction::Out).expect("ssn direction");
    ssn.set_value(1).expect("ssn deselect");

    let drdy = Pin::new(24);
    drdy.export().expect("drdy export");
    while !drdy.is_exported() {}
    drdy.set_direction(Direction::In).expect("drdy direction");

    let reset = Pin::new(25);
    reset.export().expect("reset export");
    while !reset.is_exported() {}
    reset.set_direction(Direction::Out).expect("reset direction");
    reset.set_value(0).expect("reset rests low");

    //initialize the sensor through spi
    let mut mag = Builder::new_spi(spi, ssn, drdy, reset);

    //you need to implement an delay_source
    let mut delay_source = Delay {};

    mag.setup(&mut delay_source).expect("error setup");
    mag.set_period(Period::Div_2048);

    loop {
        mag.update(&mut delay_source);
        if mag.is_valid() {
            println!(
                "x: {:>8.2} y: {:>8.2} z: {:>8.2} uT",
                mag.x(),
                mag.y(),
                mag.z()
            );
        } else {
            println!("reading invalid");
        }
        thread::sleep(Duration::from_millis(250));
    }
}
