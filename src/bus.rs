//! Register-level access to the touch controller.
//!
//! [`Bus`] hands out an opened [`RegisterDevice`] bound to a bus address.
//! [`I2cBus`] implements both on top of any `embedded-hal` I2C peripheral.

use embedded_hal_1::i2c::{I2c, Operation};

/// An opened device that can read and write its registers.
pub trait RegisterDevice {
    type Error;

    /// Read `buf.len()` bytes starting at `reg`.
    fn read_register(&mut self, reg: u8, buf: &mut [u8]) -> Result<(), Self::Error>;

    /// Write `data` starting at `reg`.
    fn write_register(&mut self, reg: u8, data: &[u8]) -> Result<(), Self::Error>;
}

/// A bus from which register devices are opened by address.
pub trait Bus {
    type Error;
    type Device: RegisterDevice<Error = Self::Error>;

    fn open(&mut self, addr: u8) -> Result<Self::Device, Self::Error>;

    /// Give a device back to the bus it was opened from.
    fn close(&mut self, device: Self::Device);
}

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum I2cError<E> {
    /// The peripheral is already bound to an open device
    Claimed,
    I2c(E),
}

/// Owns an I2C peripheral and lends it to one device at a time.
pub struct I2cBus<I2C> {
    i2c: Option<I2C>,
}

impl<I2C> I2cBus<I2C> {
    pub fn new(i2c: I2C) -> Self {
        I2cBus { i2c: Some(i2c) }
    }

    /// Return the peripheral, or `None` while a device still holds it.
    pub fn free(self) -> Option<I2C> {
        self.i2c
    }
}

impl<I2C> Bus for I2cBus<I2C>
where
    I2C: I2c,
{
    type Error = I2cError<I2C::Error>;
    type Device = I2cDevice<I2C>;

    fn open(&mut self, addr: u8) -> Result<Self::Device, Self::Error> {
        let i2c = self.i2c.take().ok_or(I2cError::Claimed)?;
        Ok(I2cDevice { i2c, addr })
    }

    fn close(&mut self, device: Self::Device) {
        self.i2c = Some(device.i2c);
    }
}

pub struct I2cDevice<I2C> {
    i2c: I2C,
    addr: u8,
}

impl<I2C> I2cDevice<I2C> {
    pub fn addr(&self) -> u8 {
        self.addr
    }
}

impl<I2C> RegisterDevice for I2cDevice<I2C>
where
    I2C: I2c,
{
    type Error = I2cError<I2C::Error>;

    fn read_register(&mut self, reg: u8, buf: &mut [u8]) -> Result<(), Self::Error> {
        self.i2c
            .write_read(self.addr, &[reg], buf)
            .map_err(I2cError::I2c)
    }

    fn write_register(&mut self, reg: u8, data: &[u8]) -> Result<(), Self::Error> {
        // adjacent writes go out as one message, register address first
        self.i2c
            .transaction(self.addr, &mut [Operation::Write(&[reg]), Operation::Write(data)])
            .map_err(I2cError::I2c)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use embedded_hal_1::i2c::{ErrorKind, ErrorType};
    use std::vec::Vec;

    struct FakeI2c {
        mem: [u8; 256],
        writes: Vec<(u8, Vec<u8>)>,
        fail: bool,
    }

    impl Default for FakeI2c {
        fn default() -> Self {
            FakeI2c {
                mem: [0; 256],
                writes: Vec::new(),
                fail: false,
            }
        }
    }

    impl ErrorType for FakeI2c {
        type Error = ErrorKind;
    }

    impl I2c for FakeI2c {
        fn transaction(
            &mut self,
            address: u8,
            operations: &mut [Operation<'_>],
        ) -> Result<(), Self::Error> {
            if self.fail {
                return Err(ErrorKind::Other);
            }
            let mut written = Vec::new();
            for op in operations.iter_mut() {
                match op {
                    Operation::Write(data) => written.extend_from_slice(*data),
                    Operation::Read(buf) => {
                        let start = written[0] as usize;
                        buf.copy_from_slice(&self.mem[start..start + buf.len()]);
                    }
                }
            }
            self.writes.push((address, written));
            Ok(())
        }
    }

    #[test]
    fn open_claims_the_peripheral() {
        let mut bus = I2cBus::new(FakeI2c::default());
        let dev = bus.open(0x38).unwrap();
        assert_eq!(dev.addr(), 0x38);
        assert!(matches!(bus.open(0x38), Err(I2cError::Claimed)));

        bus.close(dev);
        assert!(bus.open(0x38).is_ok());
    }

    #[test]
    fn free_returns_peripheral_only_when_unclaimed() {
        let mut bus = I2cBus::new(FakeI2c::default());
        let dev = bus.open(0x38).unwrap();
        drop(dev);
        assert!(bus.free().is_none());

        let bus = I2cBus::new(FakeI2c::default());
        assert!(bus.free().is_some());
    }

    #[test]
    fn register_read_addresses_then_reads() {
        let mut i2c = FakeI2c::default();
        i2c.mem[0x03..0x07].copy_from_slice(&[0x01, 0x23, 0x04, 0x56]);
        let mut bus = I2cBus::new(i2c);
        let mut dev = bus.open(0x38).unwrap();

        let mut buf = [0u8; 4];
        dev.read_register(0x03, &mut buf).unwrap();
        assert_eq!(buf, [0x01, 0x23, 0x04, 0x56]);
        assert_eq!(dev.i2c.writes, [(0x38, std::vec![0x03])]);
    }

    #[test]
    fn register_write_prefixes_address() {
        let mut bus = I2cBus::new(FakeI2c::default());
        let mut dev = bus.open(0x38).unwrap();

        dev.write_register(0x80, &[0x80]).unwrap();
        assert_eq!(dev.i2c.writes, [(0x38, std::vec![0x80, 0x80])]);
    }

    #[test]
    fn i2c_failures_are_wrapped() {
        let i2c = FakeI2c {
            fail: true,
            ..Default::default()
        };
        let mut bus = I2cBus::new(i2c);
        let mut dev = bus.open(0x38).unwrap();

        let mut buf = [0u8];
        assert_eq!(
            dev.read_register(0x02, &mut buf),
            Err(I2cError::I2c(ErrorKind::Other))
        );
        assert_eq!(
            dev.write_register(0x80, &[0x80]),
            Err(I2cError::I2c(ErrorKind::Other))
        );
    }
}
