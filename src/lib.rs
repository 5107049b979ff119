//! Polling driver for the FT62xx and FT5x06 capacitive touch controllers.
//!
//! The driver reads the touch count, the first touch point and the gesture
//! register. A touch that stays down is only reported on the poll where it
//! first appears, see [`TouchScreen::read_touch_count`].
//!
//! Failed reads come back as [`Error`]. Each read also has a documented
//! placeholder value ([`Placeholder`]) for callers that want the raw
//! fallback, e.g. `ts.read_touch_point().or_placeholder()`.

#![cfg_attr(not(test), no_std)]

#[macro_use]
mod fmt;

pub mod bus;

pub use bus::{Bus, I2cBus, I2cDevice, I2cError, RegisterDevice};

use embedded_hal_1::{delay::DelayNs, digital::OutputPin};

pub const DEFAULT_ADDR: u8 = 0x38;

/// 50% sensitivity
pub const THRESHOLD_DEFAULT: u8 = 0x80;

/// Most simultaneous touches the controllers report. Higher counts are noise.
pub const MAX_TOUCHES: u8 = 2;

pub mod regs {
    pub const CHIPID: u8 = 0xA3;
    pub const VENDID: u8 = 0xA8;
    pub const FIRMVERS: u8 = 0xA6;
    pub const THRESHOLD: u8 = 0x80;
    pub const NUMTOUCHES: u8 = 0x02;
    pub const TOUCH_VAL: u8 = 0x03;
    pub const GEST_ID: u8 = 0x01;
}

/// Register addresses for one chip family.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RegisterMap {
    pub vendor_id: u8,
    pub ctpm_vendor_id: u8,
    pub firmware_version: u8,
    pub touch_count: u8,
    /// First of four bytes: x high, x low, y high, y low
    pub touch_value: u8,
    pub threshold: u8,
    pub gesture: u8,
}

pub const FT62XX_REGS: RegisterMap = RegisterMap {
    vendor_id: regs::CHIPID,
    ctpm_vendor_id: regs::VENDID,
    firmware_version: regs::FIRMVERS,
    touch_count: regs::NUMTOUCHES,
    touch_value: regs::TOUCH_VAL,
    threshold: regs::THRESHOLD,
    gesture: regs::GEST_ID,
};

pub const FT5X06_REGS: RegisterMap = RegisterMap {
    vendor_id: regs::CHIPID,
    ctpm_vendor_id: regs::VENDID,
    firmware_version: regs::FIRMVERS,
    touch_count: regs::NUMTOUCHES,
    touch_value: regs::TOUCH_VAL,
    threshold: regs::THRESHOLD,
    gesture: regs::GEST_ID,
};

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum ChipVariant {
    Ft62xx = 1,
    Ft5x06 = 2,
}

impl ChipVariant {
    pub fn registers(self) -> &'static RegisterMap {
        match self {
            ChipVariant::Ft62xx => &FT62XX_REGS,
            ChipVariant::Ft5x06 => &FT5X06_REGS,
        }
    }
}

/// A chip variant id that names neither supported family.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct UnrecognizedVariant(pub u8);

impl TryFrom<u8> for ChipVariant {
    type Error = UnrecognizedVariant;

    fn try_from(id: u8) -> Result<Self, Self::Error> {
        match id {
            1 => Ok(ChipVariant::Ft62xx),
            2 => Ok(ChipVariant::Ft5x06),
            _ => Err(UnrecognizedVariant(id)),
        }
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum GestureCode {
    MoveUp = 0x10,
    MoveLeft = 0x14,
    MoveDown = 0x18,
    MoveRight = 0x1C,
    ZoomIn = 0x48,
    ZoomOut = 0x49,
    NoGesture = 0x00,
    /// Placeholder when the gesture register could not be read or decoded
    Unknown = 0xFF,
}

impl GestureCode {
    pub fn raw(&self) -> u8 {
        *self as u8
    }
}

impl TryFrom<u8> for GestureCode {
    /// The byte that did not decode
    type Error = u8;

    fn try_from(gesture: u8) -> Result<Self, Self::Error> {
        match gesture {
            0x10 => Ok(GestureCode::MoveUp),
            0x14 => Ok(GestureCode::MoveLeft),
            0x18 => Ok(GestureCode::MoveDown),
            0x1C => Ok(GestureCode::MoveRight),
            0x48 => Ok(GestureCode::ZoomIn),
            0x49 => Ok(GestureCode::ZoomOut),
            0x00 => Ok(GestureCode::NoGesture),
            other => Err(other),
        }
    }
}

/// Position of the first touch, 12 bits per axis.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TouchPoint {
    pub x: u16,
    pub y: u16,
}

impl TouchPoint {
    /// Decode `[x high, x low, y high, y low]`.
    ///
    /// The upper nibble of each high byte holds event and id bits and is dropped.
    pub fn from_registers(buf: [u8; 4]) -> Self {
        let x = (((buf[0] as u16) & 0x0F) << 8) | (buf[1] as u16);
        let y = (((buf[2] as u16) & 0x0F) << 8) | (buf[3] as u16);
        TouchPoint { x, y }
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error<E> {
    AlreadyInitialized,
    NotInitialized,
    /// No chip variant is bound to the driver
    UnrecognizedVariant,
    ThresholdWriteFailed,
    RegisterReadFailed,
    UnrecognizedGestureByte(u8),
    /// Error from the bus while opening the device or reading the gesture
    Bus(E),
}

impl<E: core::fmt::Debug> core::fmt::Display for Error<E> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Error::AlreadyInitialized => f.write_str("touchscreen already initialized"),
            Error::NotInitialized => f.write_str("touchscreen not initialized"),
            Error::UnrecognizedVariant => f.write_str("chip variant not set or unrecognized"),
            Error::ThresholdWriteFailed => f.write_str("failed to set the touch threshold"),
            Error::RegisterReadFailed => f.write_str("failed to read register"),
            Error::UnrecognizedGestureByte(b) => write!(f, "unknown gesture byte 0x{:02x}", b),
            Error::Bus(e) => write!(f, "bus error: {:?}", e),
        }
    }
}

/// Value a read stands for when it fails. Never a real reading.
pub trait Placeholder {
    const PLACEHOLDER: Self;
}

/// Touch counts and id bytes fall back to zero.
impl Placeholder for u8 {
    const PLACEHOLDER: Self = 0;
}

impl Placeholder for TouchPoint {
    const PLACEHOLDER: Self = TouchPoint { x: 0, y: 0 };
}

impl Placeholder for GestureCode {
    const PLACEHOLDER: Self = GestureCode::Unknown;
}

pub trait ReadingExt<T> {
    /// The reading, or its placeholder if the read failed.
    fn or_placeholder(self) -> T;
}

impl<T: Placeholder, E> ReadingExt<T> for Result<T, Error<E>> {
    fn or_placeholder(self) -> T {
        self.unwrap_or(T::PLACEHOLDER)
    }
}

/// Touch controller driver.
///
/// Not meant to be shared: callers polling from several contexts must
/// serialize access themselves.
pub struct TouchScreen<B: Bus> {
    bus: B,
    device: Option<B::Device>,
    addr: u8,
    variant: Option<ChipVariant>,
    touched: bool,
    debug: bool,
}

impl<B> TouchScreen<B>
where
    B: Bus,
{
    pub fn new(bus: B) -> Self {
        Self::new_with_addr(bus, DEFAULT_ADDR)
    }

    pub fn new_with_addr(bus: B, addr: u8) -> Self {
        TouchScreen {
            bus,
            device: None,
            addr,
            variant: None,
            touched: false,
            debug: false,
        }
    }

    /// Open the device, bind the chip variant and write the default threshold.
    ///
    /// A failed threshold write closes the device again and leaves the driver
    /// uninitialized.
    pub fn initialize(&mut self, variant: ChipVariant) -> Result<(), Error<B::Error>> {
        if self.device.is_some() {
            return Err(Error::AlreadyInitialized);
        }

        let device = self.bus.open(self.addr).map_err(Error::Bus)?;
        self.device = Some(device);
        self.variant = Some(variant);
        self.touched = false;
        self.debug = false;

        if let Err(e) = self.set_threshold() {
            error!("threshold write failed, closing device");
            if let Some(device) = self.device.take() {
                self.bus.close(device);
            }
            self.variant = None;
            return Err(e);
        }

        info!("touchscreen {} ready at 0x{:02x}", variant as u8, self.addr);
        Ok(())
    }

    pub fn set_threshold(&mut self) -> Result<(), Error<B::Error>> {
        let regs = self.registers()?;
        self.device()?
            .write_register(regs.threshold, &[THRESHOLD_DEFAULT])
            .map_err(|_| Error::ThresholdWriteFailed)
    }

    pub fn read_vendor_id(&mut self) -> Result<u8, Error<B::Error>> {
        let regs = self.registers()?;
        self.read_reg(regs.vendor_id)
    }

    pub fn read_ctpm_vendor_id(&mut self) -> Result<u8, Error<B::Error>> {
        let regs = self.registers()?;
        self.read_reg(regs.ctpm_vendor_id)
    }

    pub fn read_firmware_version(&mut self) -> Result<u8, Error<B::Error>> {
        let regs = self.registers()?;
        self.read_reg(regs.firmware_version)
    }

    /// Number of touches, 0, 1 or 2, reported once per touch.
    ///
    /// The count is returned on the poll where a touch first shows up. While
    /// the finger stays down every later poll returns 0, and the poll that
    /// sees it lift returns 0 and rearms the driver for the next touch.
    pub fn read_touch_count(&mut self) -> Result<u8, Error<B::Error>> {
        if self.device.is_none() {
            return Err(Error::NotInitialized);
        }
        let regs = self.registers()?;

        let raw = self.read_reg(regs.touch_count)?;
        let count = if raw > MAX_TOUCHES {
            trace!("ignoring touch count {}", raw);
            0
        } else {
            raw
        };

        Ok(self.latch(count))
    }

    fn latch(&mut self, count: u8) -> u8 {
        match (self.touched, count) {
            (false, 0) => 0,
            (false, n) => {
                self.touched = true;
                n
            }
            (true, 0) => {
                self.touched = false;
                0
            }
            // already reported
            (true, _) => 0,
        }
    }

    /// Get the gesture, this is not always available for all touch panels
    pub fn read_gesture(&mut self) -> Result<GestureCode, Error<B::Error>> {
        let regs = self.registers()?;
        let mut buf = [0u8];
        self.device()?
            .read_register(regs.gesture, &mut buf)
            .map_err(Error::Bus)?;

        GestureCode::try_from(buf[0]).map_err(|raw| {
            warn!("unknown gesture byte 0x{:02x}", raw);
            Error::UnrecognizedGestureByte(raw)
        })
    }

    /// Get the first touch point. A second touch is never decoded.
    pub fn read_touch_point(&mut self) -> Result<TouchPoint, Error<B::Error>> {
        let regs = self.registers()?;
        let mut buf = [0u8; 4];
        self.device()?
            .read_register(regs.touch_value, &mut buf)
            .map_err(|_| Error::RegisterReadFailed)?;

        let point = TouchPoint::from_registers(buf);
        if self.debug {
            info!("touch received: {}, {}", point.x, point.y);
        }

        Ok(point)
    }

    pub fn reset<P: OutputPin, D: DelayNs>(
        &mut self,
        rst: &mut P,
        delay: &mut D,
    ) -> Result<(), P::Error> {
        rst.set_high()?;
        delay.delay_us(100);
        rst.set_low()?;
        delay.delay_us(100);
        rst.set_high()?;
        delay.delay_us(100);

        Ok(())
    }

    pub fn set_debug(&mut self, enabled: bool) {
        self.debug = enabled;
    }

    pub fn debug(&self) -> bool {
        self.debug
    }

    /// Whether a touch is down and has already been reported.
    pub fn is_touched(&self) -> bool {
        self.touched
    }

    pub fn is_initialized(&self) -> bool {
        self.device.is_some()
    }

    pub fn variant(&self) -> Option<ChipVariant> {
        self.variant
    }

    /// Close the device, if open, and give back the bus.
    pub fn release(mut self) -> B {
        if let Some(device) = self.device.take() {
            self.bus.close(device);
        }
        self.bus
    }

    fn registers(&self) -> Result<&'static RegisterMap, Error<B::Error>> {
        self.variant
            .map(ChipVariant::registers)
            .ok_or(Error::UnrecognizedVariant)
    }

    fn device(&mut self) -> Result<&mut B::Device, Error<B::Error>> {
        self.device.as_mut().ok_or(Error::NotInitialized)
    }

    fn read_reg(&mut self, reg_addr: u8) -> Result<u8, Error<B::Error>> {
        let mut buf = [0u8];
        self.device()?
            .read_register(reg_addr, &mut buf)
            .map_err(|_| Error::RegisterReadFailed)?;

        Ok(buf[0])
    }
}
