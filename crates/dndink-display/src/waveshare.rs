//! Waveshare 7.5" tri-colour e-paper (B V2, 800×480) over `embedded-hal` 1.0.
//!
//! The controller takes two full-frame writes per refresh: "old data"
//! (`0x10`) carries the black plane with 1 = white, "new data" (`0x13`)
//! carries the red plane with 1 = red. BUSY is active low.
//!
//! [`Epd7in5bV2`] is generic over the HAL traits so the command sequence is
//! testable on the host. [`open_linux`] wires it to spidev and the GPIO
//! character device (feature `waveshare`).

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{InputPin, OutputPin};
use embedded_hal::spi::SpiDevice;
use tracing::{debug, info};

use crate::driver::DisplayDriver;
use crate::errors::{RenderError, Result};
use crate::frame::{Frame, HEIGHT, WIDTH};

mod command {
    pub const POWER_SETTING: u8 = 0x01;
    pub const PANEL_SETTING: u8 = 0x00;
    pub const POWER_OFF: u8 = 0x02;
    pub const POWER_ON: u8 = 0x04;
    pub const BOOSTER_SOFT_START: u8 = 0x06;
    pub const DEEP_SLEEP: u8 = 0x07;
    pub const DATA_START_OLD: u8 = 0x10;
    pub const DISPLAY_REFRESH: u8 = 0x12;
    pub const DATA_START_NEW: u8 = 0x13;
    pub const DUAL_SPI: u8 = 0x15;
    pub const VCOM_DATA_INTERVAL: u8 = 0x50;
    pub const TCON_SETTING: u8 = 0x60;
    pub const RESOLUTION: u8 = 0x61;
    pub const GATE_SOURCE_START: u8 = 0x65;
    pub const GET_STATUS: u8 = 0x71;
}

const DEEP_SLEEP_CHECK: u8 = 0xA5;
/// Largest single SPI write; spidev rejects transfers above its buffer size.
const SPI_CHUNK: usize = 4096;
const BUSY_POLL_MS: u32 = 10;
/// A full tri-colour refresh takes ~16 s; anything far beyond is a fault.
const DEFAULT_BUSY_TIMEOUT_MS: u32 = 60_000;

/// Driver for the 7.5" B V2 panel.
pub struct Epd7in5bV2<SPI, DC, RST, BUSY, DELAY> {
    spi: SPI,
    dc: DC,
    rst: RST,
    busy: BUSY,
    delay: DELAY,
    awake: bool,
    busy_timeout_ms: u32,
}

impl<SPI, DC, RST, BUSY, DELAY> Epd7in5bV2<SPI, DC, RST, BUSY, DELAY>
where
    SPI: SpiDevice,
    DC: OutputPin,
    RST: OutputPin,
    BUSY: InputPin,
    DELAY: DelayNs,
{
    /// Wrap already-configured bus and pins. The panel is not touched until
    /// [`DisplayDriver::initialize`].
    pub fn new(spi: SPI, dc: DC, rst: RST, busy: BUSY, delay: DELAY) -> Self {
        Self {
            spi,
            dc,
            rst,
            busy,
            delay,
            awake: false,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
        }
    }

    /// Override how long to wait for BUSY to release.
    #[must_use]
    pub fn with_busy_timeout_ms(mut self, timeout_ms: u32) -> Self {
        self.busy_timeout_ms = timeout_ms;
        self
    }

    fn reset(&mut self) -> Result<()> {
        self.rst.set_high().map_err(pin_error)?;
        self.delay.delay_ms(200);
        self.rst.set_low().map_err(pin_error)?;
        self.delay.delay_ms(4);
        self.rst.set_high().map_err(pin_error)?;
        self.delay.delay_ms(200);
        Ok(())
    }

    fn command(&mut self, command: u8) -> Result<()> {
        self.dc.set_low().map_err(pin_error)?;
        self.spi.write(&[command]).map_err(spi_error)
    }

    fn data(&mut self, bytes: &[u8]) -> Result<()> {
        self.dc.set_high().map_err(pin_error)?;
        for chunk in bytes.chunks(SPI_CHUNK) {
            self.spi.write(chunk).map_err(spi_error)?;
        }
        Ok(())
    }

    fn command_with_data(&mut self, command: u8, bytes: &[u8]) -> Result<()> {
        self.command(command)?;
        self.data(bytes)
    }

    fn wait_until_idle(&mut self) -> Result<()> {
        let mut waited_ms = 0;
        loop {
            self.command(command::GET_STATUS)?;
            if self.busy.is_high().map_err(pin_error)? {
                break;
            }
            if waited_ms >= self.busy_timeout_ms {
                return Err(RenderError::Hardware(format!(
                    "panel still busy after {waited_ms} ms"
                )));
            }
            self.delay.delay_ms(BUSY_POLL_MS);
            waited_ms += BUSY_POLL_MS;
        }
        self.delay.delay_ms(200);
        Ok(())
    }

    fn wake(&mut self) -> Result<()> {
        self.reset()?;
        self.command_with_data(command::POWER_SETTING, &[0x07, 0x07, 0x3F, 0x3F])?;
        self.command_with_data(command::BOOSTER_SOFT_START, &[0x17, 0x17, 0x28, 0x17])?;
        self.command(command::POWER_ON)?;
        self.delay.delay_ms(100);
        self.wait_until_idle()?;

        self.command_with_data(command::PANEL_SETTING, &[0x0F])?;
        let [w_hi, w_lo] = (WIDTH as u16).to_be_bytes();
        let [h_hi, h_lo] = (HEIGHT as u16).to_be_bytes();
        self.command_with_data(command::RESOLUTION, &[w_hi, w_lo, h_hi, h_lo])?;
        self.command_with_data(command::DUAL_SPI, &[0x00])?;
        self.command_with_data(command::VCOM_DATA_INTERVAL, &[0x11, 0x07])?;
        self.command_with_data(command::TCON_SETTING, &[0x22])?;
        self.command_with_data(command::GATE_SOURCE_START, &[0x00, 0x00, 0x00, 0x00])?;
        self.awake = true;
        Ok(())
    }
}

impl<SPI, DC, RST, BUSY, DELAY> DisplayDriver for Epd7in5bV2<SPI, DC, RST, BUSY, DELAY>
where
    SPI: SpiDevice + Send + 'static,
    DC: OutputPin + Send + 'static,
    RST: OutputPin + Send + 'static,
    BUSY: InputPin + Send + 'static,
    DELAY: DelayNs + Send + 'static,
{
    fn name(&self) -> &'static str {
        "waveshare-7in5b-v2"
    }

    fn initialize(&mut self) -> Result<()> {
        self.wake()?;
        info!("e-paper panel initialized");
        Ok(())
    }

    fn write_bitmap(&mut self, frame: &Frame) -> Result<()> {
        if !self.awake {
            debug!("waking panel");
            self.wake()?;
        }

        let black: Vec<u8> = frame.black().as_bytes().iter().map(|b| !b).collect();
        self.command_with_data(command::DATA_START_OLD, &black)?;
        self.command_with_data(command::DATA_START_NEW, frame.red().as_bytes())?;

        self.command(command::DISPLAY_REFRESH)?;
        self.delay.delay_ms(100);
        self.wait_until_idle()?;
        debug!(state = %frame.status().state, "panel refreshed");
        Ok(())
    }

    fn sleep(&mut self) -> Result<()> {
        if !self.awake {
            return Ok(());
        }
        self.command(command::POWER_OFF)?;
        self.wait_until_idle()?;
        self.command_with_data(command::DEEP_SLEEP, &[DEEP_SLEEP_CHECK])?;
        self.awake = false;
        debug!("panel in deep sleep");
        Ok(())
    }
}

fn spi_error<E: std::fmt::Debug>(e: E) -> RenderError {
    RenderError::Hardware(format!("spi: {e:?}"))
}

fn pin_error<E: std::fmt::Debug>(e: E) -> RenderError {
    RenderError::Hardware(format!("gpio: {e:?}"))
}

#[cfg(feature = "waveshare")]
pub use linux::{LinuxEpd, open_linux};

#[cfg(feature = "waveshare")]
mod linux {
    use dndink_settings::WaveshareSettings;
    use linux_embedded_hal::gpio_cdev::{Chip, LineRequestFlags};
    use linux_embedded_hal::spidev::{SpiModeFlags, SpidevOptions};
    use linux_embedded_hal::{CdevPin, Delay, SpidevDevice};
    use tracing::info;

    use super::Epd7in5bV2;
    use crate::errors::{RenderError, Result};

    /// The panel on a Raspberry Pi style spidev + gpiochip setup.
    pub type LinuxEpd = Epd7in5bV2<SpidevDevice, CdevPin, CdevPin, CdevPin, Delay>;

    /// Open the SPI device and claim the DC, RST and BUSY lines.
    pub fn open_linux(settings: &WaveshareSettings) -> Result<LinuxEpd> {
        let mut spi = SpidevDevice::open(&settings.spi_device).map_err(|e| {
            RenderError::Hardware(format!("opening {}: {e:?}", settings.spi_device.display()))
        })?;
        let options = SpidevOptions::new()
            .bits_per_word(8)
            .max_speed_hz(settings.spi_speed_hz)
            .mode(SpiModeFlags::SPI_MODE_0)
            .build();
        spi.configure(&options)
            .map_err(|e| RenderError::Hardware(format!("configuring SPI: {e}")))?;

        let mut chip = Chip::new(&settings.gpio_chip)
            .map_err(|e| RenderError::Hardware(format!("opening {}: {e}", settings.gpio_chip.display())))?;
        let dc = request_line(&mut chip, settings.dc_pin, LineRequestFlags::OUTPUT, "dndink-dc")?;
        let rst = request_line(&mut chip, settings.rst_pin, LineRequestFlags::OUTPUT, "dndink-rst")?;
        let busy = request_line(&mut chip, settings.busy_pin, LineRequestFlags::INPUT, "dndink-busy")?;

        info!(
            spi = %settings.spi_device.display(),
            gpio = %settings.gpio_chip.display(),
            "waveshare panel opened"
        );
        Ok(Epd7in5bV2::new(spi, dc, rst, busy, Delay))
    }

    fn request_line(
        chip: &mut Chip,
        offset: u32,
        flags: LineRequestFlags,
        consumer: &str,
    ) -> Result<CdevPin> {
        let handle = chip
            .get_line(offset)
            .and_then(|line| line.request(flags, 0, consumer))
            .map_err(|e| RenderError::Hardware(format!("requesting GPIO {offset} ({consumer}): {e}")))?;
        CdevPin::new(handle)
            .map_err(|e| RenderError::Hardware(format!("GPIO {offset} ({consumer}): {e:?}")))
    }
}
