use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Which display backend to drive.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayDriverKind {
    /// Write PNG files instead of driving hardware.
    #[default]
    Simulated,
    /// Waveshare 7.5" tri-colour panel (B V2) over SPI.
    Waveshare,
}

impl DisplayDriverKind {
    /// Parse the `DNDINK_DISPLAY_DRIVER` value.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "simulated" | "simulation" | "sim" => Some(Self::Simulated),
            "waveshare" | "epd" => Some(Self::Waveshare),
            _ => None,
        }
    }
}

/// Panel and throttling settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DisplaySettings {
    /// Minimum seconds between physical redraws.
    pub min_refresh_secs: u64,
    /// Backend selection.
    pub driver: DisplayDriverKind,
    /// Directory for simulated output images.
    pub output_dir: PathBuf,
    /// Wiring for the Waveshare backend.
    pub waveshare: WaveshareSettings,
}

impl Default for DisplaySettings {
    fn default() -> Self {
        Self {
            min_refresh_secs: 10,
            driver: DisplayDriverKind::Simulated,
            output_dir: PathBuf::from("/tmp"),
            waveshare: WaveshareSettings::default(),
        }
    }
}

/// SPI and GPIO wiring of the e-Paper HAT (BCM numbering).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WaveshareSettings {
    /// spidev node.
    pub spi_device: PathBuf,
    /// GPIO character device.
    pub gpio_chip: PathBuf,
    /// Reset line.
    pub rst_pin: u32,
    /// Data/command line.
    pub dc_pin: u32,
    /// Busy line.
    pub busy_pin: u32,
    /// SPI clock in Hz.
    pub spi_speed_hz: u32,
}

impl Default for WaveshareSettings {
    fn default() -> Self {
        Self {
            spi_device: PathBuf::from("/dev/spidev0.0"),
            gpio_chip: PathBuf::from("/dev/gpiochip0"),
            rst_pin: 17,
            dc_pin: 25,
            busy_pin: 24,
            spi_speed_hz: 4_000_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn driver_kind_parse() {
        assert_eq!(DisplayDriverKind::parse("Simulated"), Some(DisplayDriverKind::Simulated));
        assert_eq!(DisplayDriverKind::parse(" waveshare "), Some(DisplayDriverKind::Waveshare));
        assert_eq!(DisplayDriverKind::parse("hdmi"), None);
    }

    #[test]
    fn driver_kind_serde_lowercase() {
        let kind: DisplayDriverKind = serde_json::from_str("\"waveshare\"").unwrap();
        assert_eq!(kind, DisplayDriverKind::Waveshare);
    }

    #[test]
    fn default_wiring_matches_hat() {
        let wiring = WaveshareSettings::default();
        assert_eq!(wiring.rst_pin, 17);
        assert_eq!(wiring.dc_pin, 25);
        assert_eq!(wiring.busy_pin, 24);
    }
}
