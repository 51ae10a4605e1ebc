//! Display driver seam and the file-writing simulator.

use std::fs;
use std::path::{Path, PathBuf};

use dndink_settings::{DisplayDriverKind, DisplaySettings};
use image::{GrayImage, ImageFormat, Luma};
use tracing::{debug, info};

use crate::errors::{RenderError, Result};
use crate::frame::{Frame, HEIGHT, Plane, WIDTH};

/// Output file for the black plane in simulation mode.
pub const BLACK_FILE: &str = "epaper_black.png";
/// Output file for the red plane in simulation mode.
pub const RED_FILE: &str = "epaper_red.png";

/// A panel that can show a [`Frame`].
///
/// Calls block (SPI transfers, panel refresh, file writes) and are made from
/// the blocking thread pool, never concurrently.
pub trait DisplayDriver: Send + 'static {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Prepare the panel. Called once before the first write.
    fn initialize(&mut self) -> Result<()>;

    /// Show `frame`. Wakes the panel first if it was put to sleep.
    fn write_bitmap(&mut self, frame: &Frame) -> Result<()>;

    /// Enter low-power mode. Safe to call when already asleep.
    fn sleep(&mut self) -> Result<()>;
}

/// Build the driver selected in the settings.
pub fn build_driver(settings: &DisplaySettings) -> Result<Box<dyn DisplayDriver>> {
    match settings.driver {
        DisplayDriverKind::Simulated => Ok(Box::new(SimulatedDisplay::new(&settings.output_dir))),
        #[cfg(feature = "waveshare")]
        DisplayDriverKind::Waveshare => Ok(Box::new(crate::waveshare::open_linux(
            &settings.waveshare,
        )?)),
        #[cfg(not(feature = "waveshare"))]
        DisplayDriverKind::Waveshare => Err(RenderError::Hardware(
            "waveshare driver selected but dndink was built without the `waveshare` feature"
                .to_string(),
        )),
    }
}

/// Writes each plane as an 8-bit grayscale PNG (0 = ink, 255 = paper).
#[derive(Debug)]
pub struct SimulatedDisplay {
    output_dir: PathBuf,
    writes: u64,
}

impl SimulatedDisplay {
    /// Simulator writing into `output_dir`.
    pub fn new(output_dir: impl AsRef<Path>) -> Self {
        Self {
            output_dir: output_dir.as_ref().to_path_buf(),
            writes: 0,
        }
    }

    /// Number of frames written so far.
    pub fn writes(&self) -> u64 {
        self.writes
    }

    fn save_plane(&self, plane: &Plane, file_name: &str) -> Result<()> {
        let image = GrayImage::from_fn(WIDTH, HEIGHT, |x, y| {
            Luma([if plane.is_ink(x, y) { 0 } else { 255 }])
        });
        // Write then rename so a viewer never sees a half-written file.
        let target = self.output_dir.join(file_name);
        let partial = self.output_dir.join(format!(".{file_name}.partial"));
        image.save_with_format(&partial, ImageFormat::Png)?;
        fs::rename(&partial, &target)?;
        Ok(())
    }
}

impl DisplayDriver for SimulatedDisplay {
    fn name(&self) -> &'static str {
        "simulated"
    }

    fn initialize(&mut self) -> Result<()> {
        fs::create_dir_all(&self.output_dir)?;
        info!(output_dir = %self.output_dir.display(), "simulated display ready");
        Ok(())
    }

    fn write_bitmap(&mut self, frame: &Frame) -> Result<()> {
        self.save_plane(frame.black(), BLACK_FILE)?;
        self.save_plane(frame.red(), RED_FILE)?;
        self.writes += 1;
        info!(
            output_dir = %self.output_dir.display(),
            state = %frame.status().state,
            "simulation mode: saved epaper_*.png"
        );
        Ok(())
    }

    fn sleep(&mut self) -> Result<()> {
        debug!("simulated display sleeping");
        Ok(())
    }
}
