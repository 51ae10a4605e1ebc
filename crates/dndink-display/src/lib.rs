//! # dndink-display
//!
//! Everything between a [`RenderRequest`] and ink on the panel:
//!
//! - [`frame`]: the two 1-bit planes (black, red) the panel consumes
//! - [`renderer`]: composes the FREE / BUSY layouts and the timestamp
//! - [`driver`]: the [`DisplayDriver`] seam and the PNG-writing simulator
//! - [`waveshare`]: the 7.5" tri-colour B V2 panel over `embedded-hal`
//! - [`throttler`]: rate-limits physical writes and owns the observed state
//!
//! [`RenderRequest`]: dndink_core::RenderRequest

#![deny(unsafe_code)]

pub mod driver;
pub mod errors;
pub mod frame;
pub mod renderer;
pub mod throttler;
pub mod waveshare;

pub use driver::{DisplayDriver, SimulatedDisplay, build_driver};
pub use errors::{RenderError, Result};
pub use frame::{DisplayStatus, Frame, HEIGHT, Plane, WIDTH};
pub use renderer::Renderer;
pub use throttler::{Decision, RenderThrottler, ThrottleState};
