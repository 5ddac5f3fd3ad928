//! Engine configuration.

use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_FRAMES_IN_FLIGHT, MAX_FRAMES_IN_FLIGHT};
use crate::error::{Error, Result};

/// Preference for how presentation paces against the display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PresentModePreference {
    /// Prefer the lowest-latency mode the surface offers, falling back to
    /// the always-available vsync mode.
    LowLatency,
    /// Always use the vsync mode.
    Vsync,
}

/// Engine configuration, supplied by the caller at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Window and application title.
    pub title: String,
    /// Initial window width.
    pub width: u32,
    /// Initial window height.
    pub height: u32,
    /// Enable Vulkan validation layers (default: debug builds only).
    pub validation: bool,
    /// Present mode preference.
    pub present_mode: PresentModePreference,
    /// Number of frames the CPU may work ahead of the GPU.
    pub frames_in_flight: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            title: "vulkandemo".to_string(),
            width: 800,
            height: 600,
            validation: cfg!(debug_assertions),
            present_mode: PresentModePreference::LowLatency,
            frames_in_flight: DEFAULT_FRAMES_IN_FLIGHT,
        }
    }
}

impl EngineConfig {
    /// Create a new config with the given title.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    /// Set the window dimensions.
    #[must_use]
    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Enable or disable validation layers.
    #[must_use]
    pub fn with_validation(mut self, validation: bool) -> Self {
        self.validation = validation;
        self
    }

    /// Set the present mode preference.
    #[must_use]
    pub fn with_present_mode(mut self, preference: PresentModePreference) -> Self {
        self.present_mode = preference;
        self
    }

    /// Set the number of frames in flight.
    #[must_use]
    pub fn with_frames_in_flight(mut self, count: usize) -> Self {
        self.frames_in_flight = count;
        self
    }

    /// Validate the config, clamping the frame-in-flight count into its
    /// supported range.
    pub fn normalized(mut self) -> Result<Self> {
        if self.width == 0 || self.height == 0 {
            return Err(Error::InvalidConfig(format!(
                "window size must be non-zero, got {}x{}",
                self.width, self.height
            )));
        }
        self.frames_in_flight = self.frames_in_flight.clamp(1, MAX_FRAMES_IN_FLIGHT);
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_in_flight_is_clamped() {
        let config = EngineConfig::new("test")
            .with_frames_in_flight(16)
            .normalized()
            .unwrap();
        assert_eq!(config.frames_in_flight, MAX_FRAMES_IN_FLIGHT);

        let config = EngineConfig::new("test")
            .with_frames_in_flight(0)
            .normalized()
            .unwrap();
        assert_eq!(config.frames_in_flight, 1);
    }

    #[test]
    fn zero_extent_is_rejected() {
        let result = EngineConfig::new("test").with_size(0, 600).normalized();
        assert!(result.is_err());
    }

    #[test]
    fn defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.frames_in_flight, DEFAULT_FRAMES_IN_FLIGHT);
        assert_eq!(config.present_mode, PresentModePreference::LowLatency);
    }
}
