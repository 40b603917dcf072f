use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Low,
    High,
}

impl Level {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::High => "high",
        }
    }
}

impl std::ops::Not for Level {
    type Output = Self;

    fn not(self) -> Self {
        match self {
            Self::Low => Self::High,
            Self::High => Self::Low,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PinMode {
    Input,
    Output,
}

#[derive(Debug, Error)]
pub enum GpioError {
    #[error("gpio unavailable: {0}")]
    Unavailable(String),
    #[error("pin {pin}: {message}")]
    Pin { pin: u8, message: String },
    #[error("pin {0} has not been configured")]
    NotConfigured(u8),
    #[error("pin {0} is configured as input")]
    NotOutput(u8),
}

/// Digital pin access for the handful of pins the station uses.
///
/// Implementations are shared between the pump controller, the switch poller
/// and the distance sensor, so every method takes `&self` and the driver does
/// its own locking. `set_mode` must be called for a pin before it is read or
/// written.
pub trait GpioDriver: Send + Sync {
    fn set_mode(&self, pin: u8, mode: PinMode) -> Result<(), GpioError>;
    fn write(&self, pin: u8, level: Level) -> Result<(), GpioError>;
    fn read(&self, pin: u8) -> Result<Level, GpioError>;

    fn set_high(&self, pin: u8) -> Result<(), GpioError> {
        self.write(pin, Level::High)
    }

    fn set_low(&self, pin: u8) -> Result<(), GpioError> {
        self.write(pin, Level::Low)
    }
}
