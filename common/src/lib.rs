pub mod config;
pub mod distance;
pub mod gpio;
pub mod pump;
pub mod sim;
pub mod types;

pub use config::{
    CameraConfig, ConfigError, HttpConfig, PinConfig, PumpConfig, SensorConfig, StationConfig,
};
pub use distance::{distance_cm, DistanceMeasurement, DistanceSensor};
pub use gpio::{GpioDriver, GpioError, Level, PinMode};
pub use pump::{PumpOutputs, PumpState, PumpStats};
pub use sim::{PinWrite, SimulatedGpio};
pub use types::{DistancePayload, PumpStatusPayload, StatsPayload};
