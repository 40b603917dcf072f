use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::{
    config::PinConfig,
    gpio::{GpioDriver, Level},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PumpStats {
    pub last_activated: Option<DateTime<Utc>>,
    pub pump_count: u64,
}

/// Activation bookkeeping. The controller keeps this behind its lock and
/// only ever touches the hardware outside of it for the auto-off path.
#[derive(Debug, Clone, Default)]
pub struct PumpState {
    active: bool,
    pump_count: u64,
    last_activated: Option<DateTime<Utc>>,
}

impl PumpState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Starts an activation unless one is already in flight.
    pub fn try_begin(&mut self, now: DateTime<Utc>) -> bool {
        if self.active {
            return false;
        }
        self.active = true;
        self.last_activated = Some(now);
        self.pump_count += 1;
        true
    }

    pub fn finish(&mut self) {
        self.active = false;
    }

    pub fn stats(&self) -> PumpStats {
        PumpStats {
            last_activated: self.last_activated,
            pump_count: self.pump_count,
        }
    }
}

/// The relay plus the two status LEDs. LED A is lit while idle, LED B while
/// pumping.
#[derive(Clone)]
pub struct PumpOutputs {
    gpio: Arc<dyn GpioDriver>,
    pump_pin: u8,
    led_a_pin: u8,
    led_b_pin: u8,
    relay_active_low: bool,
}

impl PumpOutputs {
    pub fn new(gpio: Arc<dyn GpioDriver>, pins: &PinConfig, relay_active_low: bool) -> Self {
        Self {
            gpio,
            pump_pin: pins.pump,
            led_a_pin: pins.led_a,
            led_b_pin: pins.led_b,
            relay_active_low,
        }
    }

    pub fn pump_on(&self) {
        info!("pump on");
        self.drive(true);
    }

    pub fn pump_off(&self) {
        info!("pump off");
        self.drive(false);
    }

    fn relay_level(&self, on: bool) -> Level {
        let level = if on { Level::High } else { Level::Low };
        if self.relay_active_low {
            !level
        } else {
            level
        }
    }

    fn drive(&self, on: bool) {
        let writes = [
            (self.pump_pin, self.relay_level(on)),
            (self.led_a_pin, if on { Level::Low } else { Level::High }),
            (self.led_b_pin, if on { Level::High } else { Level::Low }),
        ];

        for (pin, level) in writes {
            if let Err(err) = self.gpio.write(pin, level) {
                warn!("failed to drive pin {pin} {}: {err}", level.as_str());
            }
        }
    }
}
