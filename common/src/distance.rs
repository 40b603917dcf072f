use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, PoisonError,
    },
    time::{Duration, Instant},
};

use tracing::{debug, warn};

use crate::{
    config::SensorConfig,
    gpio::{GpioDriver, Level},
};

const SPEED_OF_SOUND_CM_S: f64 = 34_300.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DistanceMeasurement {
    /// Only meaningful when `timed_out` is false.
    pub distance_cm: f64,
    pub timed_out: bool,
}

/// Converts an echo pulse width into centimetres (round trip halved) at the
/// default 343 m/s. `DistanceSensor` uses its configured speed instead.
pub fn distance_cm(echo: Duration) -> f64 {
    distance_cm_with(echo, SPEED_OF_SOUND_CM_S)
}

fn distance_cm_with(echo: Duration, speed_cm_s: f64) -> f64 {
    echo.as_secs_f64() * speed_cm_s / 2.0
}

/// Set once the measurement window has elapsed; never cleared.
struct TimeoutFlag {
    deadline: Instant,
    expired: AtomicBool,
}

impl TimeoutFlag {
    fn new(window: Duration) -> Self {
        Self {
            deadline: Instant::now() + window,
            expired: AtomicBool::new(false),
        }
    }

    fn check(&self) -> bool {
        if self.expired.load(Ordering::Acquire) {
            return true;
        }
        if Instant::now() >= self.deadline {
            self.expired.store(true, Ordering::Release);
            return true;
        }
        false
    }

    fn is_set(&self) -> bool {
        self.expired.load(Ordering::Acquire)
    }
}

/// HC-SR04 style ultrasonic ranger on a trigger/echo pin pair.
pub struct DistanceSensor {
    gpio: Arc<dyn GpioDriver>,
    trigger_pin: u8,
    echo_pin: u8,
    config: SensorConfig,
    busy: Mutex<()>,
}

impl DistanceSensor {
    pub fn new(
        gpio: Arc<dyn GpioDriver>,
        trigger_pin: u8,
        echo_pin: u8,
        config: SensorConfig,
    ) -> Self {
        Self {
            gpio,
            trigger_pin,
            echo_pin,
            config,
            busy: Mutex::new(()),
        }
    }

    /// Fires one pulse and times the echo, giving up after the configured
    /// window. Blocks the calling thread for at most roughly that window.
    ///
    /// A timed out result still carries whatever distance falls out of the
    /// captured timestamps; callers must discard it.
    pub fn measure(&self) -> DistanceMeasurement {
        let _guard = self.busy.lock().unwrap_or_else(PoisonError::into_inner);
        let timeout = TimeoutFlag::new(self.config.timeout());

        self.pulse_trigger();

        while !timeout.check() && self.echo_level() == Level::Low {
            std::hint::spin_loop();
        }
        let t0 = Instant::now();

        while !timeout.check() && self.echo_level() == Level::High {
            std::hint::spin_loop();
        }
        let t1 = Instant::now();

        let measurement = DistanceMeasurement {
            distance_cm: distance_cm_with(
                t1.saturating_duration_since(t0),
                self.config.speed_of_sound_cm_s,
            ),
            timed_out: timeout.is_set(),
        };
        debug!(
            distance_cm = measurement.distance_cm,
            timed_out = measurement.timed_out,
            "distance measured"
        );
        measurement
    }

    fn pulse_trigger(&self) {
        if let Err(err) = self.gpio.set_high(self.trigger_pin) {
            warn!("failed to raise trigger pin {}: {err}", self.trigger_pin);
        }
        spin_for(self.config.trigger_pulse());
        if let Err(err) = self.gpio.set_low(self.trigger_pin) {
            warn!("failed to lower trigger pin {}: {err}", self.trigger_pin);
        }
    }

    // A read failure counts as an idle line, so it ends in a timeout.
    fn echo_level(&self) -> Level {
        self.gpio.read(self.echo_pin).unwrap_or(Level::Low)
    }
}

// thread::sleep overshoots badly at microsecond scale.
fn spin_for(duration: Duration) {
    let start = Instant::now();
    while start.elapsed() < duration {
        std::hint::spin_loop();
    }
}
