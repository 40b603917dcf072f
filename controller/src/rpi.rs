use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard, PoisonError},
};

use rppal::gpio::{Gpio, IoPin, Mode};

use pump_station_common::{GpioDriver, GpioError, Level, PinMode};

struct ConfiguredPin {
    io: IoPin,
    mode: PinMode,
}

/// Raspberry Pi GPIO through /dev/gpiomem.
pub struct RpiGpio {
    gpio: Gpio,
    pins: Mutex<HashMap<u8, ConfiguredPin>>,
}

impl RpiGpio {
    pub fn open() -> Result<Self, GpioError> {
        let gpio = Gpio::new().map_err(|err| GpioError::Unavailable(err.to_string()))?;
        Ok(Self {
            gpio,
            pins: Mutex::new(HashMap::new()),
        })
    }

    fn pins(&self) -> MutexGuard<'_, HashMap<u8, ConfiguredPin>> {
        self.pins.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn rppal_mode(mode: PinMode) -> Mode {
    match mode {
        PinMode::Input => Mode::Input,
        PinMode::Output => Mode::Output,
    }
}

impl GpioDriver for RpiGpio {
    fn set_mode(&self, pin: u8, mode: PinMode) -> Result<(), GpioError> {
        let mut pins = self.pins();
        if let Some(configured) = pins.get_mut(&pin) {
            configured.io.set_mode(rppal_mode(mode));
            configured.mode = mode;
            return Ok(());
        }

        let io = self
            .gpio
            .get(pin)
            .map_err(|err| GpioError::Pin {
                pin,
                message: err.to_string(),
            })?
            .into_io(rppal_mode(mode));
        pins.insert(pin, ConfiguredPin { io, mode });
        Ok(())
    }

    fn write(&self, pin: u8, level: Level) -> Result<(), GpioError> {
        let mut pins = self.pins();
        let configured = pins.get_mut(&pin).ok_or(GpioError::NotConfigured(pin))?;
        if configured.mode != PinMode::Output {
            return Err(GpioError::NotOutput(pin));
        }
        configured.io.write(match level {
            Level::Low => rppal::gpio::Level::Low,
            Level::High => rppal::gpio::Level::High,
        });
        Ok(())
    }

    fn read(&self, pin: u8) -> Result<Level, GpioError> {
        let pins = self.pins();
        let configured = pins.get(&pin).ok_or(GpioError::NotConfigured(pin))?;
        Ok(match configured.io.read() {
            rppal::gpio::Level::Low => Level::Low,
            rppal::gpio::Level::High => Level::High,
        })
    }
}
