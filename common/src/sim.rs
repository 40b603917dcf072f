use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard, PoisonError},
    time::{Duration, Instant},
};

use crate::gpio::{GpioDriver, GpioError, Level, PinMode};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PinWrite {
    pub pin: u8,
    pub level: Level,
}

/// HC-SR04 stand-in: after the trigger falls, echo goes high for `width`
/// once `delay` has passed.
#[derive(Debug, Clone, Copy)]
struct EchoModel {
    trigger: u8,
    echo: u8,
    delay: Duration,
    width: Duration,
    fired_at: Option<Instant>,
}

#[derive(Debug, Default)]
struct SimState {
    modes: HashMap<u8, PinMode>,
    levels: HashMap<u8, Level>,
    journal: Vec<PinWrite>,
    echo: Option<EchoModel>,
}

/// In-memory GPIO used on development hosts and in tests.
#[derive(Debug, Default)]
pub struct SimulatedGpio {
    state: Mutex<SimState>,
}

impl SimulatedGpio {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_echo(self, trigger: u8, echo: u8, delay: Duration, width: Duration) -> Self {
        self.lock().echo = Some(EchoModel {
            trigger,
            echo,
            delay,
            width,
            fired_at: None,
        });
        self
    }

    /// Drives an input pin from the outside, e.g. a test flipping the switch.
    pub fn set_input(&self, pin: u8, level: Level) {
        self.lock().levels.insert(pin, level);
    }

    pub fn level(&self, pin: u8) -> Option<Level> {
        self.lock().levels.get(&pin).copied()
    }

    pub fn writes(&self) -> Vec<PinWrite> {
        self.lock().journal.clone()
    }

    pub fn writes_to(&self, pin: u8) -> Vec<Level> {
        self.lock()
            .journal
            .iter()
            .filter(|write| write.pin == pin)
            .map(|write| write.level)
            .collect()
    }

    pub fn clear_journal(&self) {
        self.lock().journal.clear();
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl GpioDriver for SimulatedGpio {
    fn set_mode(&self, pin: u8, mode: PinMode) -> Result<(), GpioError> {
        let mut state = self.lock();
        state.modes.insert(pin, mode);
        state.levels.entry(pin).or_insert(Level::Low);
        Ok(())
    }

    fn write(&self, pin: u8, level: Level) -> Result<(), GpioError> {
        let mut state = self.lock();
        match state.modes.get(&pin) {
            None => return Err(GpioError::NotConfigured(pin)),
            Some(PinMode::Input) => return Err(GpioError::NotOutput(pin)),
            Some(PinMode::Output) => {}
        }

        let previous = state.levels.insert(pin, level);
        if let Some(model) = state.echo.as_mut() {
            if model.trigger == pin && previous == Some(Level::High) && level == Level::Low {
                model.fired_at = Some(Instant::now());
            }
        }
        state.journal.push(PinWrite { pin, level });
        Ok(())
    }

    fn read(&self, pin: u8) -> Result<Level, GpioError> {
        let state = self.lock();
        if !state.modes.contains_key(&pin) {
            return Err(GpioError::NotConfigured(pin));
        }

        if let Some(model) = state.echo {
            if model.echo == pin {
                let Some(fired_at) = model.fired_at else {
                    return Ok(Level::Low);
                };
                let elapsed = fired_at.elapsed();
                let high = elapsed >= model.delay && elapsed < model.delay + model.width;
                return Ok(if high { Level::High } else { Level::Low });
            }
        }

        Ok(state.levels.get(&pin).copied().unwrap_or(Level::Low))
    }
}
