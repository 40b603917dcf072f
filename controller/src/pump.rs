use std::{sync::Arc, time::Duration};

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::info;

use pump_station_common::{PumpOutputs, PumpState, PumpStats};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activation {
    Started,
    AlreadyActive,
}

/// Shared handle over the pump. Cloning is cheap; every clone drives the same
/// state and outputs.
#[derive(Clone)]
pub struct PumpController {
    state: Arc<Mutex<PumpState>>,
    outputs: PumpOutputs,
    run_time: Duration,
}

impl PumpController {
    pub fn new(outputs: PumpOutputs, run_time: Duration) -> Self {
        Self {
            state: Arc::new(Mutex::new(PumpState::new())),
            outputs,
            run_time,
        }
    }

    pub fn outputs(&self) -> &PumpOutputs {
        &self.outputs
    }

    /// Puts the hardware in a known-off state. Called once before anything
    /// else touches the pump.
    pub fn force_off_init(&self) {
        self.outputs.pump_off();
    }

    /// Starts a timed pump cycle unless one is already running. The auto-off
    /// runs on its own task; this never waits for it.
    pub async fn activate(&self) -> Activation {
        {
            let mut state = self.state.lock().await;
            if !state.try_begin(Utc::now()) {
                return Activation::AlreadyActive;
            }
            info!(pump_count = state.stats().pump_count, "pump activation started");
            self.outputs.pump_on();
        }

        let controller = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(controller.run_time).await;
            controller.outputs.pump_off();
            controller.state.lock().await.finish();
            info!("pump activation finished");
        });

        Activation::Started
    }

    /// Requests an activation and reports whether one is in progress.
    pub async fn toggle(&self) -> bool {
        self.activate().await;
        self.is_active().await
    }

    pub async fn is_active(&self) -> bool {
        self.state.lock().await.is_active()
    }

    pub async fn stats(&self) -> PumpStats {
        self.state.lock().await.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use pump_station_common::{GpioDriver, Level, PinConfig, PinMode, SimulatedGpio};

    const RUN_TIME: Duration = Duration::from_secs(25);

    fn controller() -> (Arc<SimulatedGpio>, PumpController) {
        let pins = PinConfig::default();
        let gpio = Arc::new(SimulatedGpio::new());
        for pin in [pins.pump, pins.led_a, pins.led_b] {
            gpio.set_mode(pin, PinMode::Output).unwrap();
        }
        let outputs = PumpOutputs::new(gpio.clone(), &pins, true);
        let controller = PumpController::new(outputs, RUN_TIME);
        controller.force_off_init();
        gpio.clear_journal();
        (gpio, controller)
    }

    fn pump_writes(gpio: &SimulatedGpio) -> Vec<Level> {
        gpio.writes_to(PinConfig::default().pump)
    }

    #[tokio::test(start_paused = true)]
    async fn force_off_drives_relay_off() {
        let pins = PinConfig::default();
        let gpio = Arc::new(SimulatedGpio::new());
        for pin in [pins.pump, pins.led_a, pins.led_b] {
            gpio.set_mode(pin, PinMode::Output).unwrap();
        }
        let outputs = PumpOutputs::new(gpio.clone(), &pins, true);
        let controller = PumpController::new(outputs, RUN_TIME);

        controller.force_off_init();

        assert_eq!(gpio.level(pins.pump), Some(Level::High));
        assert_eq!(gpio.level(pins.led_a), Some(Level::High));
        assert_eq!(gpio.level(pins.led_b), Some(Level::Low));
        assert!(!controller.is_active().await);
    }

    #[tokio::test(start_paused = true)]
    async fn overlapping_activations_are_dropped() {
        let (gpio, controller) = controller();

        assert_eq!(controller.activate().await, Activation::Started);

        let mut handles = Vec::new();
        for _ in 0..16 {
            let controller = controller.clone();
            handles.push(tokio::spawn(async move { controller.activate().await }));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap(), Activation::AlreadyActive);
        }

        assert_eq!(controller.stats().await.pump_count, 1);
        assert_eq!(pump_writes(&gpio), vec![Level::Low]);

        tokio::time::sleep(RUN_TIME + Duration::from_secs(1)).await;

        assert_eq!(pump_writes(&gpio), vec![Level::Low, Level::High]);
        assert_eq!(controller.stats().await.pump_count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn auto_off_waits_for_full_run_time() {
        let (gpio, controller) = controller();

        controller.activate().await;

        tokio::time::sleep(RUN_TIME - Duration::from_secs(1)).await;
        assert!(controller.is_active().await);
        assert_eq!(pump_writes(&gpio), vec![Level::Low]);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(!controller.is_active().await);
        assert_eq!(pump_writes(&gpio), vec![Level::Low, Level::High]);
    }

    #[tokio::test(start_paused = true)]
    async fn sequential_activations_are_counted() {
        let (gpio, controller) = controller();

        for _ in 0..4 {
            assert_eq!(controller.activate().await, Activation::Started);
            tokio::time::sleep(RUN_TIME + Duration::from_millis(10)).await;
        }

        assert_eq!(controller.stats().await.pump_count, 4);
        let writes = pump_writes(&gpio);
        assert_eq!(writes.iter().filter(|level| **level == Level::High).count(), 4);
        assert_eq!(writes.iter().filter(|level| **level == Level::Low).count(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn toggle_is_idempotent_while_active() {
        let (_gpio, controller) = controller();

        for _ in 0..5 {
            assert!(controller.toggle().await);
        }

        assert_eq!(controller.stats().await.pump_count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stats_reflect_latest_activation() {
        let (_gpio, controller) = controller();
        let before = Utc::now();

        let initial = controller.stats().await;
        assert_eq!(initial.pump_count, 0);
        assert!(initial.last_activated.is_none());

        controller.activate().await;

        let stats = controller.stats().await;
        assert_eq!(stats.pump_count, 1);
        assert!(stats.last_activated.is_some_and(|ts| ts >= before));
    }
}
