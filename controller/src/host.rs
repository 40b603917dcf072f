use std::{
    io::ErrorKind,
    net::SocketAddr,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use anyhow::Context;
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    routing::any,
    Json, Router,
};
use serde::Serialize;
use tokio::{net::TcpListener, task::JoinHandle, time::MissedTickBehavior};
use tower_http::services::ServeDir;
use tracing::{debug, info, warn};

use pump_station_common::{
    DistancePayload, DistanceSensor, GpioDriver, Level, PinConfig, PinMode, PumpOutputs,
    PumpStatusPayload, StationConfig, StatsPayload,
};

use crate::{capture::CameraCapture, pump::PumpController};

#[derive(Clone)]
struct AppState {
    pump: PumpController,
    sensor: Arc<DistanceSensor>,
    camera: CameraCapture,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config_path = std::env::var("PUMP_STATION_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("./pump-station.json"));
    let mut config = load_config(&config_path).await.unwrap_or_else(|err| {
        warn!("failed to load config from {}: {err:#}", config_path.display());
        StationConfig::default()
    });
    apply_env_overrides(
        &mut config,
        std::env::var("PUMP_STATION_HTTP_PORT").ok(),
        std::env::var("PUMP_STATION_WEB_ROOT").ok(),
    );
    config.sanitize();
    config.validate().context("invalid station config")?;

    let gpio = open_gpio()?;
    configure_pins(gpio.as_ref(), &config.pins)?;

    let outputs = PumpOutputs::new(gpio.clone(), &config.pins, config.pump.relay_active_low);
    let pump = PumpController::new(outputs, config.pump.run_time());
    pump.force_off_init();

    let sensor = Arc::new(DistanceSensor::new(
        gpio.clone(),
        config.pins.trigger,
        config.pins.echo,
        config.sensor.clone(),
    ));
    let initial = {
        let sensor = sensor.clone();
        tokio::task::spawn_blocking(move || sensor.measure())
            .await
            .context("startup distance measurement panicked")?
    };
    info!(
        distance_cm = initial.distance_cm,
        timed_out = initial.timed_out,
        "startup distance reading"
    );

    spawn_switch_poll_loop(
        gpio.clone(),
        config.pins.switch,
        pump.outputs().clone(),
        config.pump.switch_poll_interval(),
    );
    spawn_flush_loop(pump.clone(), config.pump.flush_interval());

    let app_state = AppState {
        pump,
        sensor,
        camera: CameraCapture::new(config.camera.clone()),
    };
    let app = build_router(app_state, &config.http.web_root);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.http.port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind pump station server at {addr}"))?;

    info!("pump station listening on http://{addr}");
    axum::serve(listener, app).await?;
    Ok(())
}

async fn load_config(path: &Path) -> anyhow::Result<StationConfig> {
    match tokio::fs::read(path).await {
        Ok(raw) => Ok(StationConfig::from_json(&raw)?),
        Err(err) if err.kind() == ErrorKind::NotFound => {
            info!("no config at {}, using defaults", path.display());
            Ok(StationConfig::default())
        }
        Err(err) => Err(err.into()),
    }
}

/// Applies `PUMP_STATION_HTTP_PORT` and `PUMP_STATION_WEB_ROOT`. A port that
/// does not parse is ignored.
fn apply_env_overrides(
    config: &mut StationConfig,
    port: Option<String>,
    web_root: Option<String>,
) {
    if let Some(raw) = port {
        match raw.trim().parse::<u16>() {
            Ok(port) => config.http.port = port,
            Err(err) => warn!("ignoring PUMP_STATION_HTTP_PORT={raw:?}: {err}"),
        }
    }
    if let Some(web_root) = web_root {
        config.http.web_root = PathBuf::from(web_root);
    }
}

#[cfg(feature = "rpi")]
fn open_gpio() -> anyhow::Result<Arc<dyn GpioDriver>> {
    let gpio = crate::rpi::RpiGpio::open().context("failed to open gpio")?;
    Ok(Arc::new(gpio))
}

#[cfg(not(feature = "rpi"))]
fn open_gpio() -> anyhow::Result<Arc<dyn GpioDriver>> {
    warn!("built without the rpi feature, pins are simulated");
    Ok(Arc::new(pump_station_common::SimulatedGpio::new()))
}

fn configure_pins(gpio: &dyn GpioDriver, pins: &PinConfig) -> anyhow::Result<()> {
    let modes = [
        (pins.pump, PinMode::Output),
        (pins.led_a, PinMode::Output),
        (pins.led_b, PinMode::Output),
        (pins.switch, PinMode::Input),
        (pins.trigger, PinMode::Output),
        (pins.echo, PinMode::Input),
    ];
    for (pin, mode) in modes {
        gpio.set_mode(pin, mode)
            .with_context(|| format!("failed to configure pin {pin} as {mode:?}"))?;
    }
    Ok(())
}

fn build_router(app_state: AppState, web_root: &Path) -> Router {
    Router::new()
        .route("/api/pump", any(handle_pump))
        .route("/api/distance", any(handle_distance))
        .route("/api/capture", any(handle_capture))
        .route("/api/stats", any(handle_stats))
        .fallback_service(ServeDir::new(web_root))
        .with_state(app_state)
}

/// Edge detector for the manual switch. The first sample only sets the
/// baseline.
#[derive(Debug, Default)]
struct SwitchEdge {
    last: Option<Level>,
}

impl SwitchEdge {
    fn observe(&mut self, level: Level) -> Option<Level> {
        let previous = self.last.replace(level);
        match previous {
            Some(previous) if previous != level => Some(level),
            _ => None,
        }
    }
}

fn spawn_switch_poll_loop(
    gpio: Arc<dyn GpioDriver>,
    pin: u8,
    outputs: PumpOutputs,
    period: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut edge = SwitchEdge::default();
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            interval.tick().await;

            let level = match gpio.read(pin) {
                Ok(level) => level,
                Err(err) => {
                    warn!("switch read failed: {err}");
                    continue;
                }
            };

            // Manual override: bypasses the timed activation entirely.
            match edge.observe(level) {
                Some(Level::High) => {
                    info!("switch flipped on");
                    outputs.pump_on();
                }
                Some(Level::Low) => {
                    info!("switch flipped off");
                    outputs.pump_off();
                }
                None => debug!("switch steady {}", level.as_str()),
            }
        }
    })
}

fn spawn_flush_loop(pump: PumpController, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let Some(start) = tokio::time::Instant::now().checked_add(period) else {
            warn!("flush interval {period:?} is out of range, periodic flush disabled");
            return;
        };
        let mut interval = tokio::time::interval_at(start, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            interval.tick().await;
            info!("periodic flush due");
            pump.activate().await;
        }
    })
}

async fn handle_pump(State(state): State<AppState>) -> impl IntoResponse {
    let pumping = state.pump.toggle().await;
    Json(PumpStatusPayload { pumping })
}

async fn handle_distance(State(state): State<AppState>) -> impl IntoResponse {
    let sensor = state.sensor.clone();
    match tokio::task::spawn_blocking(move || sensor.measure()).await {
        Ok(measurement) => Json(DistancePayload::from(measurement)).into_response(),
        Err(err) => {
            warn!("distance measurement task failed: {err}");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Distance measurement failed",
            )
        }
    }
}

async fn handle_stats(State(state): State<AppState>) -> impl IntoResponse {
    Json(StatsPayload::from(state.pump.stats().await))
}

async fn handle_capture(State(state): State<AppState>) -> impl IntoResponse {
    match state.camera.capture().await {
        Ok(image) => ([(header::CONTENT_TYPE, "image/jpeg")], image).into_response(),
        Err(err) => {
            warn!("image capture failed: {err}");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Image capture failed")
        }
    }
}

fn error_response(status: StatusCode, message: &str) -> axum::response::Response {
    (
        status,
        Json(ErrorBody {
            error: message.to_string(),
        }),
    )
        .into_response()
}
