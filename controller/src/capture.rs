use std::{process::Stdio, sync::Arc};

use thiserror::Error;
use tokio::{process::Command, sync::Mutex};
use tracing::info;

use pump_station_common::CameraConfig;

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("failed to run {command}: {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },
    #[error("{command} exited with {status}")]
    Failed {
        command: String,
        status: std::process::ExitStatus,
    },
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
}

/// Still-image capture through an external camera tool that writes a JPEG
/// to a fixed path.
#[derive(Clone)]
pub struct CameraCapture {
    config: Arc<CameraConfig>,
    // One output file, so one capture at a time.
    lock: Arc<Mutex<()>>,
}

impl CameraCapture {
    pub fn new(config: CameraConfig) -> Self {
        Self {
            config: Arc::new(config),
            lock: Arc::new(Mutex::new(())),
        }
    }

    pub async fn capture(&self) -> Result<Vec<u8>, CaptureError> {
        let _guard = self.lock.lock().await;
        info!("capturing image");

        let status = Command::new(&self.config.command)
            .args(&self.config.args)
            .arg("-o")
            .arg(&self.config.output_path)
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .await
            .map_err(|source| CaptureError::Spawn {
                command: self.config.command.clone(),
                source,
            })?;

        if !status.success() {
            return Err(CaptureError::Failed {
                command: self.config.command.clone(),
                status,
            });
        }

        tokio::fs::read(&self.config.output_path)
            .await
            .map_err(|source| CaptureError::Read {
                path: self.config.output_path.display().to_string(),
                source,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn camera(command: &str, args: &[&str], output_path: PathBuf) -> CameraCapture {
        CameraCapture::new(CameraConfig {
            command: command.to_string(),
            args: args.iter().map(|arg| arg.to_string()).collect(),
            output_path,
        })
    }

    #[tokio::test]
    async fn missing_binary_is_a_spawn_error() {
        let camera = camera(
            "definitely-not-a-camera-binary",
            &[],
            std::env::temp_dir().join("pump-station-missing.jpeg"),
        );

        assert!(matches!(
            camera.capture().await,
            Err(CaptureError::Spawn { .. })
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failing_command_is_reported() {
        let camera = camera(
            "false",
            &[],
            std::env::temp_dir().join("pump-station-false.jpeg"),
        );

        assert!(matches!(
            camera.capture().await,
            Err(CaptureError::Failed { .. })
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn reads_back_the_written_image() {
        let output = std::env::temp_dir().join(format!(
            "pump-station-capture-{}.jpeg",
            std::process::id()
        ));
        // sh -c '<script>' <name> -o <path>: the script sees -o as $1, path as $2.
        let camera = camera("sh", &["-c", "printf jpeg > \"$2\"", "capture"], output.clone());

        let bytes = camera.capture().await.unwrap();
        let _ = std::fs::remove_file(&output);

        assert_eq!(bytes, b"jpeg");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn missing_output_is_a_read_error() {
        let output = std::env::temp_dir().join(format!(
            "pump-station-never-written-{}.jpeg",
            std::process::id()
        ));
        let camera = camera("true", &[], output);

        assert!(matches!(
            camera.capture().await,
            Err(CaptureError::Read { .. })
        ));
    }
}
