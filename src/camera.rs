use anyhow::{anyhow, Context, Result};
use nokhwa::{
    pixel_format::RgbFormat,
    utils::{ApiBackend, CameraIndex, CameraInfo, RequestedFormat, RequestedFormatType},
    Camera,
};
use tracing::info;

use crate::error::EmotionError;
use crate::types::Frame;

pub struct CameraSource {
    camera: Camera,
}

impl CameraSource {
    /// Open camera `index`. Failure is reported as [`EmotionError::Camera`] so callers can keep
    /// the rest of the app running without video.
    pub fn new(index: usize) -> Result<Self> {
        let cam_index = CameraIndex::Index(index as u32);
        let requested = RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestFrameRate);
        let mut camera = Camera::new(cam_index, requested)
            .map_err(|e| EmotionError::Camera(format!("camera {index}: {e}")))?;
        camera
            .open_stream()
            .map_err(|e| EmotionError::Camera(format!("camera {index} stream: {e}")))?;

        info!(camera = %camera.info().human_name(), format = %camera.camera_format(), "opened camera");
        Ok(Self { camera })
    }

    pub fn capture(&mut self) -> Result<Frame> {
        let frame = self.camera.frame().map_err(|e| anyhow!(e)).context("Failed to get frame")?;
        let decoded = frame
            .decode_image::<RgbFormat>()
            .map_err(|e| anyhow!(e))
            .context("Failed to decode frame")?;
        Ok(decoded)
    }

    pub fn width(&self) -> u32 {
        self.camera.resolution().width()
    }

    pub fn height(&self) -> u32 {
        self.camera.resolution().height()
    }

    pub fn name(&self) -> String {
        self.camera.info().human_name()
    }
}

pub fn list_cameras() -> Result<Vec<CameraInfo>> {
    nokhwa::query(ApiBackend::Auto).map_err(|e| EmotionError::Camera(e.to_string()).into())
}
