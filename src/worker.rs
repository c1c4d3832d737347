//! Runs a pipeline on its own thread so the capture/display loop never waits on inference.

use std::sync::mpsc::{self, Receiver, SyncSender, TryRecvError, TrySendError};
use std::thread::{self, JoinHandle};
use tracing::{error, info};

use crate::error::EmotionError;
use crate::pipeline::{FrameAnalysis, Pipeline};
use crate::types::Frame;

#[derive(Debug)]
pub enum WorkerEvent {
    Frame(Box<FrameAnalysis>),
    /// This frame failed; the worker keeps going.
    Failed(String),
    /// The pipeline refused to continue; no more frames will be processed.
    Stopped(String),
}

/// What happened to a submitted frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submit {
    Accepted,
    /// The worker already has a frame waiting; this one was dropped.
    Busy,
    /// The worker thread has exited; no frame will ever be accepted again.
    Closed,
}

pub struct PipelineWorker {
    frames: Option<SyncSender<Frame>>,
    events: Receiver<WorkerEvent>,
    handle: Option<JoinHandle<()>>,
}

impl PipelineWorker {
    pub fn spawn<P>(mut pipeline: P) -> std::io::Result<Self>
    where
        P: Pipeline + Send + 'static,
    {
        // Capacity 1: while the worker is busy, new frames are dropped, not queued.
        let (tx_frame, rx_frame) = mpsc::sync_channel::<Frame>(1);
        let (tx_event, rx_event) = mpsc::channel::<WorkerEvent>();

        let handle = thread::Builder::new()
            .name("emotion-pipeline".to_string())
            .spawn(move || {
                info!(pipeline = %pipeline.name(), "pipeline worker started");
                while let Ok(frame) = rx_frame.recv() {
                    let event = match pipeline.process(&frame) {
                        Ok(analysis) => WorkerEvent::Frame(Box::new(analysis)),
                        Err(e) => match e.downcast_ref::<EmotionError>() {
                            Some(EmotionError::Unavailable(reason)) => {
                                let _ = tx_event.send(WorkerEvent::Stopped(reason.clone()));
                                break;
                            }
                            _ => {
                                let reason = format!("{e:#}");
                                error!(error = %reason, "frame processing failed");
                                WorkerEvent::Failed(reason)
                            }
                        },
                    };
                    if tx_event.send(event).is_err() {
                        break;
                    }
                }
                // Frame side closes first: once events end, submit reports Closed.
                drop(rx_frame);
                info!("pipeline worker stopped");
            })?;

        Ok(Self {
            frames: Some(tx_frame),
            events: rx_event,
            handle: Some(handle),
        })
    }

    /// Hand a frame to the worker without blocking. At most one frame waits while the worker is
    /// processing; anything beyond that is dropped.
    pub fn submit(&self, frame: Frame) -> Submit {
        let Some(tx) = &self.frames else { return Submit::Closed };
        match tx.try_send(frame) {
            Ok(()) => Submit::Accepted,
            Err(TrySendError::Full(_)) => Submit::Busy,
            Err(TrySendError::Disconnected(_)) => Submit::Closed,
        }
    }

    /// Next finished result, if any, without blocking.
    pub fn try_next(&self) -> Option<WorkerEvent> {
        match self.events.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Block until the next result; `None` once the worker has exited.
    pub fn recv(&self) -> Option<WorkerEvent> {
        self.events.recv().ok()
    }

    /// Stop accepting frames and wait for the thread to finish.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.frames.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for PipelineWorker {
    fn drop(&mut self) {
        self.stop();
    }
}
