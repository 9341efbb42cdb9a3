pub mod config;
pub mod device;
pub mod format;
pub mod input;
#[cfg(feature = "soapysdr")]
pub mod soapy;

use crossbeam::channel::Sender;
use num_complex::Complex32;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

/// Sample buffer: a block of canonical normalized IQ samples
pub struct SampleBuf {
    pub samples: Vec<Complex32>,
}

/// Stream parameters fixed at init time, read-only afterwards.
#[derive(Debug, Clone, Copy)]
pub struct RuntimeCapabilities {
    /// Maximum complex samples per stream read (device MTU)
    pub max_samples: usize,
    /// Raw bytes per complex sample in the negotiated format
    pub bytes_per_sample: usize,
    /// Raw magnitude corresponding to 100% of the input range
    pub full_scale: f32,
}

/// Common trait for all acquisition backends
pub trait SampleSource: Send {
    /// Open and configure the device. Populates capabilities on success;
    /// any failure here means this input cannot run.
    fn init(&mut self) -> Result<(), String>;

    /// Capabilities negotiated by init(). None before init.
    fn capabilities(&self) -> Option<RuntimeCapabilities>;

    /// Thread entry point: stream samples into the channel until the
    /// shutdown flag is observed, then tear the device down. The sender
    /// is dropped on return, which is the end-of-stream signal.
    fn run(&mut self, tx: Sender<SampleBuf>, shutdown: Arc<AtomicBool>);
}
