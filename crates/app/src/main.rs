mod record;

use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "iqgrab")]
#[command(about = "SoapySDR IQ capture front end")]
struct Cli {
    /// SoapySDR device arguments, e.g. "driver=rtlsdr"
    #[arg(short = 'd', long, default_value = "")]
    soapy: String,

    /// Sample rate in Hz
    #[arg(short = 'r', long, default_value = "2000000")]
    sample_rate: f64,

    /// Center frequency in Hz
    #[arg(short = 'f', long)]
    freq: f64,

    /// Offset added to the center frequency before tuning, in Hz
    #[arg(long, default_value = "0")]
    freq_offset: f64,

    /// Frequency correction in ppm
    #[arg(long, default_value = "0")]
    correction: f64,

    /// Overall gain in dB (omit for auto gain)
    #[arg(short = 'g', long)]
    gain: Option<f64>,

    /// Per-element gains, e.g. "LNA=20,VGA=10" (overrides --gain)
    #[arg(long)]
    gain_elements: Option<String>,

    /// Antenna name
    #[arg(long)]
    antenna: Option<String>,

    /// Driver-specific settings, e.g. "biastee=true"
    #[arg(long)]
    device_settings: Option<String>,

    /// Sample queue depth between reader and writer, in blocks
    #[arg(long, default_value = "64")]
    queue_depth: usize,

    /// Output file for interleaved CF32 samples (omit to discard)
    #[arg(short = 'o', long)]
    output: Option<PathBuf>,

    /// Print throughput statistics
    #[arg(long)]
    stats: bool,
}

#[cfg(feature = "soapysdr")]
fn capture(cli: &Cli) -> Result<(), String> {
    use crossbeam::channel;
    use iq_sdr::config::InputConfig;
    use iq_sdr::input::SoapyInput;
    use iq_sdr::SampleSource;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    let cfg = InputConfig {
        source: cli.soapy.clone(),
        sample_rate: cli.sample_rate,
        center_freq: cli.freq,
        freq_offset: cli.freq_offset,
        correction: cli.correction,
        gain: cli.gain,
        gain_elements: cli.gain_elements.clone(),
        antenna: cli.antenna.clone(),
        device_settings: cli.device_settings.clone(),
        queue_depth: cli.queue_depth,
    };

    let mut input = SoapyInput::new(cfg);
    input.init()?;
    let caps = match input.capabilities() {
        Some(caps) => caps,
        None => return Err("input reported no capabilities".to_string()),
    };
    log::info!(
        "stream ready: {} samples/read, {} bytes/sample, full scale {:.3}",
        caps.max_samples,
        caps.bytes_per_sample,
        caps.full_scale
    );

    // One shutdown flag shared by the signal handler and every input
    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = shutdown.clone();
        ctrlc::set_handler(move || shutdown.store(true, Ordering::SeqCst))
            .map_err(|e| format!("failed to install signal handler: {}", e))?;
    }

    let (tx, rx) = channel::bounded(cli.queue_depth);
    let reader_shutdown = shutdown.clone();
    let reader = std::thread::spawn(move || {
        input.run(tx, reader_shutdown);
    });

    let result = record::run(rx, cli.output.as_deref(), cli.stats);
    if result.is_err() {
        // Writer died first; pull the producer down too.
        shutdown.store(true, Ordering::SeqCst);
    }
    let _ = reader.join();
    result
}

#[cfg(not(feature = "soapysdr"))]
fn capture(_cli: &Cli) -> Result<(), String> {
    Err("this build has no SoapySDR support, rebuild with --features soapysdr".to_string())
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    if let Err(e) = capture(&cli) {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}
