use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::Instant;

use crossbeam::channel::Receiver;
use iq_sdr::SampleBuf;

/// Consume sample blocks until the producer signals end of stream,
/// optionally recording them as interleaved little-endian CF32.
pub fn run(rx: Receiver<SampleBuf>, output: Option<&Path>, print_stats: bool) -> Result<(), String> {
    let mut writer = match output {
        Some(path) => {
            let file = File::create(path)
                .map_err(|e| format!("failed to create {}: {}", path.display(), e))?;
            Some(BufWriter::new(file))
        }
        None => None,
    };

    let mut total_samples: u64 = 0;
    let start = Instant::now();
    let mut last_stats = Instant::now();

    for buf in rx.iter() {
        total_samples += buf.samples.len() as u64;

        if let Some(ref mut w) = writer {
            for s in &buf.samples {
                w.write_all(&s.re.to_le_bytes())
                    .and_then(|_| w.write_all(&s.im.to_le_bytes()))
                    .map_err(|e| format!("write error: {}", e))?;
            }
        }

        if print_stats && last_stats.elapsed().as_secs() >= 5 {
            let elapsed = start.elapsed().as_secs_f64();
            eprintln!(
                "[{:.1}s] samples: {} ({:.2} MS/s)",
                elapsed,
                total_samples,
                total_samples as f64 / elapsed / 1e6
            );
            last_stats = Instant::now();
        }
    }

    if let Some(mut w) = writer {
        w.flush().map_err(|e| format!("flush error: {}", e))?;
    }

    if print_stats {
        let elapsed = start.elapsed().as_secs_f64();
        eprintln!("done ({:.1}s): {} samples", elapsed, total_samples);
    }

    Ok(())
}
