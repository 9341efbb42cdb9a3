/// Immutable configuration for one acquisition instance.
///
/// Built once by the caller (CLI, config file) and never modified for
/// the lifetime of the input.
#[derive(Debug, Clone)]
pub struct InputConfig {
    /// SoapySDR device arguments, e.g. "driver=rtlsdr"
    pub source: String,
    /// Sample rate in Hz
    pub sample_rate: f64,
    /// Center frequency in Hz
    pub center_freq: f64,
    /// Offset added to the center frequency before tuning, in Hz
    pub freq_offset: f64,
    /// Frequency correction in ppm
    pub correction: f64,
    /// Overall gain in dB; None enables automatic gain
    pub gain: Option<f64>,
    /// Per-element gains, "LNA=20,VGA=10"; takes precedence over `gain`
    pub gain_elements: Option<String>,
    /// Antenna name; None keeps the device default
    pub antenna: Option<String>,
    /// Driver-specific settings, "name1=value1,name2=value2"
    pub device_settings: Option<String>,
    /// Sample queue depth between producer and consumer, in blocks
    pub queue_depth: usize,
}

/// Parse a "name1=value1,name2=value2" list, keeping entry order.
/// Entries without '=' or with an empty name are skipped.
pub fn parse_kv_list(s: &str) -> Vec<(String, String)> {
    let mut out = Vec::new();
    for entry in s.split(',') {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }
        if let Some((name, value)) = entry.split_once('=') {
            if name.is_empty() {
                continue;
            }
            out.push((name.to_string(), value.to_string()));
        }
    }
    out
}
