use num_complex::Complex32;

/// Semantic raw sample encodings the conversion stage understands.
///
/// Tag names follow the SoapySDR format strings: complex pairs of
/// unsigned int8, signed int8, signed int16 and float32.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleFormat {
    Cu8,
    Cs8,
    Cs16,
    Cf32,
}

impl SampleFormat {
    /// Map a SoapySDR format string to a semantic tag.
    pub fn from_soapy(fmt: &str) -> Option<SampleFormat> {
        match fmt {
            "CU8" => Some(SampleFormat::Cu8),
            "CS8" => Some(SampleFormat::Cs8),
            "CS16" => Some(SampleFormat::Cs16),
            "CF32" => Some(SampleFormat::Cf32),
            _ => None,
        }
    }

    /// Canonical raw bytes per complex sample for this tag.
    pub fn bytes_per_sample(self) -> usize {
        match self {
            SampleFormat::Cu8 | SampleFormat::Cs8 => 2,
            SampleFormat::Cs16 => 4,
            SampleFormat::Cf32 => 8,
        }
    }

    /// Canonical full-scale magnitude, used to normalize raw samples
    /// when the device does not report one.
    pub fn full_scale(self) -> f32 {
        match self {
            SampleFormat::Cu8 => 127.5,
            SampleFormat::Cs8 => 128.0,
            SampleFormat::Cs16 => 32768.0,
            SampleFormat::Cf32 => 1.0,
        }
    }
}

/// Raw sample encoding negotiated with a device.
#[derive(Debug, Clone)]
pub struct FormatSelection {
    pub sfmt: SampleFormat,
    /// Device-side format string, passed verbatim to stream setup
    pub soapy_fmt: String,
    pub bytes_per_sample: usize,
    pub full_scale: f32,
}

/// Convert `num_samples` raw samples from `raw` into canonical
/// normalized complex samples, appending to a cleared `out`.
///
/// Multi-byte fields are little-endian. A trailing partial sample in
/// `raw` is ignored.
pub fn convert_to_complex(
    sfmt: SampleFormat,
    full_scale: f32,
    raw: &[u8],
    num_samples: usize,
    out: &mut Vec<Complex32>,
) {
    out.clear();
    let n = num_samples.min(raw.len() / sfmt.bytes_per_sample());
    match sfmt {
        SampleFormat::Cu8 => {
            for p in raw[..n * 2].chunks_exact(2) {
                out.push(Complex32::new(
                    (p[0] as f32 - 127.5) / full_scale,
                    (p[1] as f32 - 127.5) / full_scale,
                ));
            }
        }
        SampleFormat::Cs8 => {
            for p in raw[..n * 2].chunks_exact(2) {
                out.push(Complex32::new(
                    p[0] as i8 as f32 / full_scale,
                    p[1] as i8 as f32 / full_scale,
                ));
            }
        }
        SampleFormat::Cs16 => {
            for p in raw[..n * 4].chunks_exact(4) {
                let re = i16::from_le_bytes([p[0], p[1]]) as f32;
                let im = i16::from_le_bytes([p[2], p[3]]) as f32;
                out.push(Complex32::new(re / full_scale, im / full_scale));
            }
        }
        SampleFormat::Cf32 => {
            for p in raw[..n * 8].chunks_exact(8) {
                let re = f32::from_le_bytes([p[0], p[1], p[2], p[3]]);
                let im = f32::from_le_bytes([p[4], p[5], p[6], p[7]]);
                out.push(Complex32::new(re / full_scale, im / full_scale));
            }
        }
    }
}
