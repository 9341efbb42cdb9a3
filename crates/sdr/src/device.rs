/// Control surface of an opened RX device.
///
/// Implemented over the SoapySDR C API in `soapy`; tests drive the
/// configuration and streaming code through a scripted mock instead.
/// Fallible operations return the driver's textual last error.
pub trait RadioDevice: Send + Sized {
    type Rx: RadioStream;

    /// Open a device matching the given driver argument string.
    fn open(args: &str) -> Result<Self, String>;

    fn set_sample_rate(&mut self, hz: f64) -> Result<(), String>;
    fn set_frequency(&mut self, hz: f64) -> Result<(), String>;
    fn set_frequency_correction(&mut self, ppm: f64) -> Result<(), String>;
    fn has_dc_offset_mode(&self) -> bool;
    fn set_dc_offset_mode(&mut self, automatic: bool) -> Result<(), String>;
    fn set_gain(&mut self, db: f64) -> Result<(), String>;
    fn set_gain_element(&mut self, name: &str, db: f64);
    /// Gain actually in effect for one element, read back from the device.
    fn gain_element(&self, name: &str) -> f64;
    fn has_gain_mode(&self) -> bool;
    fn set_gain_mode(&mut self, automatic: bool) -> Result<(), String>;
    fn set_antenna(&mut self, name: &str) -> Result<(), String>;
    fn antenna(&self) -> String;
    fn write_setting(&mut self, key: &str, value: &str);
    fn read_setting(&self, key: &str) -> String;

    /// The device's preferred raw format and its reported full-scale
    /// value. None when the device reports no native format.
    fn native_stream_format(&self) -> (Option<String>, f64);
    /// All raw formats the device can stream, in device-reported order.
    fn stream_formats(&self) -> Vec<String>;
    /// Device-reported byte width of one complex sample in `fmt`.
    fn format_size(&self, fmt: &str) -> usize;

    /// Set up the RX stream, consuming the device. The stream owns the
    /// device from here on and releases it when dropped, so no device
    /// call can happen after stream setup.
    fn open_stream(self, format: &str) -> Result<Self::Rx, String>;
}

/// An RX stream bound to the device it was created on.
///
/// Dropping the stream closes it and releases the owning device.
pub trait RadioStream: Send {
    /// Maximum complex samples one read() can deliver.
    fn mtu(&self) -> usize;
    fn activate(&mut self) -> Result<(), String>;
    /// Blocking read of up to `num_samples` raw samples into `buf`,
    /// bounded by the stream's read timeout. A non-negative return is
    /// the number of samples read; a negative one is a driver error code.
    fn read(&mut self, buf: &mut [u8], num_samples: usize) -> i32;
    /// Human-readable text for a negative read() result.
    fn error_text(&self, code: i32) -> String;
    fn deactivate(&mut self);
}
