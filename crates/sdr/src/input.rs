// Copyright 2025-2026 CEMAXECUTER LLC

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam::channel::Sender;

use crate::config::{parse_kv_list, InputConfig};
use crate::device::{RadioDevice, RadioStream};
use crate::format::{convert_to_complex, FormatSelection, SampleFormat};
use crate::{RuntimeCapabilities, SampleBuf, SampleSource};

/// Settle time between stream activation and the first read, so the
/// hardware buffers have something in them.
const SETTLE_DELAY: Duration = Duration::from_millis(100);

/// Apply the configured RF parameters to an opened device, in order:
/// sample rate, frequency, correction, DC offset compensation, gain,
/// antenna, driver settings. Any device failure aborts initialization.
pub fn configure_device<D: RadioDevice>(dev: &mut D, cfg: &InputConfig) -> Result<(), String> {
    dev.set_sample_rate(cfg.sample_rate)
        .map_err(|e| format!("{}: setSampleRate failed: {}", cfg.source, e))?;

    let freq = cfg.center_freq + cfg.freq_offset;
    dev.set_frequency(freq)
        .map_err(|e| format!("{}: setFrequency failed: {}", cfg.source, e))?;
    log::info!("{}: center frequency set to {:.3} kHz", cfg.source, freq / 1000.0);

    dev.set_frequency_correction(cfg.correction)
        .map_err(|e| format!("{}: setFrequencyCorrection failed: {}", cfg.source, e))?;
    log::info!(
        "{}: frequency correction set to {:.2} ppm",
        cfg.source,
        cfg.correction
    );

    if dev.has_dc_offset_mode() {
        dev.set_dc_offset_mode(true)
            .map_err(|e| format!("{}: setDCOffsetMode failed: {}", cfg.source, e))?;
    }

    // If both a scalar gain and per-element gains are present, the
    // latter take precedence. If neither is present, auto gain is
    // enabled.
    if let Some(ref elements) = cfg.gain_elements {
        let gains = parse_kv_list(elements);
        if gains.is_empty() {
            return Err(format!(
                "unable to parse gains string '{}', \
                 must be a sequence of 'name1=value1,name2=value2,...'",
                elements
            ));
        }
        for (name, value) in &gains {
            dev.set_gain_element(name, value.parse().unwrap_or(0.0));
            let actual = dev.gain_element(name);
            log::info!("{}: gain element {} set to {:.2} dB", cfg.source, name, actual);
        }
    } else if let Some(gain) = cfg.gain {
        dev.set_gain(gain)
            .map_err(|e| format!("{}: could not set gain: {}", cfg.source, e))?;
        log::info!("{}: gain set to {:.2} dB", cfg.source, gain);
    } else {
        if !dev.has_gain_mode() {
            return Err(format!(
                "{}: device does not support auto gain, please specify gain manually",
                cfg.source
            ));
        }
        dev.set_gain_mode(true)
            .map_err(|e| format!("{}: could not enable auto gain: {}", cfg.source, e))?;
        log::info!("{}: auto gain enabled", cfg.source);
    }

    if let Some(ref antenna) = cfg.antenna {
        dev.set_antenna(antenna)
            .map_err(|e| format!("could not select antenna {}: {}", antenna, e))?;
    }
    let selected_antenna = dev.antenna();
    log::info!("{}: using antenna {}", cfg.source, selected_antenna);

    if let Some(ref settings) = cfg.device_settings {
        let pairs = parse_kv_list(settings);
        if pairs.is_empty() {
            return Err(format!(
                "{}: unable to parse device settings '{}' \
                 (must be a sequence of 'name1=value1,name2=value2,...')",
                cfg.source, settings
            ));
        }
        for (key, value) in &pairs {
            dev.write_setting(key, value);
            let readback = dev.read_setting(key);
            log::info!(
                "{}: setting {} to {} {}",
                cfg.source,
                key,
                readback,
                if readback == *value { "done" } else { "failed" }
            );
        }
    }

    Ok(())
}

/// Find a raw sample encoding usable by both the device and the
/// conversion stage.
///
/// The device's native format is preferred, with its reported
/// full-scale value, as long as its byte width agrees with the
/// canonical width of the semantic tag. Otherwise the device's format
/// list is walked in device order and the first matching entry wins,
/// with the full-scale value taken from the canonical table since the
/// device only reports one for its native format.
pub fn choose_sample_format<D: RadioDevice>(
    dev: &D,
    source: &str,
) -> Result<FormatSelection, String> {
    let (native, full_scale) = dev.native_stream_format();
    if let Some(fmt) = native {
        if let Some(sfmt) = SampleFormat::from_soapy(&fmt) {
            if dev.format_size(&fmt) == sfmt.bytes_per_sample() && full_scale > 0.0 {
                log::info!(
                    "{}: using native sample format {} (full_scale: {:.3})",
                    source,
                    fmt,
                    full_scale
                );
                return Ok(FormatSelection {
                    sfmt,
                    bytes_per_sample: sfmt.bytes_per_sample(),
                    full_scale: full_scale as f32,
                    soapy_fmt: fmt,
                });
            }
        }
    }

    // Native format is not usable directly; find out if there is
    // anything else.
    let formats = dev.stream_formats();
    if formats.is_empty() {
        return Err(format!("{}: failed to read supported sample formats", source));
    }
    for fmt in formats {
        if let Some(sfmt) = SampleFormat::from_soapy(&fmt) {
            if dev.format_size(&fmt) == sfmt.bytes_per_sample() {
                let full_scale = sfmt.full_scale();
                log::info!(
                    "{}: using non-native sample format {} (assuming full_scale={:.3})",
                    source,
                    fmt,
                    full_scale
                );
                return Ok(FormatSelection {
                    sfmt,
                    bytes_per_sample: sfmt.bytes_per_sample(),
                    full_scale,
                    soapy_fmt: fmt,
                });
            }
        }
    }

    Err(format!(
        "{}: could not find a suitable sample format, unable to use this device",
        source
    ))
}

/// One SDR acquisition instance.
///
/// Created with a config, initialized once (open, configure, negotiate,
/// stream setup), then `run` on a dedicated thread owns the stream for
/// the rest of the instance's life.
pub struct SdrInput<D: RadioDevice> {
    cfg: InputConfig,
    stream: Option<D::Rx>,
    selection: Option<FormatSelection>,
    caps: Option<RuntimeCapabilities>,
    running: Arc<AtomicBool>,
}

impl<D: RadioDevice> SdrInput<D> {
    pub fn new(cfg: InputConfig) -> Self {
        Self {
            cfg,
            stream: None,
            selection: None,
            caps: None,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn config(&self) -> &InputConfig {
        &self.cfg
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Configure an already-opened device and set up the RX stream on
    /// it. Exposed separately from `init` so a caller can supply the
    /// device handle itself.
    pub fn init_with(&mut self, mut dev: D) -> Result<(), String> {
        configure_device(&mut dev, &self.cfg)?;

        let selection = choose_sample_format(&dev, &self.cfg.source)?;
        log::debug!(
            "{}: sfmt: {:?} soapy_sfmt: {} full_scale: {:.3} sample_size: {}",
            self.cfg.source,
            selection.sfmt,
            selection.soapy_fmt,
            selection.full_scale,
            selection.bytes_per_sample
        );

        let stream = dev
            .open_stream(&selection.soapy_fmt)
            .map_err(|e| format!("{}: could not set up stream: {}", self.cfg.source, e))?;

        self.caps = Some(RuntimeCapabilities {
            max_samples: stream.mtu(),
            bytes_per_sample: selection.bytes_per_sample,
            full_scale: selection.full_scale,
        });
        self.selection = Some(selection);
        self.stream = Some(stream);
        Ok(())
    }
}

impl<D: RadioDevice> SampleSource for SdrInput<D> {
    fn init(&mut self) -> Result<(), String> {
        let dev = D::open(&self.cfg.source).map_err(|e| format!("{}: {}", self.cfg.source, e))?;
        self.init_with(dev)
    }

    fn capabilities(&self) -> Option<RuntimeCapabilities> {
        self.caps
    }

    fn run(&mut self, tx: Sender<SampleBuf>, shutdown: Arc<AtomicBool>) {
        let (mut stream, selection, caps) = match (self.stream.take(), &self.selection, self.caps)
        {
            (Some(stream), Some(selection), Some(caps)) => (stream, selection.clone(), caps),
            _ => {
                log::error!("{}: run() called before init()", self.cfg.source);
                return;
            }
        };
        self.running.store(true, Ordering::SeqCst);

        let mut inbuf = vec![0u8; caps.max_samples * caps.bytes_per_sample];

        match stream.activate() {
            Ok(()) => {
                // Let hardware buffers fill before the first read.
                thread::sleep(SETTLE_DELAY);
                while !shutdown.load(Ordering::SeqCst) {
                    let ret = stream.read(&mut inbuf, caps.max_samples);
                    if ret < 0 {
                        // when it's negative, it's the error code
                        log::error!(
                            "{}: readStream failed: {}",
                            self.cfg.source,
                            stream.error_text(ret)
                        );
                        continue;
                    }
                    let mut samples = Vec::with_capacity(ret as usize);
                    convert_to_complex(
                        selection.sfmt,
                        selection.full_scale,
                        &inbuf,
                        ret as usize,
                        &mut samples,
                    );
                    if tx.send(SampleBuf { samples }).is_err() {
                        break; // consumer went away
                    }
                }
            }
            Err(e) => {
                log::error!(
                    "failed to activate stream for device '{}': {}",
                    self.cfg.source,
                    e
                );
                shutdown.store(true, Ordering::SeqCst);
            }
        }

        log::debug!("shutdown ordered, signaling consumer shutdown");
        stream.deactivate();
        drop(stream);
        drop(tx);
        self.running.store(false, Ordering::SeqCst);
    }
}

/// The SoapySDR-backed acquisition input.
#[cfg(feature = "soapysdr")]
pub type SoapyInput = SdrInput<crate::soapy::SoapyDev>;

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam::channel;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MockLog {
        calls: Vec<String>,
        stream_deactivated: u32,
        stream_closed: u32,
        device_released: u32,
    }

    type SharedLog = Arc<Mutex<MockLog>>;

    struct MockDevice {
        log: SharedLog,
        has_dc_offset: bool,
        has_gain_mode: bool,
        native: Option<(String, f64)>,
        formats: Vec<String>,
        /// format -> reported byte width, overriding the canonical width
        sizes: Vec<(String, usize)>,
        /// setting -> forced read-back value
        readback: Vec<(String, String)>,
        written: Vec<(String, String)>,
        element_gains: Vec<(String, f64)>,
        antenna: String,
        mtu: usize,
        fail_activate: bool,
        reads: VecDeque<i32>,
        shutdown: Arc<AtomicBool>,
    }

    impl MockDevice {
        fn new(log: SharedLog, shutdown: Arc<AtomicBool>) -> Self {
            Self {
                log,
                has_dc_offset: false,
                has_gain_mode: true,
                native: Some(("CS16".to_string(), 32768.0)),
                formats: vec!["CS16".to_string()],
                sizes: Vec::new(),
                readback: Vec::new(),
                written: Vec::new(),
                element_gains: Vec::new(),
                antenna: "RX".to_string(),
                mtu: 4096,
                fail_activate: false,
                reads: VecDeque::new(),
                shutdown,
            }
        }

        fn record(&self, call: String) {
            self.log.lock().unwrap().calls.push(call);
        }
    }

    impl RadioDevice for MockDevice {
        type Rx = MockStream;

        fn open(_args: &str) -> Result<Self, String> {
            Err("mock devices are constructed directly".to_string())
        }

        fn set_sample_rate(&mut self, hz: f64) -> Result<(), String> {
            self.record(format!("setSampleRate {}", hz));
            Ok(())
        }

        fn set_frequency(&mut self, hz: f64) -> Result<(), String> {
            self.record(format!("setFrequency {}", hz));
            Ok(())
        }

        fn set_frequency_correction(&mut self, ppm: f64) -> Result<(), String> {
            self.record(format!("setFrequencyCorrection {}", ppm));
            Ok(())
        }

        fn has_dc_offset_mode(&self) -> bool {
            self.has_dc_offset
        }

        fn set_dc_offset_mode(&mut self, automatic: bool) -> Result<(), String> {
            self.record(format!("setDCOffsetMode {}", automatic));
            Ok(())
        }

        fn set_gain(&mut self, db: f64) -> Result<(), String> {
            self.record(format!("setGain {}", db));
            Ok(())
        }

        fn set_gain_element(&mut self, name: &str, db: f64) {
            self.record(format!("setGainElement {} {}", name, db));
            self.element_gains.push((name.to_string(), db));
        }

        fn gain_element(&self, name: &str) -> f64 {
            self.element_gains
                .iter()
                .rev()
                .find(|(n, _)| n == name)
                .map(|(_, db)| *db)
                .unwrap_or(0.0)
        }

        fn has_gain_mode(&self) -> bool {
            self.has_gain_mode
        }

        fn set_gain_mode(&mut self, automatic: bool) -> Result<(), String> {
            self.record(format!("setGainMode {}", automatic));
            Ok(())
        }

        fn set_antenna(&mut self, name: &str) -> Result<(), String> {
            self.record(format!("setAntenna {}", name));
            self.antenna = name.to_string();
            Ok(())
        }

        fn antenna(&self) -> String {
            self.record("getAntenna".to_string());
            self.antenna.clone()
        }

        fn write_setting(&mut self, key: &str, value: &str) {
            self.record(format!("writeSetting {}={}", key, value));
            self.written.push((key.to_string(), value.to_string()));
        }

        fn read_setting(&self, key: &str) -> String {
            self.record(format!("readSetting {}", key));
            if let Some((_, v)) = self.readback.iter().find(|(k, _)| k == key) {
                return v.clone();
            }
            self.written
                .iter()
                .rev()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.clone())
                .unwrap_or_default()
        }

        fn native_stream_format(&self) -> (Option<String>, f64) {
            match &self.native {
                Some((fmt, full_scale)) => (Some(fmt.clone()), *full_scale),
                None => (None, 0.0),
            }
        }

        fn stream_formats(&self) -> Vec<String> {
            self.formats.clone()
        }

        fn format_size(&self, fmt: &str) -> usize {
            if let Some((_, size)) = self.sizes.iter().find(|(f, _)| f == fmt) {
                return *size;
            }
            SampleFormat::from_soapy(fmt)
                .map(|s| s.bytes_per_sample())
                .unwrap_or(0)
        }

        fn open_stream(self, format: &str) -> Result<MockStream, String> {
            self.record(format!("setupStream {}", format));
            Ok(MockStream {
                log: self.log.clone(),
                mtu: self.mtu,
                fail_activate: self.fail_activate,
                reads: self.reads,
                shutdown: self.shutdown,
            })
        }
    }

    struct MockStream {
        log: SharedLog,
        mtu: usize,
        fail_activate: bool,
        reads: VecDeque<i32>,
        shutdown: Arc<AtomicBool>,
    }

    impl RadioStream for MockStream {
        fn mtu(&self) -> usize {
            self.mtu
        }

        fn activate(&mut self) -> Result<(), String> {
            if self.fail_activate {
                return Err("activation refused".to_string());
            }
            self.log.lock().unwrap().calls.push("activateStream".to_string());
            Ok(())
        }

        fn read(&mut self, buf: &mut [u8], num_samples: usize) -> i32 {
            self.log.lock().unwrap().calls.push("readStream".to_string());
            match self.reads.pop_front() {
                Some(n) => {
                    if n > 0 {
                        // CS16 payload, all bytes identical
                        let len = (n as usize).min(num_samples) * 4;
                        for b in buf[..len].iter_mut() {
                            *b = 0x10;
                        }
                    }
                    n
                }
                None => {
                    // Script ran dry; order a shutdown so the loop drains.
                    self.shutdown.store(true, Ordering::SeqCst);
                    -1
                }
            }
        }

        fn error_text(&self, code: i32) -> String {
            format!("mock error {}", code)
        }

        fn deactivate(&mut self) {
            self.log.lock().unwrap().stream_deactivated += 1;
        }
    }

    impl Drop for MockStream {
        fn drop(&mut self) {
            let mut log = self.log.lock().unwrap();
            log.stream_closed += 1;
            log.device_released += 1;
        }
    }

    fn test_cfg() -> InputConfig {
        InputConfig {
            source: "driver=test".to_string(),
            sample_rate: 250_000.0,
            center_freq: 121_500_000.0,
            freq_offset: 0.0,
            correction: 0.0,
            gain: None,
            gain_elements: None,
            antenna: None,
            device_settings: None,
            queue_depth: 16,
        }
    }

    fn mock() -> (MockDevice, SharedLog, Arc<AtomicBool>) {
        let log: SharedLog = Arc::new(Mutex::new(MockLog::default()));
        let shutdown = Arc::new(AtomicBool::new(false));
        let dev = MockDevice::new(log.clone(), shutdown.clone());
        (dev, log, shutdown)
    }

    #[test]
    fn test_configure_step_order() {
        let (mut dev, log, _) = mock();
        dev.has_dc_offset = true;
        let mut cfg = test_cfg();
        cfg.gain = Some(12.0);
        cfg.antenna = Some("RX2".to_string());
        cfg.device_settings = Some("biastee=true".to_string());

        configure_device(&mut dev, &cfg).unwrap();

        let calls = log.lock().unwrap().calls.clone();
        assert_eq!(
            calls,
            vec![
                "setSampleRate 250000",
                "setFrequency 121500000",
                "setFrequencyCorrection 0",
                "setDCOffsetMode true",
                "setGain 12",
                "setAntenna RX2",
                "getAntenna",
                "writeSetting biastee=true",
                "readSetting biastee",
            ]
        );
    }

    #[test]
    fn test_dc_offset_skipped_when_unsupported() {
        let (mut dev, log, _) = mock();
        dev.has_dc_offset = false;
        let mut cfg = test_cfg();
        cfg.gain = Some(0.0);

        configure_device(&mut dev, &cfg).unwrap();

        let calls = log.lock().unwrap().calls.clone();
        assert!(!calls.iter().any(|c| c.starts_with("setDCOffsetMode")));
    }

    #[test]
    fn test_gain_elements_override_scalar_gain() {
        let (mut dev, log, _) = mock();
        let mut cfg = test_cfg();
        cfg.gain = Some(30.0);
        cfg.gain_elements = Some("LNA=20,VGA=10".to_string());

        configure_device(&mut dev, &cfg).unwrap();

        let calls = log.lock().unwrap().calls.clone();
        let element_calls: Vec<&String> = calls
            .iter()
            .filter(|c| c.starts_with("setGainElement"))
            .collect();
        assert_eq!(element_calls, vec!["setGainElement LNA 20", "setGainElement VGA 10"]);
        assert!(!calls.iter().any(|c| *c == "setGain 30"));
        assert!(!calls.iter().any(|c| c.starts_with("setGainMode")));
    }

    #[test]
    fn test_scalar_gain_overrides_auto() {
        let (mut dev, log, _) = mock();
        let mut cfg = test_cfg();
        cfg.gain = Some(12.5);

        configure_device(&mut dev, &cfg).unwrap();

        let calls = log.lock().unwrap().calls.clone();
        assert!(calls.iter().any(|c| *c == "setGain 12.5"));
        assert!(!calls.iter().any(|c| c.starts_with("setGainMode")));
        assert!(!calls.iter().any(|c| c.starts_with("setGainElement")));
    }

    #[test]
    fn test_auto_gain_when_unspecified() {
        let (mut dev, log, _) = mock();
        let cfg = test_cfg();

        configure_device(&mut dev, &cfg).unwrap();

        let calls = log.lock().unwrap().calls.clone();
        assert!(calls.iter().any(|c| *c == "setGainMode true"));
        assert!(!calls.iter().any(|c| *c == "setGain 0" || c.starts_with("setGainElement")));
    }

    #[test]
    fn test_auto_gain_unsupported_is_fatal() {
        let (mut dev, log, _) = mock();
        dev.has_gain_mode = false;
        let cfg = test_cfg();

        let mut input: SdrInput<MockDevice> = SdrInput::new(cfg);
        let err = input.init_with(dev).unwrap_err();
        assert!(err.contains("auto gain"), "{}", err);

        // Failed before any stream was opened
        let calls = log.lock().unwrap().calls.clone();
        assert!(!calls.iter().any(|c| c.starts_with("setupStream")));
        assert!(input.capabilities().is_none());
    }

    #[test]
    fn test_gain_elements_zero_entries_is_fatal() {
        let (mut dev, _, _) = mock();
        let mut cfg = test_cfg();
        cfg.gain_elements = Some(",,,".to_string());

        let err = configure_device(&mut dev, &cfg).unwrap_err();
        assert!(err.contains("gains string"), "{}", err);
    }

    #[test]
    fn test_device_settings_zero_entries_is_fatal() {
        let (mut dev, _, _) = mock();
        let mut cfg = test_cfg();
        cfg.device_settings = Some("no equals sign".to_string());

        let err = configure_device(&mut dev, &cfg).unwrap_err();
        assert!(err.contains("device settings"), "{}", err);
    }

    #[test]
    fn test_device_settings_mismatch_is_not_fatal() {
        let (mut dev, _, _) = mock();
        dev.readback = vec![("agc_mode".to_string(), "0".to_string())];
        let mut cfg = test_cfg();
        cfg.device_settings = Some("agc_mode=1".to_string());

        configure_device(&mut dev, &cfg).unwrap();
        assert_eq!(dev.written, vec![("agc_mode".to_string(), "1".to_string())]);
    }

    #[test]
    fn test_negotiate_native_uses_device_full_scale() {
        let (mut dev, _, _) = mock();
        dev.native = Some(("CS16".to_string(), 30000.0));

        let sel = choose_sample_format(&dev, "driver=test").unwrap();
        assert_eq!(sel.sfmt, SampleFormat::Cs16);
        assert_eq!(sel.soapy_fmt, "CS16");
        assert_eq!(sel.bytes_per_sample, 4);
        assert_eq!(sel.full_scale, 30000.0);
    }

    #[test]
    fn test_negotiate_rejects_nonpositive_native_full_scale() {
        let (mut dev, _, _) = mock();
        dev.native = Some(("CS16".to_string(), 0.0));
        dev.formats = vec!["CS16".to_string()];

        let sel = choose_sample_format(&dev, "driver=test").unwrap();
        // Fell through to the format list: canonical full scale
        assert_eq!(sel.full_scale, 32768.0);
        assert!(sel.full_scale > 0.0);
    }

    #[test]
    fn test_negotiate_width_mismatch_selects_from_list() {
        let (mut dev, _, _) = mock();
        // Native CS8 reports a bogus 3-byte width, so it must not win
        // even though its full scale is positive.
        dev.native = Some(("CS8".to_string(), 999.0));
        dev.sizes = vec![("CS8".to_string(), 3)];
        dev.formats = vec!["CF64".to_string(), "CS12".to_string(), "CS16".to_string()];

        let sel = choose_sample_format(&dev, "driver=test").unwrap();
        assert_eq!(sel.soapy_fmt, "CS16");
        assert_eq!(sel.bytes_per_sample, SampleFormat::Cs16.bytes_per_sample());
        // Canonical table, not the device-reported native value
        assert_eq!(sel.full_scale, 32768.0);
    }

    #[test]
    fn test_negotiate_never_accepts_mismatched_width() {
        let (mut dev, _, _) = mock();
        dev.native = None;
        dev.formats = vec![
            "CU8".to_string(),
            "CS8".to_string(),
            "CS16".to_string(),
            "CF32".to_string(),
        ];
        dev.sizes = vec![
            ("CU8".to_string(), 3),
            ("CS8".to_string(), 3),
            ("CS16".to_string(), 5),
            ("CF32".to_string(), 9),
        ];

        assert!(choose_sample_format(&dev, "driver=test").is_err());
    }

    #[test]
    fn test_negotiate_empty_format_list_fails() {
        let (mut dev, _, _) = mock();
        dev.native = None;
        dev.formats = Vec::new();

        let err = choose_sample_format(&dev, "driver=test").unwrap_err();
        assert!(err.contains("supported sample formats"), "{}", err);
    }

    #[test]
    fn test_negotiate_no_usable_format_fails() {
        let (mut dev, _, _) = mock();
        dev.native = Some(("CS12".to_string(), 2047.0));
        dev.formats = vec!["CS12".to_string(), "CF64".to_string()];

        let err = choose_sample_format(&dev, "driver=test").unwrap_err();
        assert!(err.contains("suitable sample format"), "{}", err);
    }

    #[test]
    fn test_init_populates_capabilities() {
        let (mut dev, _, _) = mock();
        dev.mtu = 8192;
        let mut input: SdrInput<MockDevice> = SdrInput::new(test_cfg());
        assert!(input.capabilities().is_none());

        input.init_with(dev).unwrap();

        let caps = input.capabilities().unwrap();
        assert_eq!(caps.max_samples, 8192);
        assert_eq!(caps.bytes_per_sample, 4);
        assert_eq!(caps.full_scale, 32768.0);
    }

    #[test]
    fn test_run_transient_errors_never_push_or_stop() {
        let (mut dev, log, shutdown) = mock();
        dev.reads = VecDeque::from(vec![-1, -1, -1, 5]);
        let mut input: SdrInput<MockDevice> = SdrInput::new(test_cfg());
        input.init_with(dev).unwrap();

        let (tx, rx) = channel::bounded(16);
        input.run(tx, shutdown);

        // Three failed reads advanced nothing; the fourth produced one
        // block of exactly five samples.
        let blocks: Vec<SampleBuf> = rx.iter().collect();
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].samples.len(), 5);

        // 4 scripted reads plus the final one that ordered shutdown
        let reads = log
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|c| *c == "readStream")
            .count();
        assert_eq!(reads, 5);
    }

    #[test]
    fn test_run_drains_exactly_once_on_cancellation() {
        let (mut dev, log, shutdown) = mock();
        dev.reads = VecDeque::from(vec![16, 16]);
        let mut input: SdrInput<MockDevice> = SdrInput::new(test_cfg());
        input.init_with(dev).unwrap();

        let (tx, rx) = channel::bounded(16);
        input.run(tx, shutdown.clone());

        assert!(shutdown.load(Ordering::SeqCst));
        assert!(!input.is_running());
        let log = log.lock().unwrap();
        assert_eq!(log.stream_deactivated, 1);
        assert_eq!(log.stream_closed, 1);
        assert_eq!(log.device_released, 1);
        drop(log);

        // End of stream: channel fully drained and disconnected
        let blocks: Vec<SampleBuf> = rx.iter().collect();
        assert_eq!(blocks.len(), 2);
    }

    #[test]
    fn test_activation_failure_escalates_and_drains_once() {
        let (mut dev, log, shutdown) = mock();
        dev.fail_activate = true;
        let mut input: SdrInput<MockDevice> = SdrInput::new(test_cfg());
        input.init_with(dev).unwrap();

        let (tx, rx) = channel::bounded(16);
        input.run(tx, shutdown.clone());

        // Escalated to process-wide shutdown, then drained normally
        assert!(shutdown.load(Ordering::SeqCst));
        assert!(!input.is_running());
        let log = log.lock().unwrap();
        assert_eq!(log.stream_deactivated, 1);
        assert_eq!(log.stream_closed, 1);
        assert_eq!(log.device_released, 1);
        drop(log);

        assert!(rx.iter().next().is_none());
    }

    #[test]
    fn test_run_stops_when_consumer_disconnects() {
        let (mut dev, log, shutdown) = mock();
        dev.reads = VecDeque::from(vec![8, 8, 8, 8]);
        let mut input: SdrInput<MockDevice> = SdrInput::new(test_cfg());
        input.init_with(dev).unwrap();

        let (tx, rx) = channel::bounded(16);
        drop(rx);
        input.run(tx, shutdown);

        let log = log.lock().unwrap();
        assert_eq!(log.stream_closed, 1);
        // First send hit the disconnect, loop stopped after one read
        let reads = log.calls.iter().filter(|c| *c == "readStream").count();
        assert_eq!(reads, 1);
    }
}
