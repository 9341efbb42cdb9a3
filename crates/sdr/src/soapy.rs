// Copyright 2025-2026 CEMAXECUTER LLC

use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_double, c_int, c_void};
use std::ptr;

use crate::device::{RadioDevice, RadioStream};

type SoapyDevice = c_void;
type SoapyStream = c_void;

// SoapySDR constants
const SOAPY_SDR_RX: c_int = 0;

/// Blocking read timeout, microseconds.
const READSTREAM_TIMEOUT_US: i64 = 1_000_000;

/// Fallback when the driver reports no stream MTU.
const DEFAULT_MTU: usize = 65536;

// SoapySDRKwargs
#[repr(C)]
struct SoapyKwargs {
    size: usize,
    keys: *mut *mut c_char,
    vals: *mut *mut c_char,
}

extern "C" {
    fn SoapySDRDevice_enumerate(args: *const SoapyKwargs, length: *mut usize) -> *mut SoapyKwargs;
    fn SoapySDRDevice_makeStrArgs(args: *const c_char) -> *mut SoapyDevice;
    fn SoapySDRDevice_unmake(device: *mut SoapyDevice) -> c_int;
    fn SoapySDRDevice_setSampleRate(
        dev: *mut SoapyDevice,
        direction: c_int,
        channel: usize,
        rate: c_double,
    ) -> c_int;
    fn SoapySDRDevice_setFrequency(
        dev: *mut SoapyDevice,
        direction: c_int,
        channel: usize,
        frequency: c_double,
        args: *const SoapyKwargs,
    ) -> c_int;
    fn SoapySDRDevice_setFrequencyCorrection(
        dev: *mut SoapyDevice,
        direction: c_int,
        channel: usize,
        value: c_double,
    ) -> c_int;
    fn SoapySDRDevice_hasDCOffsetMode(
        dev: *const SoapyDevice,
        direction: c_int,
        channel: usize,
    ) -> bool;
    fn SoapySDRDevice_setDCOffsetMode(
        dev: *mut SoapyDevice,
        direction: c_int,
        channel: usize,
        automatic: bool,
    ) -> c_int;
    fn SoapySDRDevice_setGain(
        dev: *mut SoapyDevice,
        direction: c_int,
        channel: usize,
        value: c_double,
    ) -> c_int;
    fn SoapySDRDevice_setGainElement(
        dev: *mut SoapyDevice,
        direction: c_int,
        channel: usize,
        name: *const c_char,
        value: c_double,
    ) -> c_int;
    fn SoapySDRDevice_getGainElement(
        dev: *const SoapyDevice,
        direction: c_int,
        channel: usize,
        name: *const c_char,
    ) -> c_double;
    fn SoapySDRDevice_hasGainMode(
        dev: *const SoapyDevice,
        direction: c_int,
        channel: usize,
    ) -> bool;
    fn SoapySDRDevice_setGainMode(
        dev: *mut SoapyDevice,
        direction: c_int,
        channel: usize,
        automatic: bool,
    ) -> c_int;
    fn SoapySDRDevice_setAntenna(
        dev: *mut SoapyDevice,
        direction: c_int,
        channel: usize,
        name: *const c_char,
    ) -> c_int;
    fn SoapySDRDevice_getAntenna(
        dev: *const SoapyDevice,
        direction: c_int,
        channel: usize,
    ) -> *mut c_char;
    fn SoapySDRDevice_writeSetting(
        dev: *mut SoapyDevice,
        key: *const c_char,
        value: *const c_char,
    ) -> c_int;
    fn SoapySDRDevice_readSetting(
        dev: *const SoapyDevice,
        key: *const c_char,
    ) -> *mut c_char;
    fn SoapySDRDevice_getNativeStreamFormat(
        dev: *const SoapyDevice,
        direction: c_int,
        channel: usize,
        full_scale: *mut c_double,
    ) -> *mut c_char;
    fn SoapySDRDevice_getStreamFormats(
        dev: *const SoapyDevice,
        direction: c_int,
        channel: usize,
        length: *mut usize,
    ) -> *mut *mut c_char;
    fn SoapySDRDevice_setupStream(
        dev: *mut SoapyDevice,
        direction: c_int,
        format: *const c_char,
        channels: *const usize,
        num_chans: usize,
        args: *const SoapyKwargs,
    ) -> *mut SoapyStream;
    fn SoapySDRDevice_activateStream(
        dev: *mut SoapyDevice,
        stream: *mut SoapyStream,
        flags: c_int,
        time_ns: i64,
        num_elems: usize,
    ) -> c_int;
    fn SoapySDRDevice_deactivateStream(
        dev: *mut SoapyDevice,
        stream: *mut SoapyStream,
        flags: c_int,
        time_ns: i64,
    ) -> c_int;
    fn SoapySDRDevice_closeStream(dev: *mut SoapyDevice, stream: *mut SoapyStream) -> c_int;
    fn SoapySDRDevice_readStream(
        dev: *mut SoapyDevice,
        stream: *mut SoapyStream,
        buffs: *const *mut c_void,
        num_elems: usize,
        flags: *mut c_int,
        time_ns: *mut i64,
        timeout_us: i64,
    ) -> c_int;
    fn SoapySDRDevice_getStreamMTU(dev: *mut SoapyDevice, stream: *mut SoapyStream) -> usize;
    fn SoapySDRDevice_lastError() -> *const c_char;
    fn SoapySDR_formatToSize(format: *const c_char) -> usize;
    fn SoapySDR_errToStr(error_code: c_int) -> *const c_char;
    fn SoapySDRKwargsList_clear(info: *mut SoapyKwargs, length: usize);
    fn SoapySDRStrings_clear(strings: *mut *mut c_char, length: usize);
}

fn last_error() -> String {
    unsafe {
        let p = SoapySDRDevice_lastError();
        if p.is_null() {
            "unknown error".to_string()
        } else {
            CStr::from_ptr(p).to_string_lossy().to_string()
        }
    }
}

fn cstr_to_string(p: *const c_char) -> String {
    if p.is_null() {
        String::new()
    } else {
        unsafe { CStr::from_ptr(p).to_string_lossy().to_string() }
    }
}

/// Log every available device and its key/value metadata.
///
/// Diagnostics only: enumeration trouble yields an empty listing and
/// has no effect on the subsequent open.
pub fn log_device_search() {
    let mut length: usize = 0;
    let results = unsafe { SoapySDRDevice_enumerate(ptr::null(), &mut length) };
    if results.is_null() {
        return;
    }
    for i in 0..length {
        let kw = unsafe { &*results.add(i) };
        log::info!("Found device #{}:", i);
        for j in 0..kw.size {
            let key = cstr_to_string(unsafe { *kw.keys.add(j) });
            let val = cstr_to_string(unsafe { *kw.vals.add(j) });
            log::info!("  {} = {}", key, val);
        }
    }
    unsafe { SoapySDRKwargsList_clear(results, length) };
}

/// An opened SoapySDR device, before stream setup.
pub struct SoapyDev {
    dev: *mut SoapyDevice,
}

unsafe impl Send for SoapyDev {}

impl Drop for SoapyDev {
    fn drop(&mut self) {
        unsafe { SoapySDRDevice_unmake(self.dev) };
    }
}

impl RadioDevice for SoapyDev {
    type Rx = SoapyRx;

    fn open(args: &str) -> Result<Self, String> {
        log_device_search();
        let c_args = CString::new(args).map_err(|_| "device args contain NUL".to_string())?;
        let dev = unsafe { SoapySDRDevice_makeStrArgs(c_args.as_ptr()) };
        if dev.is_null() {
            return Err(format!("could not open SoapySDR device: {}", last_error()));
        }
        Ok(Self { dev })
    }

    fn set_sample_rate(&mut self, hz: f64) -> Result<(), String> {
        let r = unsafe { SoapySDRDevice_setSampleRate(self.dev, SOAPY_SDR_RX, 0, hz) };
        if r != 0 {
            return Err(last_error());
        }
        Ok(())
    }

    fn set_frequency(&mut self, hz: f64) -> Result<(), String> {
        let r = unsafe { SoapySDRDevice_setFrequency(self.dev, SOAPY_SDR_RX, 0, hz, ptr::null()) };
        if r != 0 {
            return Err(last_error());
        }
        Ok(())
    }

    fn set_frequency_correction(&mut self, ppm: f64) -> Result<(), String> {
        let r = unsafe { SoapySDRDevice_setFrequencyCorrection(self.dev, SOAPY_SDR_RX, 0, ppm) };
        if r != 0 {
            return Err(last_error());
        }
        Ok(())
    }

    fn has_dc_offset_mode(&self) -> bool {
        unsafe { SoapySDRDevice_hasDCOffsetMode(self.dev, SOAPY_SDR_RX, 0) }
    }

    fn set_dc_offset_mode(&mut self, automatic: bool) -> Result<(), String> {
        let r = unsafe { SoapySDRDevice_setDCOffsetMode(self.dev, SOAPY_SDR_RX, 0, automatic) };
        if r != 0 {
            return Err(last_error());
        }
        Ok(())
    }

    fn set_gain(&mut self, db: f64) -> Result<(), String> {
        let r = unsafe { SoapySDRDevice_setGain(self.dev, SOAPY_SDR_RX, 0, db) };
        if r != 0 {
            return Err(last_error());
        }
        Ok(())
    }

    fn set_gain_element(&mut self, name: &str, db: f64) {
        let c_name = match CString::new(name) {
            Ok(s) => s,
            Err(_) => return,
        };
        unsafe { SoapySDRDevice_setGainElement(self.dev, SOAPY_SDR_RX, 0, c_name.as_ptr(), db) };
    }

    fn gain_element(&self, name: &str) -> f64 {
        let c_name = match CString::new(name) {
            Ok(s) => s,
            Err(_) => return 0.0,
        };
        unsafe { SoapySDRDevice_getGainElement(self.dev, SOAPY_SDR_RX, 0, c_name.as_ptr()) }
    }

    fn has_gain_mode(&self) -> bool {
        unsafe { SoapySDRDevice_hasGainMode(self.dev, SOAPY_SDR_RX, 0) }
    }

    fn set_gain_mode(&mut self, automatic: bool) -> Result<(), String> {
        let r = unsafe { SoapySDRDevice_setGainMode(self.dev, SOAPY_SDR_RX, 0, automatic) };
        if r != 0 {
            return Err(last_error());
        }
        Ok(())
    }

    fn set_antenna(&mut self, name: &str) -> Result<(), String> {
        let c_name = CString::new(name).map_err(|_| "antenna name contains NUL".to_string())?;
        let r = unsafe { SoapySDRDevice_setAntenna(self.dev, SOAPY_SDR_RX, 0, c_name.as_ptr()) };
        if r != 0 {
            return Err(last_error());
        }
        Ok(())
    }

    fn antenna(&self) -> String {
        cstr_to_string(unsafe { SoapySDRDevice_getAntenna(self.dev, SOAPY_SDR_RX, 0) })
    }

    fn write_setting(&mut self, key: &str, value: &str) {
        let (c_key, c_val) = match (CString::new(key), CString::new(value)) {
            (Ok(k), Ok(v)) => (k, v),
            _ => return,
        };
        unsafe { SoapySDRDevice_writeSetting(self.dev, c_key.as_ptr(), c_val.as_ptr()) };
    }

    fn read_setting(&self, key: &str) -> String {
        let c_key = match CString::new(key) {
            Ok(k) => k,
            Err(_) => return String::new(),
        };
        cstr_to_string(unsafe { SoapySDRDevice_readSetting(self.dev, c_key.as_ptr()) })
    }

    fn native_stream_format(&self) -> (Option<String>, f64) {
        let mut full_scale: c_double = 0.0;
        let fmt = unsafe {
            SoapySDRDevice_getNativeStreamFormat(self.dev, SOAPY_SDR_RX, 0, &mut full_scale)
        };
        if fmt.is_null() {
            return (None, 0.0);
        }
        (Some(cstr_to_string(fmt)), full_scale)
    }

    fn stream_formats(&self) -> Vec<String> {
        let mut length: usize = 0;
        let formats =
            unsafe { SoapySDRDevice_getStreamFormats(self.dev, SOAPY_SDR_RX, 0, &mut length) };
        if formats.is_null() || length == 0 {
            return Vec::new();
        }
        let mut out = Vec::with_capacity(length);
        for i in 0..length {
            out.push(cstr_to_string(unsafe { *formats.add(i) }));
        }
        unsafe { SoapySDRStrings_clear(formats, length) };
        out
    }

    fn format_size(&self, fmt: &str) -> usize {
        let c_fmt = match CString::new(fmt) {
            Ok(s) => s,
            Err(_) => return 0,
        };
        unsafe { SoapySDR_formatToSize(c_fmt.as_ptr()) }
    }

    fn open_stream(self, format: &str) -> Result<SoapyRx, String> {
        let c_fmt = CString::new(format).map_err(|_| "format contains NUL".to_string())?;
        let channel: usize = 0;
        let stream = unsafe {
            SoapySDRDevice_setupStream(
                self.dev,
                SOAPY_SDR_RX,
                c_fmt.as_ptr(),
                &channel,
                1,
                ptr::null(),
            )
        };
        if stream.is_null() {
            // self drops here and releases the device
            return Err(last_error());
        }
        let mtu = unsafe { SoapySDRDevice_getStreamMTU(self.dev, stream) };
        let mtu = if mtu == 0 { DEFAULT_MTU } else { mtu };
        let rx = SoapyRx {
            dev: self.dev,
            stream,
            mtu,
        };
        // Ownership of the device pointer moved into the stream.
        std::mem::forget(self);
        Ok(rx)
    }
}

/// An active-capable RX stream. Owns both the stream and the device;
/// dropping it closes the stream and then releases the device.
pub struct SoapyRx {
    dev: *mut SoapyDevice,
    stream: *mut SoapyStream,
    mtu: usize,
}

unsafe impl Send for SoapyRx {}

impl RadioStream for SoapyRx {
    fn mtu(&self) -> usize {
        self.mtu
    }

    fn activate(&mut self) -> Result<(), String> {
        let r = unsafe { SoapySDRDevice_activateStream(self.dev, self.stream, 0, 0, 0) };
        if r != 0 {
            return Err(self.error_text(r));
        }
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8], num_samples: usize) -> i32 {
        let mut flags: c_int = 0;
        let mut time_ns: i64 = 0;
        let buf_ptr = buf.as_mut_ptr() as *mut c_void;
        unsafe {
            SoapySDRDevice_readStream(
                self.dev,
                self.stream,
                &buf_ptr,
                num_samples,
                &mut flags,
                &mut time_ns,
                READSTREAM_TIMEOUT_US,
            )
        }
    }

    fn error_text(&self, code: i32) -> String {
        cstr_to_string(unsafe { SoapySDR_errToStr(code) })
    }

    fn deactivate(&mut self) {
        unsafe { SoapySDRDevice_deactivateStream(self.dev, self.stream, 0, 0) };
    }
}

impl Drop for SoapyRx {
    fn drop(&mut self) {
        unsafe {
            SoapySDRDevice_closeStream(self.dev, self.stream);
            SoapySDRDevice_unmake(self.dev);
        }
    }
}
