//! `hidapi` backend
//!
//! `HidApi` is created on `init` and dropped on `exit`. Open devices are
//! wrapped in a mutex so a handle can be shared between the job queue's
//! blocking threads and the poll thread.

use super::{DriverError, HidDriver, NativeDevice};
use hidapi::{DeviceInfo, HidApi, HidDevice};
use std::ffi::CString;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, trace};
use types::{NativeString, RawDeviceRecord};

/// Driver backed by the platform hidapi library
#[derive(Default)]
pub struct HidApiDriver {
    api: Mutex<Option<HidApi>>,
}

impl HidApiDriver {
    pub fn new() -> Self {
        Self::default()
    }

    fn api(&self) -> MutexGuard<'_, Option<HidApi>> {
        self.api.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl HidDriver for HidApiDriver {
    fn name(&self) -> &'static str {
        "hidapi"
    }

    fn init(&self) -> Result<(), DriverError> {
        let api = HidApi::new_without_enumerate().map_err(map_err)?;
        *self.api() = Some(api);
        debug!("hidapi initialized");
        Ok(())
    }

    fn exit(&self) {
        if self.api().take().is_some() {
            debug!("hidapi released");
        }
    }

    fn enumerate(
        &self,
        vendor_id: u16,
        product_id: u16,
    ) -> Result<Vec<RawDeviceRecord>, DriverError> {
        let mut guard = self.api();
        let api = guard.as_mut().ok_or_else(not_initialized)?;
        api.refresh_devices().map_err(map_err)?;

        let records: Vec<RawDeviceRecord> = api
            .device_list()
            .filter(|info| {
                (vendor_id == 0 || info.vendor_id() == vendor_id)
                    && (product_id == 0 || info.product_id() == product_id)
            })
            .map(to_record)
            .collect();

        trace!("hidapi enumerated {} devices", records.len());
        Ok(records)
    }

    fn open_path(&self, path: &str) -> Result<Box<dyn NativeDevice>, DriverError> {
        let guard = self.api();
        let api = guard.as_ref().ok_or_else(not_initialized)?;
        let c_path = CString::new(path)
            .map_err(|_| DriverError::new("device path contains a NUL byte"))?;
        let device = api.open_path(&c_path).map_err(map_err)?;
        Ok(Box::new(HidApiDevice::new(device)))
    }

    fn open(
        &self,
        vendor_id: u16,
        product_id: u16,
        serial_number: Option<&str>,
    ) -> Result<Box<dyn NativeDevice>, DriverError> {
        let guard = self.api();
        let api = guard.as_ref().ok_or_else(not_initialized)?;
        let device = match serial_number {
            Some(serial) => api.open_serial(vendor_id, product_id, serial),
            None => api.open(vendor_id, product_id),
        }
        .map_err(map_err)?;
        Ok(Box::new(HidApiDevice::new(device)))
    }
}

fn to_record(info: &DeviceInfo) -> RawDeviceRecord {
    RawDeviceRecord {
        path: info.path().to_str().ok().map(str::to_string),
        vendor_id: info.vendor_id(),
        product_id: info.product_id(),
        serial_number: info.serial_number().map(NativeString::from),
        release_number: info.release_number(),
        manufacturer_string: info.manufacturer_string().map(NativeString::from),
        product_string: info.product_string().map(NativeString::from),
        usage_page: info.usage_page(),
        usage: info.usage(),
        interface_number: info.interface_number(),
    }
}

fn map_err(e: hidapi::HidError) -> DriverError {
    DriverError::new(e.to_string())
}

fn not_initialized() -> DriverError {
    DriverError::new("hidapi is not initialized")
}

/// An open hidapi device
struct HidApiDevice {
    device: Mutex<HidDevice>,
}

impl HidApiDevice {
    fn new(device: HidDevice) -> Self {
        Self {
            device: Mutex::new(device),
        }
    }

    fn device(&self) -> MutexGuard<'_, HidDevice> {
        self.device.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl NativeDevice for HidApiDevice {
    fn read_timeout(&self, buf: &mut [u8], timeout_ms: i32) -> Result<usize, DriverError> {
        self.device().read_timeout(buf, timeout_ms).map_err(map_err)
    }

    fn write(&self, data: &[u8]) -> Result<usize, DriverError> {
        self.device().write(data).map_err(map_err)
    }

    fn get_feature_report(&self, buf: &mut [u8]) -> Result<usize, DriverError> {
        self.device().get_feature_report(buf).map_err(map_err)
    }

    fn send_feature_report(&self, data: &[u8]) -> Result<usize, DriverError> {
        // hidapi reports success without a byte count
        self.device()
            .send_feature_report(data)
            .map(|()| data.len())
            .map_err(map_err)
    }

    fn set_nonblocking(&self, nonblocking: bool) -> Result<(), DriverError> {
        self.device()
            .set_blocking_mode(!nonblocking)
            .map_err(map_err)
    }

    fn manufacturer_string(&self) -> Result<Option<NativeString>, DriverError> {
        self.device()
            .get_manufacturer_string()
            .map(|s| s.map(NativeString::from))
            .map_err(map_err)
    }

    fn product_string(&self) -> Result<Option<NativeString>, DriverError> {
        self.device()
            .get_product_string()
            .map(|s| s.map(NativeString::from))
            .map_err(map_err)
    }

    fn serial_number_string(&self) -> Result<Option<NativeString>, DriverError> {
        self.device()
            .get_serial_number_string()
            .map(|s| s.map(NativeString::from))
            .map_err(map_err)
    }
}
