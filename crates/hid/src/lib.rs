//! Asynchronous access to USB HID devices
//!
//! Native HID calls block. This crate runs them off the async executor while
//! keeping per-device ordering: every open device owns a FIFO job queue that
//! executes one operation at a time on tokio's blocking pool. Input reports
//! can also be streamed from a cancellable background poll loop.
//!
//! # Architecture
//!
//! ```text
//! HidContext ──open/enumerate queue──► Subsystem (driver init/exit, enumerate lock)
//!     │
//!     └── DeviceHandle ──job queue──► NativeDevice
//!              └── Poller ──thread──► ReportStream<PollEvent>
//! ```
//!
//! # Example
//!
//! ```no_run
//! use hid_async::{HidContext, PollEvent};
//!
//! # async fn run() -> Result<(), hid_async::HidError> {
//! let ctx = HidContext::new()?;
//! for desc in ctx.devices(Some((0x046d, 0))).await? {
//!     println!("{:04x}:{:04x} {:?}", desc.vendor_id, desc.product_id, desc.path);
//! }
//!
//! let device = ctx.open(0x046d, 0xc52b, None).await?;
//! device.write(vec![0x00, 0x10, 0xff]).await?;
//!
//! let events = device.start_polling()?;
//! while let Some(event) = events.recv().await {
//!     match event {
//!         PollEvent::Report(report) => println!("{:02x?}", report),
//!         PollEvent::Error(e) => eprintln!("{}", e),
//!     }
//! }
//! device.close().await?;
//! # Ok(())
//! # }
//! ```

pub mod blocking;
pub mod config;
pub mod context;
pub mod device;
pub mod driver;
pub mod enumerate;
pub mod operation;
pub mod poll;
pub mod queue;
pub mod subsystem;
pub mod test_utils;

pub use blocking::BlockingDevice;
pub use config::{DeviceSettings, HidConfig, LoggingSettings};
pub use context::HidContext;
pub use device::DeviceHandle;
pub use driver::{BLOCK_FOREVER, DriverError, HidDriver, NativeDevice};
pub use operation::OperationFuture;
pub use poll::{PollEvent, PollStatus};
pub use queue::{JobFuture, JobQueue};
pub use subsystem::{Subsystem, SubsystemRegistry};
pub use types::{
    DeviceDescriptor, DeviceStrings, ErrorKind, HidError, NativeString, OpenTarget, Result,
};

#[cfg(feature = "hidapi")]
pub use subsystem::global_registry;
