pub mod adb;
pub mod app;
pub mod builder;
pub mod device;

pub use app::{AndroidApp, AppStore};
pub use builder::{AppBuilder, PrebuiltBuilder};
pub use device::{AndroidError, DeviceHandle, DeviceRecord, EmulatorLaunch};
