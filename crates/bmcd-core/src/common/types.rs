//! # `bmcd.v1` wire types
//!
//! Hand-written prost messages for the `bmcd.v1.Machine` service. They are
//! wire compatible with the equivalent `.proto` definition:
//!
//! ```proto
//! service Machine {
//!   rpc Power(PowerRequest) returns (PowerResponse);
//!   rpc BootDevice(DeviceRequest) returns (DeviceResponse);
//! }
//! ```
//!
//! The service bindings themselves are generated by `build.rs` and live in
//! [`crate::proto`].
//!
//! Each request message implements [`Validate`] and [`RequestFields`] so the
//! server pipeline can reject malformed calls and tag log records without
//! knowing the concrete message type.

use crate::validate::{
    RequestFields, Validate, Violation, require_known, require_non_empty, require_non_negative,
};
use core::fmt;

/// Fully qualified gRPC method paths, as routed by the generated server.
pub mod methods {
    /// `Machine.Power`
    pub const POWER: &str = "/bmcd.v1.Machine/Power";
    /// `Machine.BootDevice`
    pub const BOOT_DEVICE: &str = "/bmcd.v1.Machine/BootDevice";
}

/// Credentials and address of the baseboard management controller to act on.
#[derive(Clone, PartialEq, prost::Message)]
#[prost(skip_debug)]
pub struct Authn {
    #[prost(string, tag = "1")]
    pub host: String,
    #[prost(string, tag = "2")]
    pub username: String,
    #[prost(string, tag = "3")]
    pub password: String,
}

// Credentials never reach logs, even through `{:?}`.
impl fmt::Debug for Authn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Authn")
            .field("host", &self.host)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl Validate for Authn {
    fn validate(&self) -> Result<(), Violation> {
        require_non_empty("authn.host", &self.host)?;
        require_non_empty("authn.username", &self.username)?;
        require_non_empty("authn.password", &self.password)
    }
}

fn require_authn(authn: Option<&Authn>) -> Result<(), Violation> {
    authn
        .ok_or_else(|| Violation::new("authn", "message must exist"))?
        .validate()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum PowerAction {
    Unspecified = 0,
    On = 1,
    Off = 2,
    Soft = 3,
    Reset = 4,
    Cycle = 5,
    Status = 6,
}

impl PowerAction {
    pub const fn as_str_name(&self) -> &'static str {
        match self {
            Self::Unspecified => "POWER_ACTION_UNSPECIFIED",
            Self::On => "POWER_ACTION_ON",
            Self::Off => "POWER_ACTION_OFF",
            Self::Soft => "POWER_ACTION_SOFT",
            Self::Reset => "POWER_ACTION_RESET",
            Self::Cycle => "POWER_ACTION_CYCLE",
            Self::Status => "POWER_ACTION_STATUS",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum BootDevice {
    Unspecified = 0,
    NoOverride = 1,
    Bios = 2,
    Disk = 3,
    Cdrom = 4,
    Pxe = 5,
}

impl BootDevice {
    pub const fn as_str_name(&self) -> &'static str {
        match self {
            Self::Unspecified => "BOOT_DEVICE_UNSPECIFIED",
            Self::NoOverride => "BOOT_DEVICE_NONE",
            Self::Bios => "BOOT_DEVICE_BIOS",
            Self::Disk => "BOOT_DEVICE_DISK",
            Self::Cdrom => "BOOT_DEVICE_CDROM",
            Self::Pxe => "BOOT_DEVICE_PXE",
        }
    }
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct PowerRequest {
    #[prost(message, optional, tag = "1")]
    pub authn: Option<Authn>,
    #[prost(enumeration = "PowerAction", tag = "2")]
    pub power_action: i32,
    /// Seconds to wait for a soft power off before giving up.
    #[prost(int32, tag = "3")]
    pub soft_timeout: i32,
    /// Seconds to stay off during a power cycle.
    #[prost(int32, tag = "4")]
    pub off_duration: i32,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct PowerResponse {
    #[prost(string, tag = "1")]
    pub task_id: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct DeviceRequest {
    #[prost(message, optional, tag = "1")]
    pub authn: Option<Authn>,
    #[prost(enumeration = "BootDevice", tag = "2")]
    pub boot_device: i32,
    #[prost(bool, tag = "3")]
    pub persistent: bool,
    #[prost(bool, tag = "4")]
    pub efi_boot: bool,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct DeviceResponse {
    #[prost(string, tag = "1")]
    pub task_id: String,
}

impl Validate for PowerRequest {
    fn validate(&self) -> Result<(), Violation> {
        require_authn(self.authn.as_ref())?;
        require_known::<PowerAction>("power_action", self.power_action)?;
        require_non_negative("soft_timeout", self.soft_timeout)?;
        require_non_negative("off_duration", self.off_duration)
    }
}

impl RequestFields for PowerRequest {
    fn request_fields(&self) -> Vec<(&'static str, String)> {
        let mut fields = Vec::with_capacity(2);
        if let Some(authn) = &self.authn {
            fields.push(("host", authn.host.clone()));
        }
        if let Ok(action) = PowerAction::try_from(self.power_action) {
            fields.push(("power_action", action.as_str_name().to_string()));
        }
        fields
    }
}

impl Validate for DeviceRequest {
    fn validate(&self) -> Result<(), Violation> {
        require_authn(self.authn.as_ref())?;
        require_known::<BootDevice>("boot_device", self.boot_device)?;
        Ok(())
    }
}

impl RequestFields for DeviceRequest {
    fn request_fields(&self) -> Vec<(&'static str, String)> {
        let mut fields = Vec::with_capacity(2);
        if let Some(authn) = &self.authn {
            fields.push(("host", authn.host.clone()));
        }
        if let Ok(device) = BootDevice::try_from(self.boot_device) {
            fields.push(("boot_device", device.as_str_name().to_string()));
        }
        fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn authn() -> Authn {
        Authn {
            host: "10.0.0.7".to_string(),
            username: "admin".to_string(),
            password: "hunter2".to_string(),
        }
    }

    fn power(action: PowerAction) -> PowerRequest {
        PowerRequest {
            authn: Some(authn()),
            power_action: action as i32,
            ..Default::default()
        }
    }

    #[test]
    fn accepts_well_formed_power_request() {
        assert_eq!(power(PowerAction::Cycle).validate(), Ok(()));
    }

    #[test]
    fn rejects_missing_authn() {
        let req = PowerRequest {
            authn: None,
            power_action: PowerAction::On as i32,
            ..Default::default()
        };
        let err = req.validate().unwrap_err();
        assert_eq!(err.field(), "authn");
    }

    #[test]
    fn rejects_empty_credentials() {
        let mut req = power(PowerAction::On);
        req.authn.as_mut().unwrap().password.clear();
        assert_eq!(req.validate().unwrap_err().field(), "authn.password");

        let mut req = power(PowerAction::On);
        req.authn.as_mut().unwrap().host.clear();
        assert_eq!(req.validate().unwrap_err().field(), "authn.host");
    }

    #[test]
    fn rejects_unspecified_and_unknown_actions() {
        let err = power(PowerAction::Unspecified).validate().unwrap_err();
        assert_eq!(err.field(), "power_action");
        assert_eq!(err.reason(), "value must be specified");

        let mut req = power(PowerAction::On);
        req.power_action = 42;
        let err = req.validate().unwrap_err();
        assert_eq!(err.reason(), "unknown enum value 42");
    }

    #[test]
    fn rejects_negative_durations() {
        let mut req = power(PowerAction::Soft);
        req.soft_timeout = -1;
        assert_eq!(req.validate().unwrap_err().field(), "soft_timeout");
    }

    #[test]
    fn device_request_requires_a_boot_device() {
        let req = DeviceRequest {
            authn: Some(authn()),
            boot_device: BootDevice::Unspecified as i32,
            ..Default::default()
        };
        assert_eq!(req.validate().unwrap_err().field(), "boot_device");

        let req = DeviceRequest {
            boot_device: BootDevice::Pxe as i32,
            ..req
        };
        assert_eq!(req.validate(), Ok(()));
    }

    #[test]
    fn request_fields_never_expose_credentials() {
        let fields = power(PowerAction::Off).request_fields();
        assert_eq!(
            fields,
            vec![
                ("host", "10.0.0.7".to_string()),
                ("power_action", "POWER_ACTION_OFF".to_string()),
            ]
        );
        assert!(!format!("{:?}", authn()).contains("hunter2"));
    }
}
