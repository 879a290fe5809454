use serde_json::{Map, Value, json};
use thiserror::Error;

use crate::model::{MAX_COLORS, MIN_COLORS};

pub const RESOURCE_MACHINE: &str = "/machine";
pub const RESOURCE_CURSOR: &str = "/cursor";
pub const RESOURCE_QUEUE: &str = "/queue";
pub const RESOURCE_PLATFORM: &str = "/platform";

/// A POST the daemon understands: target resource plus JSON payload.
pub trait DaemonAction {
    fn resource(&self) -> &'static str;
    fn payload(&self) -> Value;
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActionError {
    #[error("colors must be between {min} and {max}, got {0}", min = MIN_COLORS, max = MAX_COLORS)]
    InvalidColors(u8),
    #[error("pattern width must be greater than zero")]
    InvalidWidth,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CursorAction {
    pub position: u64,
    /// Snap to the start of the entry under `position` instead of the raw offset.
    pub boundary: bool,
}

impl DaemonAction for CursorAction {
    fn resource(&self) -> &'static str {
        RESOURCE_CURSOR
    }

    fn payload(&self) -> Value {
        let mut payload = Map::new();
        payload.insert("setPosition".to_string(), json!(self.position));
        if self.boundary {
            payload.insert("boundary".to_string(), Value::Bool(true));
        }
        Value::Object(payload)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueAction {
    AddFile { file_path: String, web_url: String },
    RemoveFile { index: usize, delete: bool },
}

impl DaemonAction for QueueAction {
    fn resource(&self) -> &'static str {
        RESOURCE_QUEUE
    }

    fn payload(&self) -> Value {
        match self {
            Self::AddFile { file_path, web_url } => json!({
                "addFile": file_path,
                "webURL": web_url,
            }),
            Self::RemoveFile { index, delete } => {
                let mut payload = Map::new();
                payload.insert("removeFile".to_string(), json!(index));
                if *delete {
                    payload.insert("delete".to_string(), Value::Bool(true));
                }
                Value::Object(payload)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MachineParams {
    width: u32,
    ribber: bool,
    colors: u8,
}

impl MachineParams {
    pub fn new(width: u32, ribber: bool, colors: u8) -> Result<Self, ActionError> {
        if width == 0 {
            return Err(ActionError::InvalidWidth);
        }
        if !(MIN_COLORS..=MAX_COLORS).contains(&colors) {
            return Err(ActionError::InvalidColors(colors));
        }
        Ok(Self {
            width,
            ribber,
            colors,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MachineAction {
    Restart,
    SetParams(MachineParams),
}

impl DaemonAction for MachineAction {
    fn resource(&self) -> &'static str {
        RESOURCE_MACHINE
    }

    fn payload(&self) -> Value {
        match self {
            Self::Restart => json!({ "restart": true }),
            Self::SetParams(params) => json!({
                "setWidth": params.width,
                "setRibber": params.ribber,
                "setColors": params.colors,
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlatformAction {
    Restart,
    Shutdown,
}

impl DaemonAction for PlatformAction {
    fn resource(&self) -> &'static str {
        RESOURCE_PLATFORM
    }

    fn payload(&self) -> Value {
        match self {
            Self::Restart => json!({ "restart": true }),
            Self::Shutdown => json!({ "shutdown": true }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursor_payload_only_flags_boundary_when_set() {
        let raw = CursorAction {
            position: 77,
            boundary: false,
        };
        assert_eq!(raw.payload(), json!({"setPosition": 77}));
        assert_eq!(raw.resource(), RESOURCE_CURSOR);

        let snapped = CursorAction {
            position: 77,
            boundary: true,
        };
        assert_eq!(
            snapped.payload(),
            json!({"setPosition": 77, "boundary": true})
        );
    }

    #[test]
    fn queue_payloads_match_daemon_keys() {
        assert_eq!(
            QueueAction::RemoveFile {
                index: 2,
                delete: true
            }
            .payload(),
            json!({"removeFile": 2, "delete": true})
        );
        assert_eq!(
            QueueAction::RemoveFile {
                index: 0,
                delete: false
            }
            .payload(),
            json!({"removeFile": 0})
        );
        assert_eq!(
            QueueAction::AddFile {
                file_path: "/srv/imgs/a.png".to_string(),
                web_url: "/imgs/a.png".to_string(),
            }
            .payload(),
            json!({"addFile": "/srv/imgs/a.png", "webURL": "/imgs/a.png"})
        );
    }

    #[test]
    fn machine_params_validate_color_range() {
        assert_eq!(
            MachineParams::new(40, false, 1),
            Err(ActionError::InvalidColors(1))
        );
        assert_eq!(
            MachineParams::new(40, false, 5),
            Err(ActionError::InvalidColors(5))
        );
        assert_eq!(
            MachineParams::new(0, false, 2),
            Err(ActionError::InvalidWidth)
        );

        let params = MachineParams::new(40, true, 4).expect("valid params");
        assert_eq!(
            MachineAction::SetParams(params).payload(),
            json!({"setWidth": 40, "setRibber": true, "setColors": 4})
        );
    }

    #[test]
    fn platform_actions_target_platform_resource() {
        assert_eq!(PlatformAction::Shutdown.resource(), RESOURCE_PLATFORM);
        assert_eq!(
            PlatformAction::Shutdown.payload(),
            json!({"shutdown": true})
        );
        assert_eq!(PlatformAction::Restart.payload(), json!({"restart": true}));
        assert_eq!(MachineAction::Restart.payload(), json!({"restart": true}));
    }
}
