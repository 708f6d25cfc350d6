// Device resolution
//
// Matching policy: the first device, in the order the host enumerates
// them, whose name contains the pattern case-insensitively and which
// reports at least one channel in the requested direction. Results are
// never re-sorted and never cached between calls.

use serde::Serialize;
use tracing::{debug, info};

use super::backend::{AudioBackend, AudioDevice};
use crate::error::{DeviceRole, RecorderError, RecorderResult};

/// The input/output pair a session is bound to.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DevicePair {
    pub input: AudioDevice,
    pub output: AudioDevice,
}

/// Which roles of the target pattern the host currently offers.
///
/// Unlike [`DeviceResolver::resolve`], a missing role is reported rather
/// than treated as an error.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TargetPresence {
    pub pattern: String,
    /// At least one role is present
    pub connected: bool,
    pub input_device: Option<AudioDevice>,
    pub output_device: Option<AudioDevice>,
}

/// Caller-supplied device choice: an enumeration index or a name fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceSelector {
    Index(usize),
    Name(String),
}

impl DeviceSelector {
    pub fn parse(hint: &str) -> Self {
        let hint = hint.trim();
        match hint.parse::<usize>() {
            Ok(index) => DeviceSelector::Index(index),
            Err(_) => DeviceSelector::Name(hint.to_string()),
        }
    }
}

impl std::fmt::Display for DeviceSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceSelector::Index(index) => write!(f, "#{index}"),
            DeviceSelector::Name(name) => write!(f, "{name}"),
        }
    }
}

/// Whether a device can serve the given direction.
pub fn supports(device: &AudioDevice, role: DeviceRole) -> bool {
    match role {
        DeviceRole::Input => device.input_channels > 0,
        DeviceRole::Output => device.output_channels > 0,
    }
}

/// First device whose name contains `pattern` (case-insensitive) and supports `role`.
pub fn find_device<'a>(
    devices: &'a [AudioDevice],
    pattern: &str,
    role: DeviceRole,
) -> Option<&'a AudioDevice> {
    let needle = pattern.to_lowercase();
    devices
        .iter()
        .find(|d| d.name.to_lowercase().contains(&needle) && supports(d, role))
}

fn select<'a>(
    devices: &'a [AudioDevice],
    selector: &DeviceSelector,
    role: DeviceRole,
) -> RecorderResult<&'a AudioDevice> {
    let found = match selector {
        DeviceSelector::Index(index) => devices
            .iter()
            .find(|d| d.id == *index)
            .filter(|d| supports(d, role)),
        DeviceSelector::Name(name) => find_device(devices, name, role),
    };

    found.ok_or_else(|| RecorderError::DeviceNotFound {
        pattern: selector.to_string(),
        role,
    })
}

/// Locates the hardware pair for a session.
pub struct DeviceResolver<'a> {
    backend: &'a dyn AudioBackend,
}

impl<'a> DeviceResolver<'a> {
    pub fn new(backend: &'a dyn AudioBackend) -> Self {
        Self { backend }
    }

    /// Fresh enumeration with `is_target` set on names matching `pattern`.
    pub fn enumerate(&self, pattern: &str) -> RecorderResult<Vec<AudioDevice>> {
        let needle = pattern.to_lowercase();
        let mut devices = self.backend.devices()?;
        for device in &mut devices {
            device.is_target = !needle.is_empty() && device.name.to_lowercase().contains(&needle);
        }
        debug!("Enumerated {} devices via {}", devices.len(), self.backend.name());
        Ok(devices)
    }

    /// Look up each role of `pattern` independently.
    pub fn presence(&self, pattern: &str) -> RecorderResult<TargetPresence> {
        let devices = self.enumerate(pattern)?;
        let input_device = find_device(&devices, pattern, DeviceRole::Input).cloned();
        let output_device = find_device(&devices, pattern, DeviceRole::Output).cloned();

        Ok(TargetPresence {
            pattern: pattern.to_string(),
            connected: input_device.is_some() || output_device.is_some(),
            input_device,
            output_device,
        })
    }

    /// Resolve both roles against `pattern`.
    pub fn resolve(&self, pattern: &str) -> RecorderResult<DevicePair> {
        self.resolve_with(pattern, None, None)
    }

    /// Resolve both roles, letting explicit selectors override the pattern.
    pub fn resolve_with(
        &self,
        pattern: &str,
        input: Option<&DeviceSelector>,
        output: Option<&DeviceSelector>,
    ) -> RecorderResult<DevicePair> {
        let devices = self.enumerate(pattern)?;
        let by_pattern = DeviceSelector::Name(pattern.to_string());

        let input = select(&devices, input.unwrap_or(&by_pattern), DeviceRole::Input)?.clone();
        let output = select(&devices, output.unwrap_or(&by_pattern), DeviceRole::Output)?.clone();

        info!(
            "Resolved devices: input='{}' (#{}), output='{}' (#{})",
            input.name, input.id, output.name, output.id
        );

        Ok(DevicePair { input, output })
    }
}
