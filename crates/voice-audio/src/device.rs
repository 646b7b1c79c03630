use cpal::traits::{DeviceTrait, HostTrait};

/// An enumerable input device, as surfaced through a device picker in the
/// host UI.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct AudioDevice {
    pub id: String,
    pub name: String,
    pub is_default: bool,
}

pub fn list_devices() -> crate::Result<Vec<AudioDevice>> {
    let host = cpal::default_host();
    let default_device = host.default_input_device();
    let default_name = default_device.as_ref().and_then(|d| d.name().ok());

    let mut devices = Vec::new();
    for device in host.input_devices()? {
        let name = device.name().unwrap_or_else(|_| "Unknown".to_string());
        let is_default = default_name.as_ref() == Some(&name);
        devices.push(AudioDevice {
            id: name.clone(),
            name,
            is_default,
        });
    }

    Ok(devices)
}

pub fn get_default_device() -> crate::Result<Option<AudioDevice>> {
    let host = cpal::default_host();
    match host.default_input_device() {
        Some(device) => {
            let name = device.name().unwrap_or_else(|_| "Unknown".to_string());
            Ok(Some(AudioDevice {
                id: name.clone(),
                name,
                is_default: true,
            }))
        }
        None => Ok(None),
    }
}

pub fn find_device_by_id(id: &str) -> crate::Result<Option<AudioDevice>> {
    let devices = list_devices()?;
    Ok(devices.into_iter().find(|d| d.id == id))
}

pub(crate) fn resolve_input_device(device_id: Option<&str>) -> crate::Result<cpal::Device> {
    let host = cpal::default_host();
    match device_id {
        Some(id) => host
            .input_devices()?
            .find(|d| d.name().ok().as_deref() == Some(id))
            .ok_or_else(|| crate::AudioError::DeviceNotFound(id.to_string())),
        None => host
            .default_input_device()
            .ok_or_else(|| crate::AudioError::DeviceNotFound("default".to_string())),
    }
}

pub(crate) fn resolve_output_device(device_id: Option<&str>) -> crate::Result<cpal::Device> {
    let host = cpal::default_host();
    match device_id {
        Some(id) => host
            .output_devices()?
            .find(|d| d.name().ok().as_deref() == Some(id))
            .ok_or_else(|| crate::AudioError::DeviceNotFound(id.to_string())),
        None => host
            .default_output_device()
            .ok_or_else(|| crate::AudioError::DeviceNotFound("default".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_devices_does_not_error() {
        let devices = list_devices().unwrap();
        println!("found {} input devices", devices.len());
    }
}
