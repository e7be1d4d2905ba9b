use anyhow::Context;
use cpal::traits::{DeviceTrait, HostTrait};
use cpal::{Device, SupportedStreamConfig};

fn get_host() -> cpal::Host {
    cpal::default_host()
}

/// Looks up an input device by name, or the host's default input when no
/// name is given. `Ok(None)` means the host has no such device.
pub fn find_input(device_name: Option<&str>) -> anyhow::Result<Option<Device>> {
    let host = get_host();
    tracing::debug!("Host: {:?}", host.id());
    let Some(target) = device_name else {
        return Ok(host.default_input_device());
    };
    let mut input_devices = host
        .input_devices()
        .context("Failed to enumerate input devices")?;
    Ok(input_devices.find(|d| d.name().is_ok_and(|name| name == target)))
}

/// Same as [`find_input`], for output devices.
pub fn find_output(device_name: Option<&str>) -> anyhow::Result<Option<Device>> {
    let host = get_host();
    let Some(target) = device_name else {
        return Ok(host.default_output_device());
    };
    let mut output_devices = host
        .output_devices()
        .context("Failed to enumerate output devices")?;
    Ok(output_devices.find(|d| d.name().is_ok_and(|name| name == target)))
}

/// Picks an output config that runs at exactly `sample_rate`, if the device
/// offers one.
pub fn output_config_at(device: &Device, sample_rate: u32) -> Option<SupportedStreamConfig> {
    let rate = cpal::SampleRate(sample_rate);
    device
        .supported_output_configs()
        .ok()?
        .filter(|range| range.sample_format() == cpal::SampleFormat::F32)
        .find(|range| range.min_sample_rate() <= rate && rate <= range.max_sample_rate())
        .map(|range| range.with_sample_rate(rate))
}

fn describe(device: &Device, config: anyhow::Result<SupportedStreamConfig>, default: &str) -> String {
    let name = device.name().unwrap_or_else(|_| "<unnamed>".to_string());
    let mut d = match config {
        Ok(cfg) => format!(" * {}({}ch, {}hz)", name, cfg.channels(), cfg.sample_rate().0),
        Err(_) => format!(" * {}(no default config)", name),
    };
    if name == default {
        d.push_str(" [default]");
    }
    d
}

/// One line per input device, marking the default.
pub fn get_available_inputs() -> anyhow::Result<String> {
    for host in cpal::available_hosts() {
        tracing::debug!("Available host: {:?}", host);
    }
    let host = get_host();
    let default_device = host
        .default_input_device()
        .and_then(|d| d.name().ok())
        .unwrap_or_default();
    let input_devices = host
        .input_devices()
        .context("Failed to enumerate input devices")?;
    let device_names: Vec<String> = input_devices
        .map(|d| {
            let cfg = d.default_input_config().map_err(anyhow::Error::from);
            describe(&d, cfg, &default_device)
        })
        .collect();
    Ok(device_names.join("\n"))
}

/// One line per output device, marking the default.
pub fn get_available_outputs() -> anyhow::Result<String> {
    let host = get_host();
    let default_device = host
        .default_output_device()
        .and_then(|d| d.name().ok())
        .unwrap_or_default();
    let output_devices = host
        .output_devices()
        .context("Failed to enumerate output devices")?;
    let device_names: Vec<String> = output_devices
        .map(|d| {
            let cfg = d.default_output_config().map_err(anyhow::Error::from);
            describe(&d, cfg, &default_device)
        })
        .collect();
    Ok(device_names.join("\n"))
}
