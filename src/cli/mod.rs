//! Command-line device selection helpers for the demo binary.
//!
//! Mirrors the source project's `cli` module: listing available MIDI
//! devices and validating/resolving the caller's `--device` choice,
//! including an interactive picker when the choice is ambiguous.

use dialoguer::Select;

/// Prints the available device names to stdout, numbered for reference.
pub fn list_devices(devices: &[String]) {
    if devices.is_empty() {
        println!("No MIDI devices available.");
        return;
    }
    for (i, name) in devices.iter().enumerate() {
        println!("{i}: {name}");
    }
}

/// Resolves a device name from an explicit `--device` argument, or, when
/// none was given and more than one device is available, prompts the user
/// with an interactive picker. Returns `None` if there is nothing to pick
/// from.
pub fn resolve_device(requested: Option<&str>, devices: &[String]) -> Option<String> {
    if let Some(name) = requested {
        return devices.iter().find(|d| d.as_str() == name).cloned();
    }
    match devices.len() {
        0 => None,
        1 => Some(devices[0].clone()),
        _ => {
            let choice = Select::new()
                .with_prompt("Select a MIDI device")
                .items(devices)
                .default(0)
                .interact_opt()
                .ok()
                .flatten();
            choice.map(|i| devices[i].clone())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_device_matches_explicit_name() {
        let devices = vec!["IAC Bus 1".to_string(), "IAC Bus 2".to_string()];
        assert_eq!(
            resolve_device(Some("IAC Bus 2"), &devices),
            Some("IAC Bus 2".to_string())
        );
    }

    #[test]
    fn resolve_device_auto_selects_only_option() {
        let devices = vec!["IAC Bus 1".to_string()];
        assert_eq!(resolve_device(None, &devices), Some("IAC Bus 1".to_string()));
    }

    #[test]
    fn resolve_device_returns_none_when_nothing_available() {
        assert_eq!(resolve_device(None, &[]), None);
    }
}
