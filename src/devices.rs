//! Built-in device emulation presets
//!
//! The catalog is a fixed table assembled once at startup and shared
//! read-only between requests. Identifiers are matched case-insensitively.

use crate::config::Viewport;
use serde::Serialize;
use std::collections::HashMap;

const IPHONE_UA: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.0 Mobile/15E148 Safari/604.1";
const IPAD_UA: &str = "Mozilla/5.0 (iPad; CPU OS 17_0 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.0 Mobile/15E148 Safari/604.1";
const PIXEL_UA: &str = "Mozilla/5.0 (Linux; Android 14; Pixel 7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Mobile Safari/537.36";
const GALAXY_UA: &str = "Mozilla/5.0 (Linux; Android 13; SM-G991B) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Mobile Safari/537.36";

/// Viewport plus optional user agent emulating a known device
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DevicePreset {
    #[serde(flatten)]
    pub viewport: Viewport,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

impl DevicePreset {
    fn desktop(width: u32, height: u32, scale: f64) -> Self {
        Self {
            viewport: Viewport {
                device_scale_factor: scale,
                ..Viewport::desktop(width, height)
            },
            user_agent: None,
        }
    }

    fn mobile(width: u32, height: u32, scale: f64, user_agent: &str) -> Self {
        Self {
            viewport: Viewport {
                width,
                height,
                device_scale_factor: scale,
                is_mobile: true,
                has_touch: true,
            },
            user_agent: Some(user_agent.to_string()),
        }
    }
}

pub struct DeviceCatalog {
    presets: HashMap<String, DevicePreset>,
}

impl DeviceCatalog {
    /// The catalog shipped with the gateway.
    pub fn builtin() -> Self {
        Self::from_entries([
            ("desktop", DevicePreset::desktop(1280, 800, 1.0)),
            ("desktop-hd", DevicePreset::desktop(1920, 1080, 1.0)),
            ("laptop", DevicePreset::desktop(1366, 768, 1.0)),
            ("macbook-pro", DevicePreset::desktop(1440, 900, 2.0)),
            ("ipad", DevicePreset::mobile(768, 1024, 2.0, IPAD_UA)),
            ("ipad-pro", DevicePreset::mobile(1024, 1366, 2.0, IPAD_UA)),
            ("iphone-se", DevicePreset::mobile(375, 667, 2.0, IPHONE_UA)),
            ("iphone13", DevicePreset::mobile(390, 844, 3.0, IPHONE_UA)),
            ("iphone15-pro-max", DevicePreset::mobile(430, 932, 3.0, IPHONE_UA)),
            ("pixel7", DevicePreset::mobile(412, 915, 2.625, PIXEL_UA)),
            ("galaxy-s21", DevicePreset::mobile(360, 800, 3.0, GALAXY_UA)),
        ])
    }

    pub fn from_entries<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (S, DevicePreset)>,
        S: AsRef<str>,
    {
        let presets = entries
            .into_iter()
            .map(|(id, preset)| (id.as_ref().to_lowercase(), preset))
            .collect();
        Self { presets }
    }

    pub fn lookup(&self, identifier: &str) -> Option<&DevicePreset> {
        self.presets.get(&identifier.to_lowercase())
    }

    pub fn list_all(&self) -> impl Iterator<Item = (&str, &DevicePreset)> {
        self.presets.iter().map(|(id, preset)| (id.as_str(), preset))
    }

    /// Known identifiers, sorted for stable error messages.
    pub fn identifiers(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.presets.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.presets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.presets.is_empty()
    }
}

impl Default for DeviceCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}
