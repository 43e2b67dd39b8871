//! Localized phrasing for announcements and on-frame labels.
//!
//! French is the deployed language; English is used in development and
//! tests.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::zone::Zone;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    Fr,
    En,
}

impl Language {
    /// Spoken zone name.
    pub fn zone_name(self, zone: Zone) -> &'static str {
        match (self, zone) {
            (Language::Fr, Zone::Left) => "gauche",
            (Language::Fr, Zone::Center) => "milieu",
            (Language::Fr, Zone::Right) => "droite",
            (Language::En, Zone::Left) => "left",
            (Language::En, Zone::Center) => "center",
            (Language::En, Zone::Right) => "right",
        }
    }

    /// Zone suffix appended to an announcement when zone announcements are on.
    pub fn zone_suffix(self, zone: Zone) -> String {
        match self {
            Language::Fr => format!(" à {}", self.zone_name(zone)),
            Language::En => match zone {
                Zone::Center => " in the center".to_string(),
                _ => format!(" on the {}", self.zone_name(zone)),
            },
        }
    }

    pub fn no_objects(self) -> &'static str {
        match self {
            Language::Fr => "Aucun objet détecté",
            Language::En => "No objects detected",
        }
    }

    /// Label drawn in the zone band at the top of the frame.
    pub fn zone_label(self, zone: Zone) -> String {
        self.zone_name(zone).to_uppercase()
    }

    pub fn mirror_status(self, enabled: bool) -> &'static str {
        match (self, enabled) {
            (Language::Fr, true) => "Miroir: ON",
            (Language::Fr, false) => "Miroir: OFF",
            (Language::En, true) => "Mirror: ON",
            (Language::En, false) => "Mirror: OFF",
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            Language::Fr => "fr",
            Language::En => "en",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Language {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fr" | "fr-fr" | "french" => Ok(Language::Fr),
            "en" | "en-us" | "en-gb" | "english" => Ok(Language::En),
            other => Err(anyhow!("unsupported language '{}'", other)),
        }
    }
}
