//! User-facing settings carried inside the synchronized document

use serde::{Deserialize, Serialize};

/// Settings block of the app state.
///
/// Each nested struct defaults field by field, so a document written before a
/// setting existed still decodes with the newer default filled in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub notifications: NotificationSettings,
    pub appearance: AppearanceSettings,
    pub localization: LocalizationSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationSettings {
    pub email: bool,
    pub push: bool,
    pub maintenance: bool,
    pub payments: bool,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            email: true,
            push: true,
            maintenance: true,
            payments: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AppearanceSettings {
    pub density: Density,
    pub animations: bool,
    pub glass_effect: bool,
}

impl Default for AppearanceSettings {
    fn default() -> Self {
        Self {
            density: Density::Comfortable,
            animations: true,
            glass_effect: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Density {
    #[default]
    Comfortable,
    Compact,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LocalizationSettings {
    pub currency: Currency,
    pub date_format: DateFormat,
}

/// Display currency. Amounts are stored in NGN and converted on display.
#[allow(clippy::upper_case_acronyms)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Currency {
    #[default]
    NGN,
    USD,
    EUR,
}

impl Currency {
    /// Multiplier applied to an NGN amount.
    pub fn rate_from_ngn(self) -> f64 {
        match self {
            Self::NGN => 1.0,
            Self::USD => 0.00065,
            Self::EUR => 0.0006,
        }
    }

    pub fn fraction_digits(self) -> usize {
        match self {
            Self::NGN => 0,
            Self::USD | Self::EUR => 2,
        }
    }

    /// Symbol used by en-US formatting.
    pub fn symbol(self) -> &'static str {
        match self {
            Self::NGN => "NGN\u{a0}",
            Self::USD => "$",
            Self::EUR => "€",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DateFormat {
    #[default]
    #[serde(rename = "DD/MM/YYYY")]
    DayMonthYear,
    #[serde(rename = "MM/DD/YYYY")]
    MonthDayYear,
}
