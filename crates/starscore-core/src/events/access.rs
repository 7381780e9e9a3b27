use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::geo::GeoLocation;
use crate::time::to_beijing;

const UNKNOWN: &str = "Unknown";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    #[default]
    Desktop,
    Mobile,
    Tablet,
}

impl DeviceType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Desktop => "desktop",
            Self::Mobile => "mobile",
            Self::Tablet => "tablet",
        }
    }

    /// Unrecognized values fall back to desktop.
    #[must_use]
    pub fn parse(value: &str) -> Self {
        match value {
            "mobile" => Self::Mobile,
            "tablet" => Self::Tablet,
            _ => Self::Desktop,
        }
    }
}

/// Device facets parsed out of a user-agent string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub device_type: DeviceType,
    pub browser: String,
    pub os: String,
    pub is_mobile: bool,
}

impl DeviceInfo {
    /// Substring heuristics; anything not recognized is reported as `Unknown`.
    #[must_use]
    pub fn parse(user_agent: &str) -> Self {
        let has = |needle: &str| user_agent.contains(needle);

        let is_mobile = ["Mobile", "Android", "iPhone", "iPad"]
            .iter()
            .any(|needle| user_agent.contains(needle));
        let is_tablet = has("iPad") || has("Tablet");
        let device_type = if is_tablet {
            DeviceType::Tablet
        } else if is_mobile {
            DeviceType::Mobile
        } else {
            DeviceType::Desktop
        };

        // Edge and Chrome both advertise "Chrome"; Chrome also advertises "Safari".
        let browser = if has("Edg/") || has("Edge/") {
            "Edge"
        } else if has("Chrome") || has("CriOS") {
            "Chrome"
        } else if has("Firefox") || has("FxiOS") {
            "Firefox"
        } else if has("Safari") {
            "Safari"
        } else {
            UNKNOWN
        };

        let os = if has("Windows") {
            "Windows"
        } else if has("Android") {
            "Android"
        } else if has("iPhone") || has("iPad") || has("iPod") {
            "iOS"
        } else if has("Mac") {
            "macOS"
        } else if has("Linux") {
            "Linux"
        } else {
            UNKNOWN
        };

        Self {
            device_type,
            browser: browser.to_string(),
            os: os.to_string(),
            is_mobile,
        }
    }
}

/// Campaign parameters carried on the referrer URL.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UtmParams {
    pub utm_source: Option<String>,
    pub utm_medium: Option<String>,
}

impl UtmParams {
    /// Malformed or relative referrers yield no parameters.
    #[must_use]
    pub fn from_referrer(referrer: &str) -> Self {
        let Ok(url) = url::Url::parse(referrer) else {
            return Self::default();
        };
        let param = |name: &str| {
            url.query_pairs()
                .find(|(key, _)| key == name)
                .map(|(_, value)| value.into_owned())
        };
        Self {
            utm_source: param("utm_source"),
            utm_medium: param("utm_medium"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExitType {
    Bounce,
    Error,
    Normal,
}

impl ExitType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bounce => "bounce",
            Self::Error => "error",
            Self::Normal => "normal",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "bounce" => Some(Self::Bounce),
            "error" => Some(Self::Error),
            "normal" => Some(Self::Normal),
            _ => None,
        }
    }
}

/// One client-side interaction, in the order it happened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserAction {
    pub action: String,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub data: Value,
}

/// Engagement metrics reported by the client after the visit started.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Engagement {
    /// Seconds.
    pub time_on_page: Option<f64>,
    #[serde(default)]
    pub actions: Vec<UserAction>,
    pub exit_type: Option<ExitType>,
    /// Seconds.
    pub page_load_time: Option<f64>,
}

/// Extra data known when a visit is first recorded.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VisitContext {
    pub referrer: Option<String>,
    pub page_load_time: Option<f64>,
    #[serde(default)]
    pub actions: Vec<UserAction>,
    pub screen_resolution: Option<String>,
    pub viewport_size: Option<String>,
    pub language: Option<String>,
    pub timezone: Option<String>,
}

/// An access event that has not been persisted yet.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Visit {
    pub session_id: String,
    pub user_ip: String,
    pub user_agent: String,
    #[serde(flatten)]
    pub device: DeviceInfo,
    pub referrer: Option<String>,
    #[serde(flatten)]
    pub utm: UtmParams,
    pub location: GeoLocation,
    #[serde(flatten)]
    pub engagement: Engagement,
    pub screen_resolution: Option<String>,
    pub viewport_size: Option<String>,
    pub language: Option<String>,
    pub timezone: Option<String>,
    pub beijing_time: DateTime<FixedOffset>,
}

impl Visit {
    #[must_use]
    pub fn new(
        address: &str,
        user_agent: &str,
        session_id: &str,
        context: VisitContext,
        location: GeoLocation,
        at: DateTime<Utc>,
    ) -> Self {
        let utm = context
            .referrer
            .as_deref()
            .map(UtmParams::from_referrer)
            .unwrap_or_default();

        Self {
            session_id: session_id.to_string(),
            user_ip: address.to_string(),
            user_agent: user_agent.to_string(),
            device: DeviceInfo::parse(user_agent),
            referrer: context.referrer,
            utm,
            location,
            engagement: Engagement {
                time_on_page: None,
                actions: context.actions,
                exit_type: None,
                page_load_time: context.page_load_time,
            },
            screen_resolution: context.screen_resolution,
            viewport_size: context.viewport_size,
            language: context.language,
            timezone: context.timezone,
            beijing_time: to_beijing(at),
        }
    }
}

/// A persisted visit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccessEvent {
    pub id: Uuid,
    #[serde(flatten)]
    pub visit: Visit,
    pub created_at: DateTime<Utc>,
}
