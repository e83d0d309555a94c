use std::collections::HashMap;
use std::env;

use chrono::NaiveDate;
use tracing::warn;

/// Service types the booking platform sells. The wire format is
/// SCREAMING_SNAKE_CASE to match the reference data stored alongside
/// each service record.
pub const KNOWN_SERVICE_TYPES: [&str; 5] = [
    "QUICK_STAMP_LOCAL",
    "STANDARD_NOTARY",
    "EXTENDED_HOURS",
    "LOAN_SIGNING",
    "RON_SERVICES",
];

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub supabase_jwt_secret: String,

    pub calendar_api_base_url: String,
    pub calendar_api_key: String,
    pub calendar_timeout_secs: u64,
    /// Per-service external calendar ids, keyed by service type.
    pub calendar_ids: HashMap<String, String>,

    pub scheduling: SchedulingConfig,
    pub automation: AutomationConfig,
}

/// Knobs that shape slot generation and conflict exclusion.
#[derive(Debug, Clone)]
pub struct SchedulingConfig {
    /// Offset of the business timezone from UTC, in hours.
    pub business_utc_offset_hours: i32,
    pub business_open_hour: u32,
    pub business_close_hour: u32,
    pub slot_interval_minutes: i64,
    /// Idle time required on both sides of a held booking window.
    pub slot_buffer_minutes: i64,
    pub min_lead_time_hours: i64,
    pub max_advance_booking_days: i64,
    pub availability_cache_ttl_secs: u64,
    pub availability_cache_capacity: usize,
    /// Dates with no bookable slots at all (closures).
    pub blackout_dates: Vec<NaiveDate>,
    /// Bookable dates that carry the holiday surcharge.
    pub holiday_dates: Vec<NaiveDate>,
}

/// Policy switches for time- and event-driven status automation.
#[derive(Debug, Clone)]
pub struct AutomationConfig {
    /// When false (the default) a missed appointment only *suggests*
    /// the no-show status; staff must apply it.
    pub auto_apply_no_show: bool,
    pub no_show_grace_minutes: i64,
    /// Confirmed bookings are promoted to scheduled once the
    /// appointment is within this window.
    pub schedule_promotion_window_hours: i64,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let config = Self {
            supabase_url: env_or_warn("SUPABASE_URL"),
            supabase_anon_key: env_or_warn("SUPABASE_ANON_PUBLIC_KEY"),
            supabase_jwt_secret: env_or_warn("SUPABASE_JWT_SECRET"),
            calendar_api_base_url: env::var("CALENDAR_API_BASE_URL")
                .unwrap_or_else(|_| "https://services.leadconnectorhq.com".to_string()),
            calendar_api_key: env_or_warn("CALENDAR_API_KEY"),
            calendar_timeout_secs: env_number("CALENDAR_TIMEOUT_SECS", 5),
            calendar_ids: calendar_ids_from_env(),
            scheduling: SchedulingConfig::from_env(),
            automation: AutomationConfig::from_env(),
        };

        if !config.is_configured() {
            warn!("Application not fully configured - missing environment variables");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        !self.supabase_url.is_empty()
            && !self.supabase_anon_key.is_empty()
            && !self.supabase_jwt_secret.is_empty()
    }

    pub fn is_calendar_configured(&self) -> bool {
        !self.calendar_api_base_url.is_empty() && !self.calendar_api_key.is_empty()
    }

    /// External calendar id mapped to a service type, if any. There is
    /// deliberately no default calendar: an unmapped service is a
    /// configuration error the caller must surface.
    pub fn calendar_id_for(&self, service_type: &str) -> Option<&str> {
        self.calendar_ids.get(service_type).map(String::as_str)
    }
}

impl SchedulingConfig {
    fn from_env() -> Self {
        Self {
            business_utc_offset_hours: env_number("BUSINESS_UTC_OFFSET_HOURS", -6),
            business_open_hour: env_number("BUSINESS_OPEN_HOUR", 9),
            business_close_hour: env_number("BUSINESS_CLOSE_HOUR", 17),
            slot_interval_minutes: env_number("SLOT_INTERVAL_MINUTES", 60),
            slot_buffer_minutes: env_number("MIN_APPOINTMENT_GAP_MINUTES", 15),
            min_lead_time_hours: env_number("MINIMUM_LEAD_TIME_HOURS", 2),
            max_advance_booking_days: env_number("MAX_ADVANCE_BOOKING_DAYS", 90),
            availability_cache_ttl_secs: env_number("AVAILABILITY_CACHE_TTL_SECS", 300),
            availability_cache_capacity: env_number("AVAILABILITY_CACHE_CAPACITY", 256),
            blackout_dates: dates_from_env("BLACKOUT_DATES"),
            holiday_dates: dates_from_env("HOLIDAY_DATES"),
        }
    }
}

impl Default for SchedulingConfig {
    fn default() -> Self {
        Self {
            business_utc_offset_hours: -6,
            business_open_hour: 9,
            business_close_hour: 17,
            slot_interval_minutes: 60,
            slot_buffer_minutes: 15,
            min_lead_time_hours: 2,
            max_advance_booking_days: 90,
            availability_cache_ttl_secs: 300,
            availability_cache_capacity: 256,
            blackout_dates: Vec::new(),
            holiday_dates: Vec::new(),
        }
    }
}

impl AutomationConfig {
    fn from_env() -> Self {
        Self {
            auto_apply_no_show: env_bool("AUTO_APPLY_NO_SHOW", false),
            no_show_grace_minutes: env_number("NO_SHOW_GRACE_MINUTES", 30),
            schedule_promotion_window_hours: env_number("SCHEDULE_PROMOTION_WINDOW_HOURS", 24),
        }
    }
}

impl Default for AutomationConfig {
    fn default() -> Self {
        Self {
            auto_apply_no_show: false,
            no_show_grace_minutes: 30,
            schedule_promotion_window_hours: 24,
        }
    }
}

fn env_or_warn(key: &str) -> String {
    env::var(key).unwrap_or_else(|_| {
        warn!("{} not set, using empty value", key);
        String::new()
    })
}

fn env_number<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(default)
}

fn env_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .map(|raw| matches!(raw.to_lowercase().as_str(), "true" | "1" | "yes"))
        .unwrap_or(default)
}

/// Calendar ids are mapped per service via CALENDAR_ID_<SERVICE_TYPE>
/// environment variables (e.g. CALENDAR_ID_STANDARD_NOTARY).
fn calendar_ids_from_env() -> HashMap<String, String> {
    let mut ids = HashMap::new();
    for service_type in KNOWN_SERVICE_TYPES {
        let key = format!("CALENDAR_ID_{}", service_type);
        if let Ok(id) = env::var(&key) {
            if !id.is_empty() {
                ids.insert(service_type.to_string(), id);
            }
        }
    }
    ids
}

fn dates_from_env(key: &str) -> Vec<NaiveDate> {
    let raw = match env::var(key) {
        Ok(raw) => raw,
        Err(_) => return Vec::new(),
    };

    raw.split(',')
        .filter_map(|entry| {
            let entry = entry.trim();
            if entry.is_empty() {
                return None;
            }
            match NaiveDate::parse_from_str(entry, "%Y-%m-%d") {
                Ok(date) => Some(date),
                Err(_) => {
                    warn!("Ignoring malformed date entry in {}: {}", key, entry);
                    None
                }
            }
        })
        .collect()
}
