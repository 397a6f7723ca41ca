use std::env;
use std::fmt::Display;
use std::str::FromStr;

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Offset, Utc};
use tracing::warn;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub supabase_service_role_key: String,
    pub supabase_jwt_secret: String,
    pub server_port: u16,
    /// `supabase` (default) or `memory`.
    pub store_backend: String,
    pub sweeper_enabled: bool,
    pub payment: PaymentGatewayConfig,
    pub clinic: ClinicHours,
    pub policy: ClinicPolicy,
}

/// Credentials and endpoints of the wallet payment gateway.
#[derive(Debug, Clone)]
pub struct PaymentGatewayConfig {
    pub endpoint: String,
    pub partner_code: String,
    pub access_key: String,
    pub secret_key: String,
    pub redirect_url: String,
    /// Public base URL of this API; callbacks land on `{ipn_base_url}/payments/...`.
    pub ipn_base_url: String,
    pub request_type: String,
    pub lang: String,
    pub timeout_seconds: u64,
    pub require_signed_callbacks: bool,
}

/// Clinic working hours. All times are clinic-local wall clock times.
#[derive(Debug, Clone)]
pub struct ClinicHours {
    pub utc_offset_minutes: i32,
    pub morning_start: NaiveTime,
    pub morning_end: NaiveTime,
    pub afternoon_start: NaiveTime,
    pub afternoon_end: NaiveTime,
    pub slot_minutes: i64,
    pub min_lead_minutes: i64,
    pub max_range_days: i64,
}

#[derive(Debug, Clone)]
pub struct ClinicPolicy {
    pub consultation_fee: i64,
    pub compensation_discount_percent: i32,
    pub compensation_validity_months: u32,
    pub prescription_grace_days: i64,
}

impl Default for ClinicHours {
    fn default() -> Self {
        Self {
            utc_offset_minutes: 7 * 60,
            morning_start: hm(8, 0),
            morning_end: hm(12, 0),
            afternoon_start: hm(13, 0),
            afternoon_end: hm(17, 0),
            slot_minutes: 30,
            min_lead_minutes: 120,
            max_range_days: 31,
        }
    }
}

impl Default for ClinicPolicy {
    fn default() -> Self {
        Self {
            consultation_fee: 200_000,
            compensation_discount_percent: 20,
            compensation_validity_months: 6,
            prescription_grace_days: 7,
        }
    }
}

impl Default for PaymentGatewayConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://test-payment.momo.vn/v2/gateway/api/create".to_string(),
            partner_code: String::new(),
            access_key: String::new(),
            secret_key: String::new(),
            redirect_url: String::new(),
            ipn_base_url: String::new(),
            request_type: "captureWallet".to_string(),
            lang: "vi".to_string(),
            timeout_seconds: 10,
            require_signed_callbacks: false,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            supabase_url: String::new(),
            supabase_anon_key: String::new(),
            supabase_service_role_key: String::new(),
            supabase_jwt_secret: String::new(),
            server_port: 3000,
            store_backend: "memory".to_string(),
            sweeper_enabled: false,
            payment: PaymentGatewayConfig::default(),
            clinic: ClinicHours::default(),
            policy: ClinicPolicy::default(),
        }
    }
}

fn hm(hour: u32, minute: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or(NaiveTime::MIN)
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| {
        warn!("{} not set, using {}", key, if default.is_empty() { "empty value" } else { "default" });
        default.to_string()
    })
}

fn env_parse<T>(key: &str, default: T) -> T
where
    T: FromStr + Display,
{
    match env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("{} has invalid value {:?}, using default {}", key, raw, default);
            default
        }),
        Err(_) => default,
    }
}

fn env_time(key: &str, default: NaiveTime) -> NaiveTime {
    match env::var(key) {
        Ok(raw) => NaiveTime::parse_from_str(raw.trim(), "%H:%M").unwrap_or_else(|_| {
            warn!("{} must be HH:MM, got {:?}; using {}", key, raw, default.format("%H:%M"));
            default
        }),
        Err(_) => default,
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let hours = ClinicHours::default();
        let policy = ClinicPolicy::default();
        let gateway = PaymentGatewayConfig::default();

        let config = Self {
            supabase_url: env_or("SUPABASE_URL", ""),
            supabase_anon_key: env_or("SUPABASE_ANON_PUBLIC_KEY", ""),
            supabase_service_role_key: env::var("SUPABASE_SERVICE_ROLE_KEY").unwrap_or_default(),
            supabase_jwt_secret: env_or("SUPABASE_JWT_SECRET", ""),
            server_port: env_parse("PORT", 3000),
            store_backend: env::var("STORE_BACKEND").unwrap_or_else(|_| "supabase".to_string()),
            sweeper_enabled: env_parse("SWEEPER_ENABLED", true),
            payment: PaymentGatewayConfig {
                endpoint: env_or("PAYMENT_GATEWAY_ENDPOINT", &gateway.endpoint),
                partner_code: env_or("PAYMENT_PARTNER_CODE", ""),
                access_key: env_or("PAYMENT_ACCESS_KEY", ""),
                secret_key: env_or("PAYMENT_SECRET_KEY", ""),
                redirect_url: env_or("PAYMENT_REDIRECT_URL", ""),
                ipn_base_url: env_or("PAYMENT_IPN_BASE_URL", ""),
                request_type: env::var("PAYMENT_REQUEST_TYPE").unwrap_or(gateway.request_type),
                lang: env::var("PAYMENT_LANG").unwrap_or(gateway.lang),
                timeout_seconds: env_parse("PAYMENT_TIMEOUT_SECONDS", gateway.timeout_seconds),
                require_signed_callbacks: env_parse(
                    "PAYMENT_REQUIRE_SIGNED_CALLBACKS",
                    gateway.require_signed_callbacks,
                ),
            },
            clinic: ClinicHours {
                utc_offset_minutes: env_parse("CLINIC_UTC_OFFSET_MINUTES", hours.utc_offset_minutes),
                morning_start: env_time("CLINIC_MORNING_START", hours.morning_start),
                morning_end: env_time("CLINIC_MORNING_END", hours.morning_end),
                afternoon_start: env_time("CLINIC_AFTERNOON_START", hours.afternoon_start),
                afternoon_end: env_time("CLINIC_AFTERNOON_END", hours.afternoon_end),
                slot_minutes: env_parse("CLINIC_SLOT_MINUTES", hours.slot_minutes),
                min_lead_minutes: env_parse("CLINIC_MIN_LEAD_MINUTES", hours.min_lead_minutes),
                max_range_days: env_parse("CLINIC_MAX_RANGE_DAYS", hours.max_range_days),
            },
            policy: ClinicPolicy {
                consultation_fee: env_parse("CONSULTATION_FEE", policy.consultation_fee),
                compensation_discount_percent: env_parse(
                    "COMPENSATION_DISCOUNT_PERCENT",
                    policy.compensation_discount_percent,
                ),
                compensation_validity_months: env_parse(
                    "COMPENSATION_VALIDITY_MONTHS",
                    policy.compensation_validity_months,
                ),
                prescription_grace_days: env_parse(
                    "PRESCRIPTION_GRACE_DAYS",
                    policy.prescription_grace_days,
                ),
            },
        };

        if !config.is_configured() {
            warn!("Application not fully configured - missing environment variables");
        }
        if !config.is_payment_configured() {
            warn!("Payment gateway not configured - checkout endpoints will fail");
        }
        if !config.clinic.is_valid() {
            warn!("Clinic hours are inconsistent: {:?}", config.clinic);
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        !self.supabase_url.is_empty()
            && !self.supabase_anon_key.is_empty()
            && !self.supabase_jwt_secret.is_empty()
    }

    pub fn is_payment_configured(&self) -> bool {
        !self.payment.partner_code.is_empty()
            && !self.payment.access_key.is_empty()
            && !self.payment.secret_key.is_empty()
            && !self.payment.ipn_base_url.is_empty()
    }

    /// Key used for server-side PostgREST calls; falls back to the anon key.
    pub fn database_key(&self) -> &str {
        if self.supabase_service_role_key.is_empty() {
            &self.supabase_anon_key
        } else {
            &self.supabase_service_role_key
        }
    }
}

impl ClinicHours {
    pub fn is_valid(&self) -> bool {
        self.slot_minutes > 0
            && self.morning_start < self.morning_end
            && self.morning_end <= self.afternoon_start
            && self.afternoon_start < self.afternoon_end
            && FixedOffset::east_opt(self.utc_offset_minutes * 60).is_some()
    }

    pub fn offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_minutes * 60)
            .unwrap_or_else(|| Utc.fix())
    }

    pub fn local_datetime(&self, instant: DateTime<Utc>) -> NaiveDateTime {
        instant.with_timezone(&self.offset()).naive_local()
    }

    pub fn local_date(&self, instant: DateTime<Utc>) -> NaiveDate {
        self.local_datetime(instant).date()
    }

    /// Converts a clinic-local wall clock time into a UTC instant.
    pub fn to_utc(&self, date: NaiveDate, time: NaiveTime) -> DateTime<Utc> {
        let local = date.and_time(time);
        (local - Duration::seconds(i64::from(self.offset().local_minus_utc()))).and_utc()
    }

    pub fn slot_duration(&self) -> Duration {
        Duration::minutes(self.slot_minutes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_hours_are_consistent() {
        let hours = ClinicHours::default();
        assert!(hours.is_valid());
        assert_eq!(hours.slot_duration(), Duration::minutes(30));
    }

    #[test]
    fn local_time_round_trips_through_offset() {
        let hours = ClinicHours::default();
        let date = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        let instant = hours.to_utc(date, hm(8, 0));

        assert_eq!(instant.to_rfc3339(), "2026-03-02T01:00:00+00:00");
        assert_eq!(hours.local_date(instant), date);
        assert_eq!(hours.local_datetime(instant).time(), hm(8, 0));
    }

    #[test]
    fn database_key_prefers_service_role() {
        let mut config = AppConfig {
            supabase_url: "http://localhost".into(),
            supabase_anon_key: "anon".into(),
            supabase_jwt_secret: "secret".into(),
            ..Default::default()
        };
        assert_eq!(config.database_key(), "anon");

        config.supabase_service_role_key = "service".into();
        assert_eq!(config.database_key(), "service");
    }
}
