//! Service configuration.
//!
//! Roster, calendar, pay rates and external service settings. The
//! compiled-in values can be overridden from the environment.

use chrono::NaiveDate;
use serde::Serialize;
use std::{collections::BTreeMap, env};
use tracing::info;

use crate::errors::{TimesheetError, TimesheetResult};
use crate::models::calendar::Calendar;

const DEFAULT_ROSTER: [&str; 7] = ["Santiago", "Alan", "Ghis", "Diego", "Cony", "Juan", "Melany"];
const DEFAULT_START: (i32, u32, u32) = (2026, 1, 19);
const DEFAULT_END: (i32, u32, u32) = (2026, 2, 15);

const DEFAULT_EMAILJS_SERVICE: &str = "hellorchardteam";
const DEFAULT_EMAILJS_TEMPLATE: &str = "template_3ldkmmt";
const DEFAULT_MAIL_FROM: &str = "Orchard TEAM <team@orchard.local>";
const DEFAULT_NOMINATIM_URL: &str = "https://nominatim.openstreetmap.org";
const DEFAULT_BIND: &str = "0.0.0.0:3000";

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct PayRates {
    /// Net pay per hour.
    pub net: f64,
    /// PAYE plus ACC withheld per hour.
    pub deductions: f64,
    /// Gross hourly rate as printed on the pay cards.
    pub gross_display: String,
    pub base_gross: f64,
    pub holiday_pay_pct: f64,
    pub paye: f64,
    pub acc: f64,
}

impl Default for PayRates {
    fn default() -> Self {
        PayRates {
            net: 21.59,
            deductions: 4.16,
            gross_display: "25.75".to_string(),
            base_gross: 23.85,
            holiday_pay_pct: 8.0,
            paye: 3.73,
            acc: 0.43,
        }
    }
}

/// Which day keys count towards a member's grand total.
#[derive(Serialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GrandTotalScope {
    /// Every key stored for the member, including ones outside the calendar.
    #[default]
    AllKeys,
    /// Only days of the configured calendar.
    Calendar,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EmailJsSettings {
    pub service_id: String,
    pub template_id: String,
    pub public_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TimesheetConfig {
    pub roster: Vec<String>,
    pub calendar: Calendar,
    pub rates: PayRates,
    pub grand_total_scope: GrandTotalScope,
    /// member -> recipient address
    pub emails: BTreeMap<String, String>,
    pub emailjs: EmailJsSettings,
    pub resend_api_key: Option<String>,
    pub mail_from: String,
    /// Firebase Realtime Database root, e.g. `https://<project>.firebaseio.com`
    pub store_url: Option<String>,
    pub store_auth: Option<String>,
    pub nominatim_url: String,
    pub bind_addr: String,
}

impl TimesheetConfig {
    pub fn new(roster: Vec<String>, calendar: Calendar, rates: PayRates) -> Self {
        TimesheetConfig {
            roster,
            calendar,
            rates,
            grand_total_scope: GrandTotalScope::default(),
            emails: BTreeMap::new(),
            emailjs: EmailJsSettings {
                service_id: DEFAULT_EMAILJS_SERVICE.to_string(),
                template_id: DEFAULT_EMAILJS_TEMPLATE.to_string(),
                public_key: None,
            },
            resend_api_key: None,
            mail_from: DEFAULT_MAIL_FROM.to_string(),
            store_url: None,
            store_auth: None,
            nominatim_url: DEFAULT_NOMINATIM_URL.to_string(),
            bind_addr: DEFAULT_BIND.to_string(),
        }
    }

    /// The compiled-in Orchard configuration.
    pub fn builtin() -> TimesheetResult<Self> {
        let start = ymd(DEFAULT_START)?;
        let end = ymd(DEFAULT_END)?;

        Ok(TimesheetConfig::new(
            DEFAULT_ROSTER.iter().map(|name| name.to_string()).collect(),
            Calendar::new(start, end)?,
            PayRates::default(),
        ))
    }

    pub fn from_env() -> TimesheetResult<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Applies overrides from `lookup` on top of [`TimesheetConfig::builtin`].
    pub fn from_lookup<F>(lookup: F) -> TimesheetResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::builtin()?;
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(roster) = var("ORCHARD_ROSTER") {
            config.roster = roster
                .split(',')
                .map(|name| name.trim().to_string())
                .filter(|name| !name.is_empty())
                .collect();
        }

        let start = var("ORCHARD_START").map(|s| parse_date("ORCHARD_START", &s));
        let end = var("ORCHARD_END").map(|s| parse_date("ORCHARD_END", &s));
        if start.is_some() || end.is_some() {
            let start = start.transpose()?.unwrap_or(config.calendar.start);
            let end = end.transpose()?.unwrap_or(config.calendar.end);
            config.calendar = Calendar::new(start, end)?;
        }

        if let Some(emails) = var("ORCHARD_EMAILS") {
            config.emails = parse_emails(&emails)?;
        }

        if let Some(rate) = var("ORCHARD_RATE_NETO") {
            config.rates.net = parse_rate("ORCHARD_RATE_NETO", &rate)?;
        }
        if let Some(rate) = var("ORCHARD_RATE_DEDUCTIONS") {
            config.rates.deductions = parse_rate("ORCHARD_RATE_DEDUCTIONS", &rate)?;
        }

        if let Some(scope) = var("ORCHARD_GRAND_TOTAL_SCOPE") {
            config.grand_total_scope = match scope.trim() {
                "all_keys" => GrandTotalScope::AllKeys,
                "calendar" => GrandTotalScope::Calendar,
                other => {
                    return Err(TimesheetError::Config(format!(
                        "ORCHARD_GRAND_TOTAL_SCOPE must be 'all_keys' or 'calendar', got '{}'",
                        other
                    )));
                }
            };
        }

        if let Some(service_id) = var("EMAILJS_SERVICE_ID") {
            config.emailjs.service_id = service_id;
        }
        if let Some(template_id) = var("EMAILJS_TEMPLATE_ID") {
            config.emailjs.template_id = template_id;
        }
        config.emailjs.public_key = var("EMAILJS_PUBLIC_KEY");
        config.resend_api_key = var("RESEND_API_KEY");
        if let Some(from) = var("ORCHARD_MAIL_FROM") {
            config.mail_from = from;
        }

        config.store_url = var("ORCHARD_STORE_URL");
        config.store_auth = var("ORCHARD_STORE_AUTH");
        if let Some(url) = var("NOMINATIM_URL") {
            config.nominatim_url = url;
        }
        if let Some(bind) = var("ORCHARD_BIND") {
            config.bind_addr = bind;
        }

        config.validate()?;

        info!(
            "Loaded configuration: {} members, {} weeks from {} to {}",
            config.roster.len(),
            config.calendar.weeks.len(),
            config.calendar.start,
            config.calendar.end
        );

        Ok(config)
    }

    pub fn validate(&self) -> TimesheetResult<()> {
        if self.roster.is_empty() {
            return Err(TimesheetError::Config("roster is empty".to_string()));
        }

        let mut names: Vec<&String> = self.roster.iter().collect();
        names.sort();
        names.dedup();
        if names.len() != self.roster.len() {
            return Err(TimesheetError::Config(
                "roster contains duplicate names".to_string(),
            ));
        }

        Ok(())
    }

    pub fn is_member(&self, member: &str) -> bool {
        self.roster.iter().any(|name| name == member)
    }

    pub fn recipient(&self, member: &str) -> Option<&str> {
        self.emails.get(member).map(String::as_str)
    }
}

fn ymd((y, m, d): (i32, u32, u32)) -> TimesheetResult<NaiveDate> {
    NaiveDate::from_ymd_opt(y, m, d)
        .ok_or_else(|| TimesheetError::Config(format!("invalid date {}-{}-{}", y, m, d)))
}

fn parse_date(key: &str, value: &str) -> TimesheetResult<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(|e| {
        TimesheetError::Config(format!("{} must be YYYY-MM-DD, got '{}': {}", key, value, e))
    })
}

fn parse_rate(key: &str, value: &str) -> TimesheetResult<f64> {
    value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|rate| rate.is_finite() && *rate >= 0.0)
        .ok_or_else(|| {
            TimesheetError::Config(format!(
                "{} must be a non-negative number, got '{}'",
                key, value
            ))
        })
}

fn parse_emails(value: &str) -> TimesheetResult<BTreeMap<String, String>> {
    value
        .split(',')
        .filter(|pair| !pair.trim().is_empty())
        .map(|pair| {
            let (name, address) = pair.split_once('=').ok_or_else(|| {
                TimesheetError::Config(format!(
                    "ORCHARD_EMAILS entry '{}' is not Name=address",
                    pair
                ))
            })?;
            Ok((name.trim().to_string(), address.trim().to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn builtin_matches_orchard_constants() {
        let config = TimesheetConfig::builtin().unwrap();

        assert_eq!(config.roster.len(), 7);
        assert_eq!(config.roster[0], "Santiago");
        assert_eq!(config.calendar.weeks.len(), 4);
        assert_eq!(config.rates.net, 21.59);
        assert_eq!(config.rates.deductions, 4.16);
        assert_eq!(config.grand_total_scope, GrandTotalScope::AllKeys);
        assert!(config.emails.is_empty());
    }

    #[test]
    fn environment_overrides_apply() {
        let config = TimesheetConfig::from_lookup(lookup(&[
            ("ORCHARD_ROSTER", "A, B"),
            ("ORCHARD_START", "2026-03-02"),
            ("ORCHARD_END", "2026-03-03"),
            ("ORCHARD_EMAILS", "A=a@example.com"),
            ("ORCHARD_RATE_NETO", "30"),
            ("ORCHARD_GRAND_TOTAL_SCOPE", "calendar"),
        ]))
        .unwrap();

        assert_eq!(config.roster, vec!["A".to_string(), "B".to_string()]);
        assert_eq!(config.calendar.weeks.len(), 1);
        assert_eq!(config.calendar.weeks[0].days.len(), 2);
        assert_eq!(config.recipient("A"), Some("a@example.com"));
        assert_eq!(config.recipient("B"), None);
        assert_eq!(config.rates.net, 30.0);
        assert_eq!(config.grand_total_scope, GrandTotalScope::Calendar);
    }

    #[test]
    fn bad_overrides_are_config_errors() {
        let bad = [
            ("ORCHARD_RATE_NETO", "lots"),
            ("ORCHARD_START", "19/01/2026"),
            ("ORCHARD_EMAILS", "nobody"),
            ("ORCHARD_GRAND_TOTAL_SCOPE", "everything"),
            ("ORCHARD_ROSTER", "A,A"),
        ];

        for pair in bad {
            let result = TimesheetConfig::from_lookup(lookup(&[pair]));
            assert!(
                matches!(result, Err(TimesheetError::Config(_))),
                "{:?} should be rejected",
                pair
            );
        }
    }
}
