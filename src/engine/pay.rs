use serde::Serialize;

use crate::config::PayRates;

/// Pay figures for one member, derived from their grand total.
///
/// The amounts are unrounded products; only the display strings are rounded,
/// so chaining further arithmetic on the displayed values may drift by a cent.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct PaySummary {
    pub member: String,
    pub total_hours: f64,
    pub rate_neto: f64,
    pub rate_deductions: f64,
    pub total_neto: f64,
    pub total_deductions: f64,
}

impl PaySummary {
    pub fn derive(member: &str, total_hours: f64, rates: &PayRates) -> Self {
        PaySummary {
            member: member.to_string(),
            total_hours,
            rate_neto: rates.net,
            rate_deductions: rates.deductions,
            total_neto: total_hours * rates.net,
            total_deductions: total_hours * rates.deductions,
        }
    }

    /// Net pay with two decimals and no separators, e.g. `863.60`.
    pub fn total_neto_fixed(&self) -> String {
        format!("{:.2}", self.total_neto)
    }

    pub fn total_deductions_fixed(&self) -> String {
        format!("{:.2}", self.total_deductions)
    }
}

/// Two decimals with comma thousands separators, e.g. `1,234.56`.
pub fn format_money(value: f64) -> String {
    let fixed = format!("{:.2}", value.abs());
    let (whole, fraction) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, digit) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }

    let sign = if value < 0.0 && fixed.bytes().any(|b| b != b'0' && b != b'.') {
        "-"
    } else {
        ""
    };

    format!("{}{}.{}", sign, grouped, fraction)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forty_hours_at_net_rate() {
        let summary = PaySummary::derive("A", 40.0, &PayRates::default());

        assert_eq!(summary.total_neto_fixed(), "863.60");
        assert_eq!(summary.total_deductions_fixed(), "166.40");
    }

    #[test]
    fn zero_hours_pay_nothing() {
        let summary = PaySummary::derive("A", 0.0, &PayRates::default());

        assert_eq!(summary.total_neto_fixed(), "0.00");
        assert_eq!(format_money(summary.total_deductions), "0.00");
    }

    #[test]
    fn money_is_grouped_by_thousands() {
        assert_eq!(format_money(0.5), "0.50");
        assert_eq!(format_money(999.999), "1,000.00");
        assert_eq!(format_money(1234.5), "1,234.50");
        assert_eq!(format_money(1234567.891), "1,234,567.89");
        assert_eq!(format_money(-4321.0), "-4,321.00");
        assert_eq!(format_money(-0.001), "0.00");
    }
}
