//! Daily basic: auxiliary per-symbol per-session valuation indicators.
//!
//! These never enter order matching. Strategies read them through
//! `ExecutionContext::get_daily_basic`, which refuses dates after the
//! current session.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One symbol's supplementary indicators for one session.
///
/// Every field is optional: upstream sources routinely leave ratios blank
/// (e.g. P/E for loss-making companies).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DailyBasic {
    pub symbol: String,
    pub date: NaiveDate,
    #[serde(default)]
    pub close: Option<f64>,
    /// Turnover rate, percent.
    #[serde(default)]
    pub turnover_rate: Option<f64>,
    #[serde(default)]
    pub volume_ratio: Option<f64>,
    #[serde(default)]
    pub pe: Option<f64>,
    #[serde(default)]
    pub pe_ttm: Option<f64>,
    #[serde(default)]
    pub pb: Option<f64>,
    #[serde(default)]
    pub ps: Option<f64>,
    #[serde(default)]
    pub ps_ttm: Option<f64>,
    /// Dividend yield, percent.
    #[serde(default)]
    pub dv_ratio: Option<f64>,
    /// Total market value.
    #[serde(default)]
    pub total_mv: Option<f64>,
    /// Circulating market value.
    #[serde(default)]
    pub circ_mv: Option<f64>,
}

impl DailyBasic {
    pub fn new(symbol: impl Into<String>, date: NaiveDate) -> Self {
        Self {
            symbol: symbol.into(),
            date,
            ..Self::default()
        }
    }

    /// Trailing P/E if it is a usable positive number.
    pub fn positive_pe_ttm(&self) -> Option<f64> {
        self.pe_ttm.filter(|pe| pe.is_finite() && *pe > 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positive_pe_filters_losses_and_nan() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        let mut basic = DailyBasic::new("000001.SZ", date);
        assert_eq!(basic.positive_pe_ttm(), None);

        basic.pe_ttm = Some(-3.2);
        assert_eq!(basic.positive_pe_ttm(), None);

        basic.pe_ttm = Some(f64::NAN);
        assert_eq!(basic.positive_pe_ttm(), None);

        basic.pe_ttm = Some(8.5);
        assert_eq!(basic.positive_pe_ttm(), Some(8.5));
    }

    #[test]
    fn missing_fields_deserialize_as_none() {
        let json = r#"{"symbol":"000001.SZ","date":"2024-01-02","pb":0.7}"#;
        let basic: DailyBasic = serde_json::from_str(json).unwrap();
        assert_eq!(basic.pb, Some(0.7));
        assert_eq!(basic.pe, None);
    }
}
