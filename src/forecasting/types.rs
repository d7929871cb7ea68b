use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{Duration, Months, NaiveDate};
use serde::{Deserialize, Serialize};

use super::error::{ForecastError, Result};

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub price: f64,
}

impl PricePoint {
    pub fn new(date: NaiveDate, price: f64) -> Self {
        PricePoint { date, price }
    }
}

/// Validated, immutable price history: dates strictly increasing, prices finite.
///
/// Cloning is cheap, the points live behind an `Arc` so a fitted model can keep its
/// training series without copying it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<PricePoint>", into = "Vec<PricePoint>")]
pub struct PriceSeries {
    points: Arc<[PricePoint]>,
}

impl PriceSeries {
    pub fn new(points: Vec<PricePoint>) -> Result<Self> {
        if points.is_empty() {
            return Err(ForecastError::InvalidSeries("series is empty".to_string()));
        }

        for (i, p) in points.iter().enumerate() {
            if !p.price.is_finite() {
                return Err(ForecastError::InvalidSeries(format!(
                    "non-finite price at {}",
                    p.date
                )));
            }
            if i > 0 && p.date <= points[i - 1].date {
                return Err(ForecastError::InvalidSeries(format!(
                    "dates must be strictly increasing ({} follows {})",
                    p.date,
                    points[i - 1].date
                )));
            }
        }

        Ok(PriceSeries {
            points: points.into(),
        })
    }

    /// Daily series starting at `start`.
    pub fn from_daily(start: NaiveDate, prices: &[f64]) -> Result<Self> {
        let points = prices
            .iter()
            .enumerate()
            .map(|(i, &price)| PricePoint::new(start + Duration::days(i as i64), price))
            .collect();
        Self::new(points)
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> &[PricePoint] {
        &self.points
    }

    pub fn prices(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.price).collect()
    }

    pub fn dates(&self) -> Vec<NaiveDate> {
        self.points.iter().map(|p| p.date).collect()
    }

    pub fn first_date(&self) -> NaiveDate {
        self.points[0].date
    }

    pub fn last_date(&self) -> NaiveDate {
        self.points[self.points.len() - 1].date
    }

    pub fn last_price(&self) -> f64 {
        self.points[self.points.len() - 1].price
    }

    /// Contiguous sub-range `[start, end)`; `None` when empty or out of range.
    pub fn slice(&self, start: usize, end: usize) -> Option<PriceSeries> {
        if start >= end || end > self.points.len() {
            return None;
        }
        Some(PriceSeries {
            points: self.points[start..end].into(),
        })
    }

    pub fn frequency(&self) -> Frequency {
        Frequency::infer(&self.dates())
    }

    /// `horizon` dates continuing the series at its inferred frequency.
    pub fn continuation_dates(&self, horizon: usize) -> Result<Vec<NaiveDate>> {
        self.frequency().dates_after(self.last_date(), horizon)
    }
}

impl TryFrom<Vec<PricePoint>> for PriceSeries {
    type Error = ForecastError;

    fn try_from(points: Vec<PricePoint>) -> Result<Self> {
        PriceSeries::new(points)
    }
}

impl From<PriceSeries> for Vec<PricePoint> {
    fn from(series: PriceSeries) -> Self {
        series.points.to_vec()
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
}

impl Frequency {
    /// Modal gap between consecutive dates; anything longer than a month is treated as daily.
    pub fn infer(dates: &[NaiveDate]) -> Frequency {
        if dates.len() < 2 {
            return Frequency::Daily;
        }

        let mut counts: BTreeMap<i64, usize> = BTreeMap::new();
        for w in dates.windows(2) {
            *counts.entry((w[1] - w[0]).num_days()).or_insert(0) += 1;
        }

        // Ties go to the shortest gap, like a sorted mode.
        let mut modal_gap = 1;
        let mut best = 0;
        for (&gap, &count) in &counts {
            if count > best {
                best = count;
                modal_gap = gap;
            }
        }

        match modal_gap {
            g if g <= 1 => Frequency::Daily,
            g if g <= 7 => Frequency::Weekly,
            g if g <= 31 => Frequency::Monthly,
            _ => Frequency::Daily,
        }
    }

    pub fn dates_after(&self, last: NaiveDate, horizon: usize) -> Result<Vec<NaiveDate>> {
        (1..=horizon)
            .map(|i| {
                let next = match self {
                    Frequency::Daily => last.checked_add_signed(Duration::days(i as i64)),
                    Frequency::Weekly => last.checked_add_signed(Duration::days(7 * i as i64)),
                    Frequency::Monthly => last.checked_add_months(Months::new(i as u32)),
                };
                next.ok_or_else(|| {
                    ForecastError::invalid_parameter("horizon", "forecast dates overflow the calendar")
                })
            })
            .collect()
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct ForecastRow {
    pub date: NaiveDate,
    pub forecast: f64,
    pub lower_bound: f64,
    pub upper_bound: f64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ForecastResult {
    pub model: String,
    pub confidence_level: f64,
    pub rows: Vec<ForecastRow>,
}

impl ForecastResult {
    pub fn from_columns(
        model: &str,
        confidence_level: f64,
        dates: &[NaiveDate],
        forecast: &[f64],
        lower: &[f64],
        upper: &[f64],
    ) -> Self {
        let rows = dates
            .iter()
            .zip(forecast)
            .zip(lower.iter().zip(upper))
            .map(|((&date, &f), (&lo, &hi))| ForecastRow {
                date,
                forecast: f,
                lower_bound: lo,
                upper_bound: hi,
            })
            .collect();

        ForecastResult {
            model: model.to_string(),
            confidence_level,
            rows,
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn forecasts(&self) -> Vec<f64> {
        self.rows.iter().map(|r| r.forecast).collect()
    }

    pub fn lower_bounds(&self) -> Vec<f64> {
        self.rows.iter().map(|r| r.lower_bound).collect()
    }

    pub fn upper_bounds(&self) -> Vec<f64> {
        self.rows.iter().map(|r| r.upper_bound).collect()
    }

    pub fn widths(&self) -> Vec<f64> {
        self.rows
            .iter()
            .map(|r| r.upper_bound - r.lower_bound)
            .collect()
    }

    /// Point forecasts as a price series, for `Forecaster::evaluate`.
    pub fn as_series(&self) -> Result<PriceSeries> {
        PriceSeries::new(
            self.rows
                .iter()
                .map(|r| PricePoint::new(r.date, r.forecast))
                .collect(),
        )
    }

    pub fn summary(&self) -> Option<ForecastSummary> {
        let values = self.forecasts();
        let first = *values.first()?;
        let last = *values.last()?;
        let mean = values.iter().sum::<f64>() / values.len() as f64;
        let change_pct = if first != 0.0 {
            (last - first) / first * 100.0
        } else {
            0.0
        };

        Some(ForecastSummary {
            mean,
            first,
            last,
            change_pct,
            volatility: super::utils::sample_std(&values),
        })
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct ForecastSummary {
    pub mean: f64,
    pub first: f64,
    pub last: f64,
    pub change_pct: f64,
    pub volatility: f64,
}

/// Accuracy of a forecast against actual prices over their common dates.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Default)]
pub struct EvaluationMetrics {
    pub n: usize,
    pub mse: f64,
    pub rmse: f64,
    pub mae: f64,
    /// Percent; `None` when every aligned actual is zero.
    pub mape: Option<f64>,
    pub r2: f64,
}

impl EvaluationMetrics {
    pub fn empty() -> Self {
        EvaluationMetrics::default()
    }

    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    pub fn accuracy(&self) -> Option<f64> {
        self.mape.map(|m| (100.0 - m).max(0.0))
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ModelInfo {
    pub name: String,
    pub fitted: bool,
    pub parameters: BTreeMap<String, serde_json::Value>,
}

impl ModelInfo {
    pub fn new(name: &str, fitted: bool) -> Self {
        ModelInfo {
            name: name.to_string(),
            fitted,
            parameters: BTreeMap::new(),
        }
    }

    pub fn with(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.parameters.insert(key.to_string(), value.into());
        self
    }
}
