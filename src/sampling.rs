//! Sampling-strategy classification
//!
//! The transport model samples its own output to match each observation's
//! averaging window. The window length (`obs_length`, hours) maps onto one of
//! four strategy codes through a ladder of upper-inclusive ceilings: 0.5 h
//! and below is instantaneous, up to 1.25 h is a 1-hour average, up to
//! 2.75 h a 90-minute average and up to 5.25 h a 4-hour average. Longer
//! windows are unclassified.

use std::fmt;

/// Code given to records no rung of the ladder matches
pub const SENTINEL: i64 = 999;

/// `_FillValue` of the strategy field
pub const FILL_VALUE: i64 = -9;

pub const LONG_NAME: &str = "model sampling strategy";

pub const VALUES_DESCRIPTION: &str =
    "How to sample model. 1=4-hour avg; 2=1-hour avg; 3=90-min avg; 4=instantaneous";

/// How the model should average its output for one observation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SamplingStrategy {
    FourHourAverage,
    HourlyAverage,
    NinetyMinuteAverage,
    Instantaneous,
}

/// `(ceiling hours, strategy)`, smallest ceiling first. The first rung whose
/// ceiling the window does not exceed wins.
const LADDER: [(f64, SamplingStrategy); 4] = [
    (0.5, SamplingStrategy::Instantaneous),
    (1.25, SamplingStrategy::HourlyAverage),
    (2.75, SamplingStrategy::NinetyMinuteAverage),
    (5.25, SamplingStrategy::FourHourAverage),
];

impl SamplingStrategy {
    pub const ALL: [SamplingStrategy; 4] = [
        SamplingStrategy::FourHourAverage,
        SamplingStrategy::HourlyAverage,
        SamplingStrategy::NinetyMinuteAverage,
        SamplingStrategy::Instantaneous,
    ];

    /// Integer code stored in `CT_sampling_strategy`
    pub fn code(self) -> i64 {
        match self {
            SamplingStrategy::FourHourAverage => 1,
            SamplingStrategy::HourlyAverage => 2,
            SamplingStrategy::NinetyMinuteAverage => 3,
            SamplingStrategy::Instantaneous => 4,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.code() == code)
    }

    /// Strategy for an averaging window of `obs_length` hours.
    ///
    /// A zero-length window is instantaneous. Windows over 5.25 hours,
    /// negative windows and NaN are unclassified.
    pub fn classify(obs_length: f64) -> Option<Self> {
        if obs_length.is_nan() || obs_length < 0.0 {
            return None;
        }
        LADDER
            .iter()
            .find(|(ceiling, _)| obs_length <= *ceiling)
            .map(|&(_, strategy)| strategy)
    }
}

impl fmt::Display for SamplingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SamplingStrategy::FourHourAverage => "4-hour avg",
            SamplingStrategy::HourlyAverage => "1-hour avg",
            SamplingStrategy::NinetyMinuteAverage => "90-min avg",
            SamplingStrategy::Instantaneous => "instantaneous",
        };
        write!(f, "{}", label)
    }
}

/// Averaging window in hours: twice the start-to-midpoint span
pub fn obs_length_hours(start_time: i64, midpoint_time: i64) -> f64 {
    2.0 * (midpoint_time - start_time) as f64 / 3600.0
}

/// Code for a window, or [`SENTINEL`] when unclassified
pub fn strategy_code(obs_length: f64) -> i64 {
    SamplingStrategy::classify(obs_length)
        .map(SamplingStrategy::code)
        .unwrap_or(SENTINEL)
}

/// Whether `code` names one of the four strategies
pub fn is_valid_code(code: i64) -> bool {
    SamplingStrategy::from_code(code).is_some()
}
