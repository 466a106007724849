use serde::{Deserialize, Serialize};

/// One impedance sample on the session clock
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    /// Elapsed session seconds, paused intervals excluded
    pub t: f64,
    pub value: f64,
}

impl Reading {
    pub fn new(t: f64, value: f64) -> Self {
        Self { t, value }
    }
}

impl From<(f64, f64)> for Reading {
    fn from(v: (f64, f64)) -> Self {
        Reading { t: v.0, value: v.1 }
    }
}

impl From<Reading> for (f64, f64) {
    fn from(r: Reading) -> Self {
        (r.t, r.value)
    }
}

/// Derived series point, e.g. the rate of change recorded at each reading
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeSeriesPoint {
    pub t: f64,
    pub y: f64,
}

impl TimeSeriesPoint {
    pub fn new(t: f64, y: f64) -> Self {
        Self { t, y }
    }
}

impl From<(f64, f64)> for TimeSeriesPoint {
    fn from(v: (f64, f64)) -> Self {
        TimeSeriesPoint { t: v.0, y: v.1 }
    }
}

impl From<TimeSeriesPoint> for (f64, f64) {
    fn from(p: TimeSeriesPoint) -> Self {
        (p.t, p.y)
    }
}

/// Chart-ready tuples for any series
pub fn as_tuples<P: Copy + Into<(f64, f64)>>(points: &[P]) -> Vec<(f64, f64)> {
    points.iter().map(|p| (*p).into()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reading_converts_to_chart_tuple() {
        let r = Reading::new(1.5, 420.0);
        let tuple: (f64, f64) = r.into();
        assert_eq!(tuple, (1.5, 420.0));
        assert_eq!(Reading::from(tuple), r);
    }

    #[test]
    fn as_tuples_preserves_order() {
        let points = vec![TimeSeriesPoint::new(0.0, 1.0), TimeSeriesPoint::new(1.0, 2.0)];
        assert_eq!(as_tuples(&points), vec![(0.0, 1.0), (1.0, 2.0)]);
    }
}
