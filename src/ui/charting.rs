/// X bounds in seconds: from zero to the later of the last point and the
/// elapsed session time, never narrower than one second
pub fn time_bounds(points: &[(f64, f64)], elapsed: f64) -> [f64; 2] {
    let last = points.last().map_or(0.0, |p| p.0);
    let mut end = last.max(elapsed);
    if end < 1.0 {
        end = 1.0;
    }
    [0.0, end]
}

/// Y bounds covering every point and every `extra` value (threshold lines,
/// the zero axis), padded so lines never sit on the chart border
pub fn value_bounds(points: &[(f64, f64)], extra: &[f64]) -> [f64; 2] {
    let values = points.iter().map(|p| p.1).chain(extra.iter().copied());

    let mut lowest = f64::INFINITY;
    let mut highest = f64::NEG_INFINITY;
    for v in values.filter(|v| v.is_finite()) {
        lowest = lowest.min(v);
        highest = highest.max(v);
    }

    if !lowest.is_finite() {
        return [0.0, 1.0];
    }

    let pad = ((highest - lowest) * 0.1).max(1.0);
    [lowest - pad, highest + pad]
}

/// Evenly spaced axis labels across `bounds`
pub fn axis_labels(bounds: [f64; 2], count: usize) -> Vec<String> {
    let count = count.max(2);
    let step = (bounds[1] - bounds[0]) / (count - 1) as f64;
    (0..count)
        .map(|i| format_label(bounds[0] + step * i as f64))
        .collect()
}

/// Format a simple numeric label consistently
pub fn format_label(val: f64) -> String {
    if (val - val.round()).abs() < f64::EPSILON {
        format!("{}", val.round())
    } else {
        format!("{val:.1}")
    }
}
