//! Learning-curve smoothing.

/// Smallest moving-average window ever used.
pub const MIN_WINDOW: usize = 5;

/// Window for a run of `episodes` episodes: 5% of the run, at least
/// [`MIN_WINDOW`]. Halves round to even.
pub fn smoothing_window(episodes: usize) -> usize {
    let scaled = (episodes as f64 * 0.05).round_ties_even() as usize;
    scaled.max(MIN_WINDOW)
}

/// Trailing moving average over every full window.
///
/// The output has `history.len() - window + 1` points. A history shorter than
/// the window, or a zero window, is returned unchanged.
pub fn moving_average(history: &[f64], window: usize) -> Vec<f64> {
    if window == 0 || history.len() < window {
        return history.to_vec();
    }

    let mut smoothed = Vec::with_capacity(history.len() - window + 1);
    let mut sum: f64 = history[..window].iter().sum();
    smoothed.push(sum / window as f64);
    for i in window..history.len() {
        sum += history[i] - history[i - window];
        smoothed.push(sum / window as f64);
    }
    smoothed
}

/// Mean of the last `window` entries (all of them if fewer). NaN when empty.
pub fn tail_mean(history: &[f64], window: usize) -> f64 {
    let tail = &history[history.len().saturating_sub(window)..];
    tail.iter().sum::<f64>() / tail.len() as f64
}
