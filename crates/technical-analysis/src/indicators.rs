//! Indicator primitives over date-aligned series.
//!
//! Every function returns a vector the same length as its input, with `None`
//! wherever the indicator is not yet defined (warm-up) or an input is missing.

/// Log-return over `lag` periods: `ln(x_t) - ln(x_{t-lag})`.
pub fn log_returns(data: &[Option<f64>], lag: usize) -> Vec<Option<f64>> {
    let mut result = vec![None; data.len()];
    if lag == 0 {
        return result;
    }

    for i in lag..data.len() {
        if let (Some(curr), Some(prev)) = (data[i], data[i - lag]) {
            if curr > 0.0 && prev > 0.0 {
                result[i] = Some(curr.ln() - prev.ln());
            }
        }
    }
    result
}

/// Rolling mean over a full window. Any missing value in the window yields `None`.
pub fn rolling_mean(data: &[Option<f64>], window: usize) -> Vec<Option<f64>> {
    let mut result = vec![None; data.len()];
    if window == 0 || data.len() < window {
        return result;
    }

    for i in window - 1..data.len() {
        let slice = &data[i + 1 - window..=i];
        if let Some(values) = collect_window(slice) {
            result[i] = Some(values.iter().sum::<f64>() / window as f64);
        }
    }
    result
}

/// Rolling standard deviation with `ddof` delta degrees of freedom
/// (0 = population, 1 = sample).
pub fn rolling_std(data: &[Option<f64>], window: usize, ddof: usize) -> Vec<Option<f64>> {
    let mut result = vec![None; data.len()];
    if window == 0 || window <= ddof || data.len() < window {
        return result;
    }

    for i in window - 1..data.len() {
        let slice = &data[i + 1 - window..=i];
        if let Some(values) = collect_window(slice) {
            let mean = values.iter().sum::<f64>() / window as f64;
            let ss: f64 = values.iter().map(|x| (x - mean).powi(2)).sum();
            result[i] = Some((ss / (window - ddof) as f64).sqrt());
        }
    }
    result
}

fn collect_window(slice: &[Option<f64>]) -> Option<Vec<f64>> {
    slice.iter().copied().collect()
}

/// Recursive exponential moving average (`adjust = false` form).
///
/// Seeded with the first observed value; reported once `min_periods`
/// observations have been seen. Missing inputs produce `None` and leave the
/// running state untouched.
pub fn ewm(data: &[Option<f64>], alpha: f64, min_periods: usize) -> Vec<Option<f64>> {
    let mut result = vec![None; data.len()];
    let mut state: Option<f64> = None;
    let mut observed = 0usize;

    for (i, value) in data.iter().enumerate() {
        let Some(x) = *value else {
            continue;
        };
        let next = match state {
            None => x,
            Some(prev) => (1.0 - alpha) * prev + alpha * x,
        };
        state = Some(next);
        observed += 1;
        if observed >= min_periods.max(1) {
            result[i] = Some(next);
        }
    }
    result
}

/// Exponential moving average in span form (`alpha = 2 / (span + 1)`).
pub fn ema(data: &[Option<f64>], span: usize, min_periods: usize) -> Vec<Option<f64>> {
    if span == 0 {
        return vec![None; data.len()];
    }
    ewm(data, 2.0 / (span as f64 + 1.0), min_periods)
}

/// Relative Strength Index with Wilder smoothing (`alpha = 1 / period`).
///
/// The first observation counts as a zero move, so the value is defined from
/// index `period - 1` onwards. When the average loss is zero the RSI is 100.
pub fn rsi(data: &[Option<f64>], period: usize) -> Vec<Option<f64>> {
    if period == 0 || data.is_empty() {
        return vec![None; data.len()];
    }

    let mut up: Vec<Option<f64>> = Vec::with_capacity(data.len());
    let mut down: Vec<Option<f64>> = Vec::with_capacity(data.len());
    up.push(Some(0.0));
    down.push(Some(0.0));

    for i in 1..data.len() {
        match (data[i], data[i - 1]) {
            (Some(curr), Some(prev)) => {
                let change = curr - prev;
                up.push(Some(change.max(0.0)));
                down.push(Some((-change).max(0.0)));
            }
            _ => {
                up.push(None);
                down.push(None);
            }
        }
    }

    let alpha = 1.0 / period as f64;
    let avg_gain = ewm(&up, alpha, period);
    let avg_loss = ewm(&down, alpha, period);

    avg_gain
        .iter()
        .zip(avg_loss.iter())
        .zip(data.iter())
        .map(|((gain, loss), close)| {
            close.as_ref()?;
            match (gain, loss) {
                (Some(_), Some(l)) if *l == 0.0 => Some(100.0),
                (Some(g), Some(l)) => Some(100.0 - 100.0 / (1.0 + g / l)),
                _ => None,
            }
        })
        .collect()
}

/// MACD (Moving Average Convergence Divergence)
pub struct MacdSeries {
    pub macd_line: Vec<Option<f64>>,
    pub signal_line: Vec<Option<f64>>,
}

/// MACD line = EMA(fast) - EMA(slow), defined once `slow` closes are seen.
///
/// The signal line is the EMA(signal) of the raw EMA spread over the whole
/// history and is reported wherever the MACD line is defined.
pub fn macd(data: &[Option<f64>], fast_period: usize, slow_period: usize, signal_period: usize) -> MacdSeries {
    let empty = || vec![None; data.len()];
    if fast_period == 0 || slow_period == 0 || signal_period == 0 || slow_period < fast_period {
        return MacdSeries { macd_line: empty(), signal_line: empty() };
    }

    let fast_raw = ema(data, fast_period, 1);
    let slow_raw = ema(data, slow_period, 1);
    let spread: Vec<Option<f64>> = fast_raw
        .iter()
        .zip(slow_raw.iter())
        .map(|(f, s)| Some((*f)? - (*s)?))
        .collect();

    let slow_gated = ema(data, slow_period, slow_period);
    let macd_line: Vec<Option<f64>> = spread
        .iter()
        .zip(slow_gated.iter())
        .map(|(m, gate)| gate.and(*m))
        .collect();

    let signal_raw = ema(&spread, signal_period, signal_period);
    let signal_line: Vec<Option<f64>> = signal_raw
        .iter()
        .zip(macd_line.iter())
        .map(|(s, m)| m.and(*s))
        .collect();

    MacdSeries {
        macd_line,
        signal_line,
    }
}

/// Bollinger Bands
pub struct BollingerSeries {
    pub upper: Vec<Option<f64>>,
    pub lower: Vec<Option<f64>>,
}

/// Moving average with an envelope of `std_dev` population standard deviations.
pub fn bollinger_bands(data: &[Option<f64>], period: usize, std_dev: f64) -> BollingerSeries {
    let middle = rolling_mean(data, period);
    let std = rolling_std(data, period, 0);

    let mut upper = Vec::with_capacity(data.len());
    let mut lower = Vec::with_capacity(data.len());
    for (m, s) in middle.iter().zip(std.iter()) {
        match (m, s) {
            (Some(m), Some(s)) => {
                upper.push(Some(m + std_dev * s));
                lower.push(Some(m - std_dev * s));
            }
            _ => {
                upper.push(None);
                lower.push(None);
            }
        }
    }

    BollingerSeries { upper, lower }
}

/// Trailing z-score with a sample standard deviation. A flat window scores 0.
pub fn rolling_zscore(data: &[Option<f64>], window: usize) -> Vec<Option<f64>> {
    let mean = rolling_mean(data, window);
    let std = rolling_std(data, window, 1);

    data.iter()
        .zip(mean.iter().zip(std.iter()))
        .map(|(x, (m, s))| {
            let (x, m, s) = ((*x)?, (*m)?, (*s)?);
            if s == 0.0 {
                Some(0.0)
            } else {
                Some((x - m) / s)
            }
        })
        .collect()
}

/// Value one step ahead: `lead(x)[t] = x[t + 1]`.
pub fn lead(data: &[Option<f64>]) -> Vec<Option<f64>> {
    let mut result: Vec<Option<f64>> = data.iter().skip(1).copied().collect();
    result.push(None);
    result.truncate(data.len());
    result
}
