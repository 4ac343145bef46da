use crate::models::{Candle, MacdValue, TechnicalIndicatorSet, TrendDirection};

/// Below this many closes the engine degrades instead of failing.
const MIN_CLOSES: usize = 20;
const RSI_PERIOD: usize = 14;
const MOMENTUM_LOOKBACK: usize = 5;

/// Derive the full indicator set from an ordered (oldest→newest) price
/// history. Never fails: with fewer than 20 usable closes it returns a
/// neutral degraded set.
pub fn compute(history: &[Candle]) -> TechnicalIndicatorSet {
    let closes: Vec<f64> = history
        .iter()
        .map(|c| c.close)
        .filter(|close| *close > 0.0)
        .collect();

    if closes.len() < MIN_CLOSES {
        return degraded(&closes);
    }

    let ma20 = sma(&closes, 20);
    let ma50 = sma(&closes, 50.min(closes.len()));
    let ma200 = sma(&closes, 200.min(closes.len()));
    let rsi = rsi(&closes, RSI_PERIOD);
    let macd = macd(&closes);
    let support = min_of(&closes);
    let resistance = max_of(&closes);
    let volatility = volatility(&closes);

    let current_price = closes[closes.len() - 1];
    let trend = if current_price > ma20 && ma20 > ma50 {
        TrendDirection::Uptrend
    } else if current_price < ma20 && ma20 < ma50 {
        TrendDirection::Downtrend
    } else {
        TrendDirection::Neutral
    };

    let momentum = current_price - closes[closes.len().saturating_sub(MOMENTUM_LOOKBACK)];

    TechnicalIndicatorSet {
        rsi,
        macd,
        ma20,
        ma50,
        ma200,
        support,
        resistance,
        trend,
        volatility,
        momentum,
    }
}

fn degraded(closes: &[f64]) -> TechnicalIndicatorSet {
    let last = closes.last().copied().unwrap_or(0.0);
    TechnicalIndicatorSet {
        rsi: 50.0,
        macd: MacdValue {
            line: 0.0,
            signal: 0.0,
            histogram: 0.0,
        },
        ma20: last,
        ma50: last,
        ma200: last,
        support: min_of(closes),
        resistance: max_of(closes),
        trend: TrendDirection::Neutral,
        volatility: 0.0,
        momentum: 0.0,
    }
}

fn min_of(values: &[f64]) -> f64 {
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    if min.is_finite() {
        min
    } else {
        0.0
    }
}

fn max_of(values: &[f64]) -> f64 {
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if max.is_finite() {
        max
    } else {
        0.0
    }
}

/// Simple moving average over the trailing `period` values.
pub fn sma(data: &[f64], period: usize) -> f64 {
    if data.is_empty() || period == 0 {
        return 0.0;
    }
    if data.len() < period {
        return data.iter().sum::<f64>() / data.len() as f64;
    }
    data[data.len() - period..].iter().sum::<f64>() / period as f64
}

/// Wilder-style single-pass RSI over the first `period` closes' deltas
/// (no re-smoothing). With zero losses the ratio divides by one, so an
/// all-gains series approaches 100 rather than hitting a zero divisor.
pub fn rsi(data: &[f64], period: usize) -> f64 {
    if data.len() < period {
        return 50.0;
    }

    let mut gains = 0.0;
    let mut losses = 0.0;
    for i in 1..period {
        let change = data[i] - data[i - 1];
        if change > 0.0 {
            gains += change;
        } else {
            losses -= change;
        }
    }

    gains /= period as f64;
    losses /= period as f64;

    let rs = if losses == 0.0 { gains } else { gains / losses };
    100.0 - (100.0 / (1.0 + rs))
}

/// EMA of the whole series, seeded from the first value.
pub fn ema(data: &[f64], period: usize) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    let k = 2.0 / (period as f64 + 1.0);
    data.iter()
        .skip(1)
        .fold(data[0], |ema, &value| value * k + ema * (1.0 - k))
}

/// EMA of the prefix ending at `index`; plain mean until a full period
/// is available.
fn ema_at(data: &[f64], index: usize, period: usize) -> f64 {
    if index < period {
        return data[..=index].iter().sum::<f64>() / (index + 1) as f64;
    }

    let k = 2.0 / (period as f64 + 1.0);
    let mut ema = data[..period].iter().sum::<f64>() / period as f64;
    for &value in &data[period..=index] {
        ema = value * k + ema * (1.0 - k);
    }
    ema
}

/// MACD line = EMA12 − EMA26; signal = 9-period EMA of the MACD series.
pub fn macd(data: &[f64]) -> MacdValue {
    let line = ema(data, 12) - ema(data, 26);

    let macd_series: Vec<f64> = (0..data.len())
        .map(|i| ema_at(data, i, 12) - ema_at(data, i, 26))
        .collect();
    let signal = ema_at(&macd_series, macd_series.len() - 1, 9);

    MacdValue {
        line,
        signal,
        histogram: line - signal,
    }
}

/// Population standard deviation of closes.
pub fn volatility(data: &[f64]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    let n = data.len() as f64;
    let mean = data.iter().sum::<f64>() / n;
    let variance = data.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    variance.sqrt()
}
