use ndarray::{Array1, ArrayView1};

use crate::error::EnvError;

use super::env::TradingEnv;

impl TradingEnv {
    /// Minute, hour and day rows, then the portfolio summary, then progress.
    ///
    /// Only the market rows depend on `normalize`. The summary is always
    /// `[cash / initial, avg_buy_price / (2 * close)]`, each clipped to [0, 1],
    /// so an average buy at the current close reads 0.5 and no position reads 0.
    pub(super) fn observation(&self) -> Result<Array1<f32>, EnvError> {
        let data = self.data();
        let alignment = self.alignment();
        let normalize = self.config().normalize;
        let portfolio = self.portfolio();

        let mut obs = Vec::with_capacity(self.observation_space().shape);

        push_block(&mut obs, data.minute.row(alignment.minute), normalize);
        push_block(&mut obs, data.hour.row(alignment.hour), normalize);
        push_block(&mut obs, data.day.row(alignment.day), normalize);

        obs.push(cash_fraction(portfolio.cash_balance, self.initial_balance()) as f32);
        obs.push(avg_price_ratio(portfolio.avg_buy_price, self.current_price()) as f32);

        obs.push(self.progress() as f32);

        if let Some(position) = obs.iter().position(|value| !value.is_finite()) {
            return Err(EnvError::NonFiniteObservation { position });
        }

        debug_assert_eq!(obs.len(), self.observation_space().shape);
        Ok(Array1::from_vec(obs))
    }
}

fn cash_fraction(cash: f64, initial_balance: f64) -> f64 {
    if initial_balance > 0.0 {
        (cash / initial_balance).clamp(0.0, 1.0)
    } else {
        0.0
    }
}

fn avg_price_ratio(avg_buy_price: f64, price: f64) -> f64 {
    if avg_buy_price <= 0.0 || !(price.is_finite() && price > 0.0) {
        return 0.0;
    }
    (avg_buy_price / (2.0 * price)).clamp(0.0, 1.0)
}

fn push_block(obs: &mut Vec<f32>, block: ArrayView1<'_, f64>, normalize: bool) {
    if !normalize {
        obs.extend(block.iter().map(|value| *value as f32));
        return;
    }

    let max_abs = block.iter().fold(0.0f64, |max, value| max.max(value.abs()));
    // an all-zero block stays as is
    let scale = if max_abs > 0.0 && max_abs.is_finite() {
        max_abs
    } else {
        1.0
    };

    obs.extend(
        block
            .iter()
            .map(|value| (value / scale).clamp(-1.0, 1.0) as f32),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn blocks_are_max_abs_scaled() {
        let mut obs = Vec::new();
        push_block(&mut obs, array![2.0, -4.0, 1.0].view(), true);

        assert_eq!(obs, vec![0.5, -1.0, 0.25]);
    }

    #[test]
    fn portfolio_summary_components_are_independent() {
        assert_eq!(cash_fraction(900.0, 1000.0), 0.9);
        assert_eq!(cash_fraction(0.0, 0.0), 0.0);

        assert_eq!(avg_price_ratio(0.0, 60_000.0), 0.0);
        assert_eq!(avg_price_ratio(60_000.0, 60_000.0), 0.5);
        assert_eq!(avg_price_ratio(30_000.0, 60_000.0), 0.25);
        assert_eq!(avg_price_ratio(200_000.0, 60_000.0), 1.0);
        assert_eq!(avg_price_ratio(60_000.0, 0.0), 0.0);
    }

    #[test]
    fn zero_block_is_left_unscaled() {
        let mut obs = Vec::new();
        push_block(&mut obs, array![0.0, 0.0].view(), true);

        assert_eq!(obs, vec![0.0, 0.0]);
    }

    #[test]
    fn raw_blocks_without_normalisation() {
        let mut obs = Vec::new();
        push_block(&mut obs, array![62_000.5, -3.0].view(), false);

        assert_eq!(obs, vec![62_000.5, -3.0]);
    }
}
