use rust_decimal::Decimal;

/// Illustrative price per million input tokens.
pub const INPUT_PRICE_PER_MILLION: Decimal = Decimal::from_parts(15, 0, 0, false, 2);
/// Illustrative price per million output tokens.
pub const OUTPUT_PRICE_PER_MILLION: Decimal = Decimal::from_parts(60, 0, 0, false, 2);

const TOKENS_PER_MILLION: Decimal = Decimal::from_parts(1_000_000, 0, 0, false, 0);

/// Simulated token pricing. Disabled estimators always return zero.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CostEstimator {
    enabled: bool,
}

impl CostEstimator {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    pub fn enabled() -> Self {
        Self::new(true)
    }

    pub fn disabled() -> Self {
        Self::new(false)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn cost(&self, input_tokens: u64, output_tokens: u64) -> Decimal {
        if !self.enabled {
            return Decimal::ZERO;
        }

        (Decimal::from(input_tokens) * INPUT_PRICE_PER_MILLION
            + Decimal::from(output_tokens) * OUTPUT_PRICE_PER_MILLION)
            / TOKENS_PER_MILLION
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::CostEstimator;

    #[test]
    fn enabled_estimator_prices_input_and_output_tokens() {
        let estimator = CostEstimator::enabled();

        assert_eq!(estimator.cost(1200, 300), Decimal::new(36, 5));
        assert_eq!(estimator.cost(1_000_000, 0), Decimal::new(15, 2));
        assert_eq!(estimator.cost(0, 1_000_000), Decimal::new(60, 2));
        assert_eq!(estimator.cost(0, 0), Decimal::ZERO);
    }

    #[test]
    fn disabled_estimator_is_always_zero() {
        let estimator = CostEstimator::disabled();

        for (input, output) in [(0, 0), (1200, 300), (u32::MAX as u64, 7), (1, u32::MAX as u64)] {
            assert_eq!(estimator.cost(input, output), Decimal::ZERO);
        }
        assert!(!CostEstimator::default().is_enabled());
    }
}
