use configuration::ClassificationBands;
use core_types::Classification;
use rust_decimal::Decimal;

/// Labels an absolute elasticity. Values on either band edge are unitary.
pub fn classify(abs_value: Decimal, bands: &ClassificationBands) -> Classification {
    if abs_value > bands.elastic_above {
        Classification::Elastic
    } else if abs_value < bands.inelastic_below {
        Classification::Inelastic
    } else {
        Classification::Unitary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_band_edges_are_unitary() {
        let bands = ClassificationBands::default();
        assert_eq!(classify(dec!(0.95), &bands), Classification::Unitary);
        assert_eq!(classify(dec!(1.05), &bands), Classification::Unitary);
        assert_eq!(classify(dec!(1), &bands), Classification::Unitary);
        assert_eq!(classify(dec!(0.9499), &bands), Classification::Inelastic);
        assert_eq!(classify(dec!(1.0501), &bands), Classification::Elastic);
    }
}
