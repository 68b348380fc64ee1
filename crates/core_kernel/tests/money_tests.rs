//! Unit tests for the money helpers

use core_kernel::{round_minor, Currency, MoneyError, VatRate};
use rust_decimal_macros::dec;

mod rounding {
    use super::*;

    #[test]
    fn test_round_minor_half_away_from_zero() {
        assert_eq!(round_minor(dec!(10.005), Currency::TRY), dec!(10.01));
        assert_eq!(round_minor(dec!(-10.005), Currency::TRY), dec!(-10.01));
    }

    #[test]
    fn test_round_minor_keeps_exact_values() {
        assert_eq!(round_minor(dec!(999.25), Currency::TRY), dec!(999.25));
    }
}

mod vat {
    use super::*;

    #[test]
    fn test_default_rate_is_twenty_percent() {
        assert_eq!(VatRate::default().as_percentage(), dec!(20));
    }

    #[test]
    fn test_zero_rate_books_everything_as_net() {
        let rate = VatRate::from_percentage(dec!(0)).unwrap();
        let split = rate.split_gross(dec!(250.40), Currency::TRY);
        assert_eq!(split.net, dec!(250.40));
        assert_eq!(split.vat, dec!(0));
    }

    #[test]
    fn test_ten_percent_rate() {
        let rate = VatRate::from_percentage(dec!(10)).unwrap();
        let split = rate.split_gross(dec!(110), Currency::TRY);
        assert_eq!(split.net, dec!(100.00));
        assert_eq!(split.vat, dec!(10.00));
    }

    #[test]
    fn test_negative_rate_error() {
        let err = VatRate::from_percentage(dec!(-5)).unwrap_err();
        assert_eq!(err, MoneyError::InvalidRate(dec!(-5)));
    }

    #[test]
    fn test_display() {
        assert_eq!(VatRate::STANDARD.to_string(), "20%");
    }
}

mod currency {
    use super::*;

    #[test]
    fn test_display_uses_iso_code() {
        assert_eq!(Currency::TRY.to_string(), "TRY");
        assert_eq!(Currency::EUR.symbol(), "€");
    }

    #[test]
    fn test_parse_trims_and_uppercases() {
        assert_eq!(" usd ".parse::<Currency>().unwrap(), Currency::USD);
    }

    #[test]
    fn test_unknown_currency() {
        assert!(matches!(
            "JPY".parse::<Currency>(),
            Err(MoneyError::UnknownCurrency(_))
        ));
    }
}
