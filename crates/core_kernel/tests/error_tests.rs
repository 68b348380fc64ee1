//! Tests for core_kernel error types

use core_kernel::error::CoreError;
use core_kernel::money::MoneyError;
use core_kernel::{Marketplace, PortError};

#[test]
fn test_core_error_validation() {
    let error = CoreError::validation("Invalid input");

    match error {
        CoreError::Validation(msg) => assert_eq!(msg, "Invalid input"),
        _ => panic!("Expected Validation error"),
    }
}

#[test]
fn test_unknown_marketplace_is_validation_error() {
    let error = "AMAZON".parse::<Marketplace>().unwrap_err();

    assert!(matches!(error, CoreError::Validation(_)));
    assert!(error.to_string().contains("AMAZON"));
}

#[test]
fn test_core_error_from_money_error() {
    let money_error = MoneyError::UnknownCurrency("XYZ".to_string());
    let core_error: CoreError = money_error.into();

    assert!(matches!(core_error, CoreError::Money(_)));
    assert!(core_error.to_string().contains("XYZ"));
}

#[test]
fn test_port_error_validation_message() {
    let error = PortError::validation("shipmentPackageId must not be empty");

    match &error {
        PortError::Validation { message } => assert!(message.contains("shipmentPackageId")),
        _ => panic!("Expected Validation error"),
    }
    assert_eq!(error.to_string(), "Validation error: shipmentPackageId must not be empty");
}

#[test]
fn test_port_error_unauthorized_message() {
    let error = PortError::unauthorized("invalid api key");
    assert!(error.to_string().contains("invalid api key"));
}
