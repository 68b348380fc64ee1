//! Marketplace ports
//!
//! The core never speaks a marketplace's HTTP dialect itself. Each
//! marketplace is reached through an injected [`MarketplaceGateway`]; local
//! order data comes from an [`OrderBook`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use core_kernel::{CompanyId, DomainPort, Marketplace, PortError};

use crate::error::ActionError;

/// Order as the marketplace reports it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteOrder {
    pub order_number: String,
    pub status: String,
    pub shipment_package_id: Option<String>,
    pub cargo_provider: Option<String>,
    pub cargo_tracking_number: Option<String>,
}

/// A fetched shipping label
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelDocument {
    pub content: Vec<u8>,
    pub content_type: String,
}

impl LabelDocument {
    pub fn pdf(content: Vec<u8>) -> Self {
        Self {
            content,
            content_type: "application/pdf".to_string(),
        }
    }
}

#[async_trait]
pub trait MarketplaceGateway: DomainPort {
    fn marketplace(&self) -> Marketplace;

    async fn get_order_by_number(&self, order_number: &str) -> Result<RemoteOrder, PortError>;

    async fn fetch_label(&self, shipment_package_id: &str) -> Result<LabelDocument, PortError>;

    async fn update_cargo_provider(
        &self,
        shipment_package_id: &str,
        cargo_provider_code: &str,
    ) -> Result<(), PortError>;
}

/// Configured gateways by marketplace
#[derive(Default, Clone)]
pub struct GatewayDirectory {
    gateways: HashMap<Marketplace, Arc<dyn MarketplaceGateway>>,
}

impl GatewayDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, gateway: Arc<dyn MarketplaceGateway>) -> Self {
        self.gateways.insert(gateway.marketplace(), gateway);
        self
    }

    pub fn get(&self, marketplace: Marketplace) -> Result<Arc<dyn MarketplaceGateway>, ActionError> {
        self.gateways
            .get(&marketplace)
            .cloned()
            .ok_or_else(|| ActionError::config_missing(format!("{marketplace} integration is not configured")))
    }

    pub fn marketplaces(&self) -> Vec<Marketplace> {
        let mut all: Vec<_> = self.gateways.keys().copied().collect();
        all.sort();
        all
    }
}

/// Back-office copy of a marketplace order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalOrder {
    pub company_id: CompanyId,
    pub marketplace: Marketplace,
    pub order_number: String,
    pub status: String,
    pub shipment_package_id: Option<String>,
    pub cargo_provider: Option<String>,
    pub cargo_tracking_number: Option<String>,
}

impl LocalOrder {
    pub fn new(
        company_id: CompanyId,
        marketplace: Marketplace,
        order_number: impl Into<String>,
        status: impl Into<String>,
    ) -> Self {
        Self {
            company_id,
            marketplace,
            order_number: order_number.into(),
            status: status.into(),
            shipment_package_id: None,
            cargo_provider: None,
            cargo_tracking_number: None,
        }
    }

    pub fn with_shipment_package(mut self, package_id: impl Into<String>) -> Self {
        self.shipment_package_id = Some(package_id.into());
        self
    }

    /// Takes over what the marketplace reports, keeping known values it omits
    pub fn refresh_from(&mut self, remote: &RemoteOrder) {
        self.status = remote.status.clone();
        if remote.shipment_package_id.is_some() {
            self.shipment_package_id = remote.shipment_package_id.clone();
        }
        if remote.cargo_provider.is_some() {
            self.cargo_provider = remote.cargo_provider.clone();
        }
        if remote.cargo_tracking_number.is_some() {
            self.cargo_tracking_number = remote.cargo_tracking_number.clone();
        }
    }
}

#[async_trait]
pub trait OrderBook: Send + Sync {
    async fn find(
        &self,
        company_id: CompanyId,
        marketplace: Marketplace,
        order_number: &str,
    ) -> Result<Option<LocalOrder>, ActionError>;

    async fn save(&self, order: LocalOrder) -> Result<(), ActionError>;

    /// Sets the cargo provider on every order of the package; returns how many
    async fn set_cargo_provider(
        &self,
        company_id: CompanyId,
        shipment_package_id: &str,
        cargo_provider_code: &str,
    ) -> Result<usize, ActionError>;
}

type OrderKey = (CompanyId, Marketplace, String);

#[derive(Default)]
pub struct MemoryOrderBook {
    orders: Mutex<HashMap<OrderKey, LocalOrder>>,
}

impl MemoryOrderBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_orders(orders: impl IntoIterator<Item = LocalOrder>) -> Self {
        let book = Self::new();
        {
            let mut map = book.orders.lock().unwrap_or_else(|e| e.into_inner());
            for order in orders {
                map.insert((order.company_id, order.marketplace, order.order_number.clone()), order);
            }
        }
        book
    }
}

#[async_trait]
impl OrderBook for MemoryOrderBook {
    async fn find(
        &self,
        company_id: CompanyId,
        marketplace: Marketplace,
        order_number: &str,
    ) -> Result<Option<LocalOrder>, ActionError> {
        let orders = self.orders.lock().unwrap_or_else(|e| e.into_inner());
        Ok(orders
            .get(&(company_id, marketplace, order_number.to_string()))
            .cloned())
    }

    async fn save(&self, order: LocalOrder) -> Result<(), ActionError> {
        let mut orders = self.orders.lock().unwrap_or_else(|e| e.into_inner());
        orders.insert((order.company_id, order.marketplace, order.order_number.clone()), order);
        Ok(())
    }

    async fn set_cargo_provider(
        &self,
        company_id: CompanyId,
        shipment_package_id: &str,
        cargo_provider_code: &str,
    ) -> Result<usize, ActionError> {
        let mut orders = self.orders.lock().unwrap_or_else(|e| e.into_inner());
        let mut updated = 0;
        for order in orders.values_mut() {
            if order.company_id == company_id && order.shipment_package_id.as_deref() == Some(shipment_package_id) {
                order.cargo_provider = Some(cargo_provider_code.to_string());
                updated += 1;
            }
        }
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ActionErrorCode;

    #[test]
    fn test_missing_gateway_is_config_error() {
        let directory = GatewayDirectory::new();
        let err = directory.get(Marketplace::Pazarama).err().unwrap();
        assert_eq!(err.code(), ActionErrorCode::ConfigMissing);
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_refresh_keeps_known_values() {
        let mut order = LocalOrder::new(CompanyId::new(), Marketplace::N11, "1001", "Created")
            .with_shipment_package("PKG-1");
        order.refresh_from(&RemoteOrder {
            order_number: "1001".into(),
            status: "Shipped".into(),
            shipment_package_id: None,
            cargo_provider: Some("YK".into()),
            cargo_tracking_number: None,
        });
        assert_eq!(order.status, "Shipped");
        assert_eq!(order.shipment_package_id.as_deref(), Some("PKG-1"));
        assert_eq!(order.cargo_provider.as_deref(), Some("YK"));
    }

    #[tokio::test]
    async fn test_set_cargo_provider_by_package() {
        let company = CompanyId::new();
        let book = MemoryOrderBook::with_orders([
            LocalOrder::new(company, Marketplace::Trendyol, "1", "Created").with_shipment_package("P"),
            LocalOrder::new(company, Marketplace::Trendyol, "2", "Created").with_shipment_package("Q"),
        ]);
        assert_eq!(book.set_cargo_provider(company, "P", "ARAS").await.unwrap(), 1);
        let order = book.find(company, Marketplace::Trendyol, "1").await.unwrap().unwrap();
        assert_eq!(order.cargo_provider.as_deref(), Some("ARAS"));
    }
}
