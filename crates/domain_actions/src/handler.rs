//! Runs a single action against the marketplace
//!
//! The handler knows nothing about idempotency, leases or queues; the
//! executor and the worker wrap it.

use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};

use core_kernel::Clock;

use crate::error::{ActionError, ActionErrorCode};
use crate::gateway::{GatewayDirectory, MarketplaceGateway, OrderBook};
use crate::labels::LabelStore;
use crate::model::{ActionKind, ActionRequest};

pub struct ActionHandler {
    gateways: GatewayDirectory,
    orders: Arc<dyn OrderBook>,
    labels: Arc<LabelStore>,
    clock: Arc<dyn Clock>,
}

impl ActionHandler {
    pub fn new(
        gateways: GatewayDirectory,
        orders: Arc<dyn OrderBook>,
        labels: Arc<LabelStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            gateways,
            orders,
            labels,
            clock,
        }
    }

    /// Runs the action and returns the response payload to cache
    pub async fn handle(&self, request: &ActionRequest) -> Result<Value, ActionError> {
        let gateway = self.gateways.get(request.marketplace)?;
        debug!(
            idempotency_key = %request.idempotency_key,
            marketplace = %request.marketplace,
            action = %request.action,
            "Running marketplace action"
        );

        match request.action {
            ActionKind::RefreshStatus => self.refresh_status(gateway.as_ref(), request).await,
            ActionKind::PrintLabelA4 => self.print_label(gateway.as_ref(), request).await,
            ActionKind::ChangeCargo => self.change_cargo(gateway.as_ref(), request).await,
        }
    }

    async fn refresh_status(
        &self,
        gateway: &dyn MarketplaceGateway,
        request: &ActionRequest,
    ) -> Result<Value, ActionError> {
        let mut order = self
            .orders
            .find(request.company_id, request.marketplace, &request.order_number)
            .await?
            .ok_or_else(|| ActionError::validation(format!("order {} not found", request.order_number)))?;

        let remote = gateway.get_order_by_number(&order.order_number).await?;
        let previous_status = order.status.clone();
        order.refresh_from(&remote);
        let current_status = order.status.clone();
        self.orders.save(order).await?;

        Ok(json!({
            "previousStatus": previous_status,
            "currentStatus": current_status,
            "refreshedAt": self.clock.now(),
        }))
    }

    async fn print_label(
        &self,
        gateway: &dyn MarketplaceGateway,
        request: &ActionRequest,
    ) -> Result<Value, ActionError> {
        let order = self
            .orders
            .find(request.company_id, request.marketplace, &request.order_number)
            .await?;

        let mut package_id = request
            .payload_str("shipmentPackageId")
            .or_else(|| request.payload_str("labelShipmentPackageId"))
            .or_else(|| order.as_ref().and_then(|o| o.shipment_package_id.clone()))
            .unwrap_or_else(|| request.order_number.clone());

        let mut fetched = gateway.fetch_label(&package_id).await;

        // An order number is not always accepted as a package id; resolve the real one once
        let needs_fallback = match &fetched {
            Ok(doc) => doc.content.is_empty(),
            Err(_) => true,
        };
        if needs_fallback && package_id == request.order_number {
            warn!(
                idempotency_key = %request.idempotency_key,
                order_number = %request.order_number,
                "Label fetch by order number failed; resolving shipment package"
            );
            if let Ok(remote) = gateway.get_order_by_number(&request.order_number).await {
                if let Some(real) = remote.shipment_package_id.filter(|p| *p != package_id) {
                    package_id = real;
                    fetched = gateway.fetch_label(&package_id).await;
                }
            }
        }

        let document = fetched?;
        if document.content.is_empty() {
            return Err(ActionError::failed(ActionErrorCode::RemoteApiError, "label document is empty"));
        }

        let label = self
            .labels
            .store(request.company_id, request.marketplace, &package_id, &document)
            .await?;

        info!(
            idempotency_key = %request.idempotency_key,
            shipment_package_id = %package_id,
            sha256 = %label.sha256,
            "Label ready"
        );
        Ok(json!({
            "shipmentPackageId": package_id,
            "storageKey": label.storage_key,
            "sha256": label.sha256,
            "format": "A4",
            "labelReady": true,
            "size": label.size,
        }))
    }

    async fn change_cargo(
        &self,
        gateway: &dyn MarketplaceGateway,
        request: &ActionRequest,
    ) -> Result<Value, ActionError> {
        let (Some(package_id), Some(provider_code)) = (
            request.payload_str("shipmentPackageId"),
            request.payload_str("cargoProviderCode"),
        ) else {
            return Err(ActionError::validation("shipmentPackageId and cargoProviderCode are required"));
        };

        gateway.update_cargo_provider(&package_id, &provider_code).await?;
        let updated_orders = self
            .orders
            .set_cargo_provider(request.company_id, &package_id, &provider_code)
            .await?;

        Ok(json!({
            "shipmentPackageId": package_id,
            "cargoProviderCode": provider_code,
            "updated": true,
            "localOrdersUpdated": updated_orders,
        }))
    }
}
