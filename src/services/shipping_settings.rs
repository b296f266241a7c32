use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::cart::ShippingRates;
use crate::db::DbPool;
use crate::entities::shipping_settings::{self, Entity as ShippingSettings};
use crate::errors::ServiceError;

/// Plain shipping configuration, detached from the persistence row so the
/// hardcoded fallback never has to fake entity metadata.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ShippingConfig {
    pub free_shipping_threshold: Decimal,
    pub standard_shipping_cost: Decimal,
    pub currency: String,
}

impl ShippingConfig {
    /// Last-resort defaults used when the settings row cannot be fetched.
    pub fn fallback() -> Self {
        Self {
            free_shipping_threshold: dec!(50),
            standard_shipping_cost: dec!(9.99),
            currency: "PEN".to_string(),
        }
    }

    pub fn rates(&self) -> ShippingRates {
        ShippingRates {
            free_shipping_threshold: self.free_shipping_threshold,
            standard_shipping_cost: self.standard_shipping_cost,
        }
    }
}

impl From<&shipping_settings::Model> for ShippingConfig {
    fn from(model: &shipping_settings::Model) -> Self {
        Self {
            free_shipping_threshold: model.free_shipping_threshold,
            standard_shipping_cost: model.standard_shipping_cost,
            currency: model.currency.clone(),
        }
    }
}

/// Result of resolving the shipping settings. `fallback_reason` is set when
/// the database could not provide an active row and the hardcoded defaults
/// were used instead; resolution itself never fails.
#[derive(Clone, Debug, Serialize, ToSchema)]
pub struct SettingsResolution {
    pub config: ShippingConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_reason: Option<String>,
}

/// Request payload for updating the active shipping settings.
#[derive(Clone, Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateShippingSettingsRequest {
    pub free_shipping_threshold: Option<Decimal>,
    pub standard_shipping_cost: Option<Decimal>,
    #[validate(length(equal = 3, message = "Currency must be a 3-letter ISO code"))]
    pub currency: Option<String>,
}

/// Resolves and administers the shipping-settings singleton.
#[derive(Clone)]
pub struct ShippingSettingsService {
    db: Arc<DbPool>,
}

impl ShippingSettingsService {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    async fn active_row(&self) -> Result<Option<shipping_settings::Model>, ServiceError> {
        ShippingSettings::find()
            .filter(shipping_settings::Column::IsActive.eq(true))
            .order_by_desc(shipping_settings::Column::CreatedAt)
            .one(&*self.db)
            .await
            .map_err(ServiceError::DatabaseError)
    }

    /// Resolves the effective shipping configuration. Falls back to the
    /// hardcoded defaults on any fetch failure and surfaces the reason
    /// instead of erroring, so checkout keeps working through DB trouble.
    #[instrument(skip(self))]
    pub async fn resolve(&self) -> SettingsResolution {
        match self.active_row().await {
            Ok(Some(model)) => SettingsResolution {
                config: ShippingConfig::from(&model),
                fallback_reason: None,
            },
            Ok(None) => {
                warn!("No active shipping settings row; using fallback defaults");
                SettingsResolution {
                    config: ShippingConfig::fallback(),
                    fallback_reason: Some("no active shipping settings configured".to_string()),
                }
            }
            Err(e) => {
                error!("Failed to fetch shipping settings: {}", e);
                SettingsResolution {
                    config: ShippingConfig::fallback(),
                    fallback_reason: Some(format!("settings fetch failed: {}", e)),
                }
            }
        }
    }

    /// Returns the persisted active settings row, erroring when none exists.
    #[instrument(skip(self))]
    pub async fn get(&self) -> Result<shipping_settings::Model, ServiceError> {
        self.active_row()
            .await?
            .ok_or_else(|| ServiceError::NotFound("No active shipping settings".to_string()))
    }

    /// Updates the active settings row in place. Requires a loaded row:
    /// updating without one is an invalid operation, not an implicit insert.
    #[instrument(skip(self, request))]
    pub async fn update(
        &self,
        request: UpdateShippingSettingsRequest,
    ) -> Result<shipping_settings::Model, ServiceError> {
        request.validate()?;

        if let Some(threshold) = request.free_shipping_threshold {
            if threshold < Decimal::ZERO {
                return Err(ServiceError::ValidationError(
                    "Free shipping threshold cannot be negative".to_string(),
                ));
            }
        }
        if let Some(cost) = request.standard_shipping_cost {
            if cost < Decimal::ZERO {
                return Err(ServiceError::ValidationError(
                    "Standard shipping cost cannot be negative".to_string(),
                ));
            }
        }

        let existing = self.active_row().await?.ok_or_else(|| {
            ServiceError::InvalidOperation("no settings loaded".to_string())
        })?;

        let mut active: shipping_settings::ActiveModel = existing.into();
        if let Some(threshold) = request.free_shipping_threshold {
            active.free_shipping_threshold = Set(threshold);
        }
        if let Some(cost) = request.standard_shipping_cost {
            active.standard_shipping_cost = Set(cost);
        }
        if let Some(currency) = request.currency {
            active.currency = Set(currency.to_ascii_uppercase());
        }
        active.updated_at = Set(Some(Utc::now()));

        active
            .update(&*self.db)
            .await
            .map_err(ServiceError::DatabaseError)
    }

    /// Seeds the singleton row when the table is empty. Used at startup so a
    /// fresh install begins from the documented defaults.
    #[instrument(skip(self))]
    pub async fn seed_defaults(&self) -> Result<shipping_settings::Model, ServiceError> {
        if let Some(existing) = self.active_row().await? {
            return Ok(existing);
        }

        let defaults = ShippingConfig::fallback();
        let model = shipping_settings::ActiveModel {
            id: Set(Uuid::new_v4()),
            free_shipping_threshold: Set(defaults.free_shipping_threshold),
            standard_shipping_cost: Set(defaults.standard_shipping_cost),
            currency: Set(defaults.currency),
            is_active: Set(true),
            ..Default::default()
        };

        model
            .insert(&*self.db)
            .await
            .map_err(ServiceError::DatabaseError)
    }

    /// Whether an order at this subtotal ships free.
    pub async fn is_free_shipping(&self, subtotal: Decimal) -> bool {
        let resolution = self.resolve().await;
        subtotal >= resolution.config.free_shipping_threshold
    }

    /// How much more the customer must add to reach free shipping.
    pub async fn amount_needed_for_free_shipping(&self, subtotal: Decimal) -> Decimal {
        let resolution = self.resolve().await;
        (resolution.config.free_shipping_threshold - subtotal).max(Decimal::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_defaults_match_documented_values() {
        let config = ShippingConfig::fallback();
        assert_eq!(config.free_shipping_threshold, dec!(50));
        assert_eq!(config.standard_shipping_cost, dec!(9.99));
        assert_eq!(config.currency, "PEN");
    }

    #[test]
    fn rates_carry_over() {
        let rates = ShippingConfig::fallback().rates();
        assert_eq!(rates.free_shipping_threshold, dec!(50));
        assert_eq!(rates.standard_shipping_cost, dec!(9.99));
    }
}
