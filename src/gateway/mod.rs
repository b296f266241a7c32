pub mod mercadopago;
pub mod paypal;

use chrono::Utc;
use rand::Rng;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;
use validator::Validate;

use crate::cart::{CartItem, CartTotals};

pub use mercadopago::MercadoPagoClient;
pub use paypal::PayPalClient;

/// Supported payment providers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum PaymentProvider {
    PayPal,
    MercadoPago,
}

impl PaymentProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentProvider::PayPal => "paypal",
            PaymentProvider::MercadoPago => "mercadopago",
        }
    }
}

impl fmt::Display for PaymentProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Customer identity attached to a checkout.
#[derive(Clone, Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct CustomerInfo {
    #[validate(email(message = "Invalid customer email"))]
    pub email: String,
    #[validate(length(min = 1, message = "Customer name is required"))]
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

/// Shipping destination as entered at checkout.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ShippingAddress {
    pub street: String,
    pub city: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub postal_code: Option<String>,
    pub country: String,
}

/// Where the provider should send the customer after the hosted flow.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ReturnUrls {
    pub success: String,
    pub failure: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending: Option<String>,
}

/// Everything the provider payload builders need, assembled once per
/// checkout. Building payloads from it is a pure transformation.
#[derive(Clone, Debug)]
pub struct CheckoutDraft {
    pub items: Vec<CartItem>,
    pub totals: CartTotals,
    pub currency: String,
    pub customer: CustomerInfo,
    pub shipping_address: Option<ShippingAddress>,
    pub return_urls: ReturnUrls,
}

/// Serializes a monetary amount for the wire: always a plain decimal string
/// with exactly two fraction digits, never a float.
pub fn format_amount(amount: Decimal) -> String {
    format!("{:.2}", amount.round_dp(2))
}

/// Storefront-side reference correlating provider objects with this checkout:
/// millisecond timestamp plus a random suffix.
pub fn generate_external_reference() -> String {
    let suffix: u32 = rand::thread_rng().gen_range(1000..10000);
    format!("{}-{}", Utc::now().timestamp_millis(), suffix)
}
