pub mod checkout;
pub mod orders;
pub mod shipping_settings;
pub mod webhooks;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;
