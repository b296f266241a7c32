// Core services
pub mod orders;
pub mod shipping_settings;

pub use orders::OrderService;
pub use shipping_settings::ShippingSettingsService;
