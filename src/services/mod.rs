pub mod mpesa_service;
pub mod notifier;
pub mod order_service;
pub mod payment_service;
pub mod recommendation;
pub mod shipping;
