pub mod analysis;
pub mod webhooks;
