pub mod github_webhook_route;
pub mod signature;
