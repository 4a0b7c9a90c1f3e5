pub mod connect_repository_request;
pub mod repositories_route;
