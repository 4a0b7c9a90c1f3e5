pub mod reviews_route;
