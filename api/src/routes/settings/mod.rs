pub mod llm_key_request;
pub mod llm_key_route;
