pub mod fulfilment;
pub mod http_ingress;

pub use fulfilment::{FulfilmentRequest, FulfilmentResponse, encode_response};
pub use http_ingress::{WebhookConfig, WebhookServer};
