mod http_transport;
pub mod sigv4;

pub use http_transport::HttpTransport;
pub use sigv4::{sign_request, AwsCredentials};
