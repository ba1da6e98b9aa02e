/*!
 * API Layer
 * Structured responses over the stream registry and snapshot fetcher
 */

pub mod facade;
pub mod response;

pub use facade::StreamApi;
pub use response::ToolResponse;
