/// Middleware modules for the API server
///
/// - `active_requests`: in-flight request gauge reported by `/health`
/// - `correlation`: per-request correlation id from `X-Trace-Id`

pub mod active_requests;
pub mod correlation;
