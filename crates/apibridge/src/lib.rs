// Configuration-driven V2 adapter over a legacy V1 API
//
// A mapping document declares each V2 endpoint: which V1 calls to make,
// how to derive their parameters from the inbound request, and how to
// assemble the V1 responses into the V2 response shape. The runtime
// loads documents from a directory, serves them through a dynamic
// dispatcher, and hot-reloads on file changes.

pub mod assemble;
pub mod config;
pub mod mapping;
pub mod orchestrate;
pub mod server;
pub mod transform;
