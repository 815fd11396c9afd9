// Mapping Document Module
//
// Declarative V2 endpoint definitions and their serving lifecycle:
// - YAML document schema: endpoint, upstream calls, field mappings
// - Structural validation with hard errors and advisory warnings
// - Filesystem store for loading and persisting documents
// - Hot-reloadable registry with snapshot swapping and route lookup

pub mod loader;
pub mod store;
pub mod types;
pub mod validation;
