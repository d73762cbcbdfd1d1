// Test Helpers Module - In-Process Store Backend
//
// Shared testing utilities for unit and integration tests. The in-memory
// store implements the full StoreBackend contract so cache semantics can be
// exercised without a live Redis.

pub mod memory_store;

pub use memory_store::MemoryStore;
