//! Store Comprehensive Test Suite
//!
//! Cross-crate properties of the public `tallydb` API.
//!
//! ## Test Groups
//!
//! - **identity**: canonical references and sequences
//! - **memory**: write/read/free and relationship bookkeeping
//! - **decisions**: sequence order, rejected requests, rollback
//! - **matchmaking**: forward references and insertion-order independence
//! - **restart**: replaying the log reproduces memory
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test --test store_comprehensive
//! ```

mod test_utils;

mod decisions;
mod identity;
mod matchmaking;
mod memory;
mod restart;
