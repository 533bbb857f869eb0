//! Integration tests for the delivery manager.
//!
//! - `harness.rs`      - mock endpoint, recording delegate, and test harness
//! - `outcomes.rs`     - upload outcome handling (success, discard, retry)
//! - `durability.rs`   - records survive restarts and drain afterwards
//! - `single_flight.rs`- at most one upload in flight
//! - `sign_out.rs`     - sign-out wipes queue and credentials
//! - `session_gate.rs` - nothing moves before the credential store unlocks
//! - `accounts.rs`     - sign-in, stored credentials, account generation
