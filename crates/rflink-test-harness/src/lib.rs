//! rflink-test-harness: Test utilities for rflink-bridge.
//!
//! This crate provides [`MockTransport`] for deterministic unit testing of
//! the command queue, the packet router and the gateway controller without
//! an RFLink gateway attached.

pub mod mock_serial;

pub use mock_serial::{MockHandle, MockTransport, SentFrame};
