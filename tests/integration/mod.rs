//! Integration test suite for dagflow.
//!
//! These tests run coordinators against a shared in-memory store and
//! verify that the transaction layer, dispatch queues and reactor work
//! together correctly.
//!
//! # Test Categories
//!
//! - `workflow_e2e`: Full workflow execution, failure and conservation
//! - `dispatch_order`: Priority ordering, priority bands and type routing
//! - `pause_release`: Pausing and releasing workflows
//! - `cleanup`: Cleanup, abandonment and construction rejection
//! - `recovery`: Ownership tracking and crash recovery
//! - `fault_injection`: Exceptions surfaced from failing operations
//! - `performance`: Many workflows across several processors


mod dispatch_order;
mod fault_injection;
mod pause_release;
mod performance;
mod recovery;
mod workflow_e2e;
