//! Stages backed by the text-generation collaborator.
//!
//! Both stages absorb collaborator failures: they always return a usable
//! [`StateUpdate`](crate::core::state::StateUpdate), carrying a diagnostic in
//! place of real output when the backend fails.

pub mod coder;
pub mod planner;
