//! Self-correcting generator of bank-statement parsers.
//!
//! An agent plans a parser for one target bank, asks a text-generation
//! collaborator for code, runs the code against a sample statement and
//! compares its table with a reference CSV. Failures are fed back into the
//! next generation attempt until the output matches or the attempt budget
//! runs out.
//!
//! - **[`core`]**: pure logic (state, decision, oracle, verdicts). No I/O.
//! - **[`io`]**: filesystem, child processes and generation backends.
//!
//! [`controller`] ties the stages ([`prepare`], [`agents`], [`harness`])
//! together.

pub mod agents;
pub mod controller;
pub mod core;
pub mod exit_codes;
pub mod harness;
pub mod io;
pub mod logging;
pub mod prepare;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
