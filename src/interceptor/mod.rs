// SPDX-License-Identifier: Apache-2.0

//! Statement Interceptor
//!
//! Everything between a caller's statement and the engine:
//! - **Policy**: the per-handle rule set
//! - **Evaluator**: turns a classified statement and a policy into a verdict
//! - **Probe**: scratch-table DELETE simulation against the live connection
//! - **Gate**: transaction handling, execution and error-mode filtering

pub mod evaluator;
pub mod gate;
pub mod policy;
pub mod probe;

pub use evaluator::{evaluate, DeleteSimulation, RowProbe};
pub use gate::{settle, Gate};
pub use policy::Policy;
pub use probe::ScratchProbe;
