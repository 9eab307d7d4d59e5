// SPDX-License-Identifier: Apache-2.0
//! Record model, path accessor, BPQL condition language, and
//! regex normalizer for the IMS event gateway.
//!
//! These three pieces underpin the enrichment engine, maintenance
//! evaluator, and correlation tagger in `ims-rules`.

pub mod bpql;
pub mod error;
pub mod path;
pub mod regex_fix;
pub mod validation;

pub use bpql::{Atom, Condition};
pub use error::KernelError;
pub use path::Record;
pub use validation::is_integration_key;
