//! A small S-expression interpreter with a precise mark-and-sweep collector.
//!
//! Every value lives in a [`heap::Heap`] and is referred to by a
//! [`value::CellId`] handle. A [`eval::Machine`] owns one heap, the global
//! environment and the evaluator's root stack; machines share nothing, so
//! several can run side by side.
//!
//! ```no_run
//! use cellisp::{Machine, MachineConfig};
//!
//! let mut m = Machine::new(MachineConfig::default())?;
//! assert_eq!(m.eval_to_string("(add 1 2)")?, "3");
//! # Ok::<(), cellisp::LispError>(())
//! ```

pub mod config;
pub mod env;
pub mod error;
pub mod eval;
pub mod heap;
pub mod primitives;
pub mod printer;
pub mod reader;
pub mod stream;
pub mod value;

pub use config::MachineConfig;
pub use error::{LispError, LispResult};
pub use eval::Machine;
pub use value::{Cell, CellId, NativeFn};
