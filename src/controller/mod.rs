//! # Controller Module
//!
//! Route entries backed by a type's annotated operations.
//!
//! A [`ControllerRoute`] consumes an externally extracted operation list
//! (name, verb, route string, optional compiled regex, invoker) and resolves
//! incoming requests to the first operation whose verb and normalized
//! sub-path match, scanning shortest declared route first. Handlers are built
//! lazily on first use and cached by operation name; REST-style `:name`
//! segments are extracted positionally from the request path.

mod core;

pub use core::{ControllerRoute, OpInvoker, OperationMeta};
