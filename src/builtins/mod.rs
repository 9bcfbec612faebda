//! # Built-in Functions and Methods
//!
//! The closed built-in surface registered on every context:
//!
//! - **[functions]** (4): `identity`, `type`, `log`, `json`
//! - **[methods]** (22): conversion (`str`, `num`), measurement
//!   (`len`, `empty`), strings (`trim`, `split`, `join`, `lines`,
//!   `contains`, `matches`), access (`first`, `last`, `at`),
//!   comparison (`eq`, `ne`, `lt`, `gt`, `le`, `ge`), and dicts
//!   (`keys`, `values`, `entries`)
//!
//! Hosts may override any built-in function by registering their own
//! under the same name.

use crate::context::Context;

pub mod functions;
pub mod methods;

pub use functions::register as register_functions;
pub use methods::register as register_methods;

/// Register the full built-in surface on a context.
pub fn register_builtins(ctx: &mut Context) {
    register_functions(ctx);
    register_methods(ctx);
}
