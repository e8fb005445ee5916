//! Middlewares: `Executable` wrappers that observe or constrain another
//! node's execution without being part of the declared graph shape
//! themselves. `BudgetManager` and `PositionSwap` are the two concrete
//! middlewares the core ships; both are registered with
//! [`crate::registry::Registry::register_middleware_factory`] so a
//! compiled spec can apply either to any node.

pub mod budget;
pub mod position_swap;

pub use budget::BudgetManager;
pub use position_swap::PositionSwap;
