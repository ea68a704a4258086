//! Concrete [`crate::component::Component`] implementations shipped with the
//! engine itself, rather than supplied by a caller: [`Router`] and
//! [`IfElse`] ride the execution-directive side-channel as ordinary
//! components rather than scheduler special-cases.

mod if_else;
mod router;

pub use if_else::{Condition, IfElse, IfElseOperator, LogicOp};
pub use router::{NoMatchingRouteError, RouteCondition, RouteOperator, Router};
