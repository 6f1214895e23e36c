#![warn(clippy::pedantic)]
#![warn(missing_docs)]
#![doc = include_str!("../README.md")]

pub mod applicative;
pub mod behaviour;
pub mod flatten;
pub mod map;
pub mod proxy;
pub mod value;
pub mod variable;

pub use applicative::{applicative, FnValue};
pub use behaviour::{constant, Beh, BehRef, Behaviour};
pub use flatten::join;
pub use map::map;
pub use proxy::{proxy, Proxy};
pub use value::Value;
pub use variable::{variable, Variable};

pub use phloem::{proxy_session, Forever, Lifespan, LifespanScope, Session};
