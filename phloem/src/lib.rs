#![warn(clippy::pedantic)]
#![doc = include_str!("../README.md")]
//!
//! # Threading Notes
//!
//! This runtime is single-threaded and cooperative by design: every callback
//! invoked by a [`wave::Wave`] runs synchronously on the thread that opened it.
//! There is no `Send`/`Sync` story here — state is `Rc`/`RefCell`/`Cell`
//! throughout, not `Arc`/`Mutex`.

pub mod bind_context;
pub mod event;
pub mod lifespan;
pub mod participant;
pub mod session;
pub mod wave;

pub use bind_context::{BindContext, Participable};
pub use event::{ConstFalseEvent, Event, EventOps};
pub use lifespan::{Forever, Lifespan, LifespanScope};
pub use participant::{Participant, ParticipantCallbacks, ParticipantPhase};
pub use session::{proxy_session, Session};
pub use wave::{Wave, WavePhase};
