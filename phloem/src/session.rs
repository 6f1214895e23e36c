//! Groups of proxy-detach callbacks.

use std::{
	cell::RefCell,
	rc::{Rc, Weak},
};

use crate::lifespan::Lifespan;

/// A group of detach callbacks, normally one per [`Proxy`](../bloom/struct.Proxy.html)
/// created against it. Calling [`destroy`](`Session::destroy`) runs every
/// callback once and marks the session dead; further additions then fail.
#[derive(Debug, Default)]
pub struct Session {
	detachers: RefCell<Option<Vec<Box<dyn FnOnce()>>>>,
}

impl Session {
	/// Creates a new, live session.
	#[must_use]
	pub fn new() -> Rc<Self> {
		Rc::new(Self {
			detachers: RefCell::new(Some(Vec::new())),
		})
	}

	/// Registers `cb` to run when this session is destroyed.
	///
	/// # Panics
	///
	/// Panics if the session has already been destroyed.
	pub fn add_detach(&self, cb: Box<dyn FnOnce()>) {
		match self.detachers.borrow_mut().as_mut() {
			Some(detachers) => detachers.push(cb),
			None => panic!("fatal: cannot proxy via a destroyed Session"),
		}
	}

	/// Runs every registered detach callback once, then marks this session
	/// dead. Calling `destroy` again is a no-op.
	pub fn destroy(&self) {
		if let Some(detachers) = self.detachers.borrow_mut().take() {
			for cb in detachers {
				cb();
			}
		}
	}

	/// Whether [`destroy`](`Session::destroy`) has already run.
	#[must_use]
	pub fn is_destroyed(&self) -> bool {
		self.detachers.borrow().is_none()
	}
}

/// Creates a [`Session`] that self-destroys when `lifespan` ends.
#[must_use]
pub fn proxy_session(lifespan: &dyn Lifespan) -> Rc<Session> {
	let session = Session::new();
	let weak: Weak<Session> = Rc::downgrade(&session);
	lifespan.on_dispose(Box::new(move || {
		if let Some(session) = weak.upgrade() {
			session.destroy();
		}
	}));
	session
}
