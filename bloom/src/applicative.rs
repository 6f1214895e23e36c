//! Applying a behaviour-valued function to a behaviour-valued argument.

use std::{
	cell::{Cell, RefCell},
	rc::{Rc, Weak},
};

use phloem::{BindContext, Event, Lifespan, Participant, ParticipantCallbacks, Wave};

use crate::{
	behaviour::{Beh, Behaviour},
	value::Value,
};

/// A cheaply-`Clone`-able function-as-value, for use as the `S` in a
/// `Beh<FnValue<S, R>>` passed to [`applicative`]. Equality is reference
/// identity (`Rc::ptr_eq`), not structural: two `FnValue`s built from
/// different closures are never equal even if they'd always produce the same
/// output, since Rust has no way to compare closure bodies.
pub struct FnValue<S, R>(pub Rc<dyn Fn(S) -> R>);

impl<S, R> Clone for FnValue<S, R> {
	fn clone(&self) -> Self {
		Self(Rc::clone(&self.0))
	}
}

impl<S, R> PartialEq for FnValue<S, R> {
	fn eq(&self, other: &Self) -> bool {
		Rc::ptr_eq(&self.0, &other.0)
	}
}

impl<S, R> FnValue<S, R> {
	/// Wraps `f` for use as a function-valued behaviour.
	pub fn new(f: impl Fn(S) -> R + 'static) -> Self {
		Self(Rc::new(f))
	}
}

struct ApplicativeBehaviourInner<S: Value, R: Value> {
	self_weak: Weak<Self>,
	participant: Participant,
	fb: Beh<FnValue<S, R>>,
	b: Beh<S>,
	cached: RefCell<R>,
	changed: Rc<Cell<bool>>,
	detached: Cell<bool>,
}

impl<S: Value, R: Value> ParticipantCallbacks for ApplicativeBehaviourInner<S, R> {
	fn on_boot(&self, _wave: &Wave) {
		self.fb.change().defer(&self.participant);
		self.b.change().defer(&self.participant);
		let this = self.self_weak.clone();
		self.participant.invoke_before_resolve(move |_wave| {
			let Some(this) = this.upgrade() else { return };
			if this.fb.change().value() || this.b.change().value() {
				let new_value = (this.fb.value().0)(this.b.value());
				if *this.cached.borrow() != new_value {
					*this.cached.borrow_mut() = new_value;
					this.changed.set(true);
				}
			}
		});
	}

	fn on_cleanup(&self) {
		self.changed.set(false);
	}
}

impl<S: Value, R: Value> Drop for ApplicativeBehaviourInner<S, R> {
	fn drop(&mut self) {
		if !self.detached.get() {
			self.fb.change().remove_correlated_node(&self.participant);
			self.b.change().remove_correlated_node(&self.participant);
		}
	}
}

/// A behaviour holding `fb`'s current function applied to `b`'s current
/// value, recomputed whenever either changes.
pub fn applicative<S, R>(lifespan: &dyn Lifespan, fb: Beh<FnValue<S, R>>, b: Beh<S>) -> Beh<R>
where
	S: Value + 'static,
	R: Value + 'static,
{
	let ctx = BindContext::current(lifespan);
	let initial = (fb.value().0)(b.value());
	let inner = Rc::new_cyclic(|weak: &Weak<ApplicativeBehaviourInner<S, R>>| {
		let callbacks: Weak<dyn ParticipantCallbacks> = weak.clone() as Weak<_>;
		ApplicativeBehaviourInner {
			self_weak: weak.clone(),
			participant: Participant::new(callbacks),
			fb: fb.clone(),
			b: b.clone(),
			cached: RefCell::new(initial),
			changed: Rc::new(Cell::new(false)),
			detached: Cell::new(false),
		}
	});
	fb.change().add_correlated_node(&inner.participant);
	b.change().add_correlated_node(&inner.participant);
	ctx.engage_if_active(&inner.participant);

	let weak_inner: Weak<ApplicativeBehaviourInner<S, R>> = Rc::downgrade(&inner);
	ctx.lifespan.on_dispose(Box::new(move || {
		if let Some(inner) = weak_inner.upgrade() {
			if !inner.detached.replace(true) {
				inner.fb.change().remove_correlated_node(&inner.participant);
				inner.b.change().remove_correlated_node(&inner.participant);
			}
		}
	}));

	inner
}

impl<S: Value, R: Value> Behaviour<R> for ApplicativeBehaviourInner<S, R> {
	fn value(&self) -> R {
		self.cached.borrow().clone()
	}
	fn change(&self) -> Event {
		Event::from_participant(self.participant.clone(), Rc::clone(&self.changed))
	}
}
