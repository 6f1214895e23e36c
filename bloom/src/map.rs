//! Deriving one behaviour from another via a pure function.

use std::{
	cell::{Cell, RefCell},
	rc::{Rc, Weak},
};

use phloem::{BindContext, Event, Lifespan, Participant, ParticipantCallbacks, Wave};

use crate::{
	behaviour::{Beh, Behaviour},
	value::Value,
};

struct MapBehaviourInner<S: Value, T: Value> {
	self_weak: Weak<Self>,
	participant: Participant,
	source: Beh<S>,
	f: Box<dyn Fn(S) -> T>,
	cached: RefCell<T>,
	changed: Rc<Cell<bool>>,
	detached: Cell<bool>,
}

impl<S: Value, T: Value> ParticipantCallbacks for MapBehaviourInner<S, T> {
	fn on_boot(&self, _wave: &Wave) {
		let this = self.self_weak.clone();
		self.source.change().defer_by(&self.participant, Box::new(move |_wave| {
			let Some(this) = this.upgrade() else { return };
			if this.source.change().value() {
				let new_value = (this.f)(this.source.value());
				if *this.cached.borrow() != new_value {
					*this.cached.borrow_mut() = new_value;
					this.changed.set(true);
				}
			}
		}));
	}

	fn on_cleanup(&self) {
		self.changed.set(false);
	}
}

impl<S: Value, T: Value> Drop for MapBehaviourInner<S, T> {
	fn drop(&mut self) {
		if !self.detached.get() {
			self.source.change().remove_correlated_node(&self.participant);
		}
	}
}

/// A behaviour derived from `source` by applying `f` to its value. `f` must
/// be pure: it may run any number of times per wave (at most once, in
/// practice, but this isn't guaranteed for future incremental-evaluation
/// variants) and must not have observable side effects.
pub fn map<S, T>(lifespan: &dyn Lifespan, f: impl Fn(S) -> T + 'static, source: Beh<S>) -> Beh<T>
where
	S: Value + 'static,
	T: Value + 'static,
{
	let ctx = BindContext::current(lifespan);
	let initial = f(source.value());
	let inner = Rc::new_cyclic(|weak: &Weak<MapBehaviourInner<S, T>>| {
		let callbacks: Weak<dyn ParticipantCallbacks> = weak.clone() as Weak<_>;
		MapBehaviourInner {
			self_weak: weak.clone(),
			participant: Participant::new(callbacks),
			source: source.clone(),
			f: Box::new(f),
			cached: RefCell::new(initial),
			changed: Rc::new(Cell::new(false)),
			detached: Cell::new(false),
		}
	});
	source.change().add_correlated_node(&inner.participant);
	ctx.engage_if_active(&inner.participant);

	let weak_inner: Weak<MapBehaviourInner<S, T>> = Rc::downgrade(&inner);
	ctx.lifespan.on_dispose(Box::new(move || {
		if let Some(inner) = weak_inner.upgrade() {
			if !inner.detached.replace(true) {
				inner.source.change().remove_correlated_node(&inner.participant);
			}
		}
	}));

	inner
}

impl<S: Value, T: Value> Behaviour<T> for MapBehaviourInner<S, T> {
	fn value(&self) -> T {
		self.cached.borrow().clone()
	}
	fn change(&self) -> Event {
		Event::from_participant(self.participant.clone(), Rc::clone(&self.changed))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::variable::variable;
	use phloem::{Forever, LifespanScope};

	#[test]
	fn maps_the_initial_value_eagerly() {
		let v = variable(2);
		let doubled = map(&Forever, |x: i32| x * 2, Rc::new(v) as Beh<i32>);
		assert_eq!(doubled.value(), 4);
	}

	#[test]
	fn recomputes_only_when_source_changes() {
		let v = variable(2);
		let source: Beh<i32> = Rc::new(v.clone());
		let calls = Rc::new(Cell::new(0));
		let calls_inner = Rc::clone(&calls);
		let doubled = map(
			&Forever,
			move |x: i32| {
				calls_inner.set(calls_inner.get() + 1);
				x * 2
			},
			source,
		);
		assert_eq!(doubled.value(), 4);
		v.set(2); // unchanged -> no propagation reaches the map at all
		assert_eq!(doubled.value(), 4);
		v.set(9);
		assert_eq!(doubled.value(), 18);
		assert_eq!(calls.get(), 2, "should recompute exactly once per real change, not per touch");
	}

	#[test]
	fn disposing_its_lifespan_stops_it_from_recomputing() {
		let scope = LifespanScope::new();
		let v = variable(1);
		let source: Beh<i32> = Rc::new(v.clone());
		let doubled = map(&scope, |x: i32| x + 1, source);
		assert_eq!(doubled.value(), 2);
		scope.dispose();
		v.set(5);
		// The correlation was removed on dispose, so `doubled` never got
		// pulled into the wave that carried this write and keeps its old value.
		assert_eq!(doubled.value(), 2);
	}
}
