//! Monadic join: a behaviour-of-behaviour collapsed into one behaviour.

use std::{
	cell::{Cell, RefCell},
	rc::{Rc, Weak},
};

use phloem::{BindContext, Event, Lifespan, Participant, ParticipantCallbacks, Wave};

use crate::{
	behaviour::{Beh, BehRef, Behaviour},
	value::Value,
};

struct FlattenInner<T: Value> {
	self_weak: Weak<Self>,
	participant: Participant,
	source: Beh<BehRef<T>>,
	inner: RefCell<Beh<T>>,
	cached: RefCell<T>,
	changed: Rc<Cell<bool>>,
	detached: Cell<bool>,
}

impl<T: Value> ParticipantCallbacks for FlattenInner<T> {
	fn on_boot(&self, _wave: &Wave) {
		self.source.change().defer(&self.participant);
		let this = self.self_weak.clone();
		self.participant.invoke_before_resolve(move |_wave| {
			let Some(this) = this.upgrade() else { return };
			// The late-discovered dependency: only after `source` has itself
			// resolved do we know which inner behaviour is actually current.
			// Deferring any earlier would target a since-superseded inner.
			this.source.value().0.change().defer(&this.participant);
		});
	}

	fn on_resolved(&self) {
		let source_changed = self.source.change().value();
		if source_changed {
			let new_inner = self.source.value().0;
			let old_inner = self.inner.replace(new_inner.clone());
			old_inner.change().remove_correlated_node(&self.participant);
			new_inner.change().add_correlated_node(&self.participant);
		}
		let inner_changed = self.inner.borrow().change().value();
		if source_changed || inner_changed {
			let new_value = self.inner.borrow().value();
			if *self.cached.borrow() != new_value {
				*self.cached.borrow_mut() = new_value;
				self.changed.set(true);
			}
		}
	}

	fn on_cleanup(&self) {
		self.changed.set(false);
	}
}

impl<T: Value> Drop for FlattenInner<T> {
	fn drop(&mut self) {
		if !self.detached.get() {
			self.source.change().remove_correlated_node(&self.participant);
			self.inner.borrow().change().remove_correlated_node(&self.participant);
		}
	}
}

/// Collapses a behaviour-of-behaviours into a single behaviour holding the
/// currently-selected inner behaviour's value, switching its subscription
/// whenever `source` picks a new inner.
pub fn join<T>(lifespan: &dyn Lifespan, source: Beh<BehRef<T>>) -> Beh<T>
where
	T: Value + 'static,
{
	let ctx = BindContext::current(lifespan);
	let initial_inner = source.value().0;
	let initial_value = initial_inner.value();
	let inner = Rc::new_cyclic(|weak: &Weak<FlattenInner<T>>| {
		let callbacks: Weak<dyn ParticipantCallbacks> = weak.clone() as Weak<_>;
		FlattenInner {
			self_weak: weak.clone(),
			participant: Participant::new(callbacks),
			source: source.clone(),
			inner: RefCell::new(initial_inner.clone()),
			cached: RefCell::new(initial_value),
			changed: Rc::new(Cell::new(false)),
			detached: Cell::new(false),
		}
	});
	source.change().add_correlated_node(&inner.participant);
	initial_inner.change().add_correlated_node(&inner.participant);
	ctx.engage_if_active(&inner.participant);

	let weak_inner: Weak<FlattenInner<T>> = Rc::downgrade(&inner);
	ctx.lifespan.on_dispose(Box::new(move || {
		if let Some(inner) = weak_inner.upgrade() {
			if !inner.detached.replace(true) {
				inner.source.change().remove_correlated_node(&inner.participant);
				inner.inner.borrow().change().remove_correlated_node(&inner.participant);
			}
		}
	}));

	inner
}

impl<T: Value> Behaviour<T> for FlattenInner<T> {
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
	use phloem::{Forever, Wave as PhloemWave};

	#[test]
	fn reads_the_initial_inner_value() {
		let v1 = variable("Abc".to_string());
		let vb = variable(BehRef(Rc::new(v1.clone()) as Beh<String>));
		let r = join(&Forever, Rc::new(vb.clone()) as Beh<BehRef<String>>);
		assert_eq!(r.value(), "Abc");
	}

	#[test]
	fn switching_the_selected_behaviour_updates_the_value_and_fires_once() {
		let v1 = variable("Abc".to_string());
		let v2 = variable("Def".to_string());
		let vb = variable(BehRef(Rc::new(v1.clone()) as Beh<String>));
		let r = join(&Forever, Rc::new(vb.clone()) as Beh<BehRef<String>>);
		assert_eq!(r.value(), "Abc");

		v1.set("XyZ".to_string());
		assert_eq!(r.value(), "XyZ");

		vb.set(BehRef(Rc::new(v2.clone()) as Beh<String>));
		assert_eq!(r.value(), "Def");

		// The old inner no longer affects `r`.
		v1.set("never seen".to_string());
		assert_eq!(r.value(), "Def");

		v2.set("Fed".to_string());
		assert_eq!(r.value(), "Fed");
	}

	#[test]
	fn source_and_inner_changing_in_the_same_wave_still_resolves() {
		let v1 = variable(1);
		let v2 = variable(2);
		let vb = variable(BehRef(Rc::new(v1.clone()) as Beh<i32>));
		let r = join(&Forever, Rc::new(vb.clone()) as Beh<BehRef<i32>>);
		assert_eq!(r.value(), 1);

		PhloemWave::group(|wave| {
			vb.waved_set(BehRef(Rc::new(v2.clone()) as Beh<i32>), wave);
			v2.waved_set(99, wave);
		});
		assert_eq!(r.value(), 99);
	}
}
