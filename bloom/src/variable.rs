//! A leaf behaviour whose value is imperatively set.

use std::{
	cell::{Cell, RefCell},
	rc::{Rc, Weak},
};

use phloem::{Event, Participant, ParticipantCallbacks, ParticipantPhase, Wave};

use crate::{behaviour::Behaviour, value::Value};

struct VariableInner<T: Value> {
	participant: Participant,
	value: RefCell<T>,
	/// The value this `Variable` held just before the first `waved_set` of
	/// the current wave. `None` outside any wave in which this variable has
	/// been written. Used to compute `changed` against the *pre-wave* value
	/// rather than against whatever the previous `waved_set` call happened
	/// to leave behind, so that several writes in one wave that net out to
	/// the original value report no change at all.
	wave_start_value: RefCell<Option<T>>,
	changed: Rc<Cell<bool>>,
}

impl<T: Value> ParticipantCallbacks for VariableInner<T> {
	fn on_cleanup(&self) {
		self.changed.set(false);
		*self.wave_start_value.borrow_mut() = None;
	}
}

/// A graph leaf: owns a current `T` and a fire-only trigger event. Has no
/// upstream dependencies, so it always resolves immediately during boot.
#[derive(Clone)]
pub struct Variable<T: Value>(Rc<VariableInner<T>>);

/// Creates a new [`Variable`] holding `initial`.
#[must_use]
pub fn variable<T: Value + 'static>(initial: T) -> Variable<T> {
	Variable::new(initial)
}

impl<T: Value + 'static> Variable<T> {
	/// Creates a new variable holding `initial`.
	#[must_use]
	pub fn new(initial: T) -> Self {
		let inner = Rc::new_cyclic(|weak: &Weak<VariableInner<T>>| {
			let callbacks: Weak<dyn ParticipantCallbacks> = weak.clone() as Weak<_>;
			VariableInner {
				participant: Participant::new(callbacks),
				value: RefCell::new(initial),
				wave_start_value: RefCell::new(None),
				changed: Rc::new(Cell::new(false)),
			}
		});
		Self(inner)
	}

	/// Assigns `v`, opening a new wave (or joining the active one) to
	/// propagate the change. A no-op, propagation-wise, if `v` equals the
	/// current value.
	pub fn set(&self, v: T) {
		let this = self.clone();
		Wave::group(move |wave| this.waved_set(v.clone(), wave));
	}

	/// Explicit-wave variant of [`set`](`Variable::set`), for use inside a
	/// [`Wave`] already opened by a caller (e.g. to batch several writes).
	///
	/// Several calls against the same `Variable` within one wave are
	/// permitted; only the net transition (the value just before this wave
	/// vs. the value after the last call) is reported through `change`.
	pub fn waved_set(&self, v: T, wave: &Wave) {
		let mut value = self.0.value.borrow_mut();
		if *value == v {
			return;
		}
		if self.0.participant.phase() == ParticipantPhase::Ready {
			*self.0.wave_start_value.borrow_mut() = Some(value.clone());
		}
		*value = v;
		let net_changed = self.0.wave_start_value.borrow().as_ref() != Some(&*value);
		drop(value);
		self.0.changed.set(net_changed);
		wave.seed(&self.0.participant);
	}
}

impl<T: Value + 'static> Behaviour<T> for Variable<T> {
	fn value(&self) -> T {
		self.0.value.borrow().clone()
	}
	fn change(&self) -> Event {
		Event::from_participant(self.0.participant.clone(), self.0.changed.clone())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn basic_read_after_set() {
		let v = variable(44);
		assert_eq!(v.value(), 44);
		v.set(55);
		assert_eq!(v.value(), 55);
	}

	#[test]
	fn setting_to_the_same_value_does_not_fire() {
		let v = variable(3);
		let fired = std::cell::Cell::new(false);
		// There's no listener API on a bare Variable; we observe indirectly
		// via `change().value()` read inside the same wave instead.
		Wave::group(|wave| {
			v.waved_set(3, wave);
			fired.set(v.change().value());
		});
		assert!(!fired.get());
	}

	#[test]
	fn two_writes_in_one_wave_report_net_change_only() {
		let v = variable(1);
		let fired = std::cell::Cell::new(true);
		Wave::group(|wave| {
			v.waved_set(2, wave);
			v.waved_set(1, wave); // back to the original value
			fired.set(v.change().value());
		});
		// Net change across the wave is none, even though two writes happened.
		assert_eq!(v.value(), 1);
		assert!(!fired.get());
	}

	#[test]
	fn three_writes_netting_to_a_real_change_report_changed() {
		let v = variable(1);
		let fired = std::cell::Cell::new(false);
		Wave::group(|wave| {
			v.waved_set(2, wave);
			v.waved_set(1, wave);
			v.waved_set(9, wave);
			fired.set(v.change().value());
		});
		assert_eq!(v.value(), 9);
		assert!(fired.get());
	}
}
