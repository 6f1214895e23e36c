//! The `Behaviour` capability: a current value plus a boolean change event.

use std::rc::Rc;

use phloem::Event;

use crate::value::Value;

/// A node holding a current value of type `T` and a boolean change event.
///
/// `value()` is stable between waves; read during a wave, it reflects this
/// behaviour's post-resolution value, but only once this behaviour itself has
/// resolved (see [`Event::value`] for the analogous rule on `change`).
pub trait Behaviour<T: Value> {
	/// The current value.
	fn value(&self) -> T;

	/// An event whose value is `true` iff this behaviour's value changed
	/// during the current wave.
	fn change(&self) -> Event;
}

/// A type-erased, reference-counted handle to any [`Behaviour`] of `T`. Every
/// combinator in this crate returns one of these rather than a concrete type,
/// so behaviours of different concrete shapes (a `Variable`, a `map` result, a
/// `join` result, ...) can be composed freely.
pub type Beh<T> = Rc<dyn Behaviour<T>>;

struct ConstBehaviour<T: Value> {
	value: T,
}

impl<T: Value> Behaviour<T> for ConstBehaviour<T> {
	fn value(&self) -> T {
		self.value.clone()
	}
	fn change(&self) -> Event {
		Event::const_false()
	}
}

/// A behaviour whose value never changes.
#[must_use]
pub fn constant<T: Value + 'static>(value: T) -> Beh<T> {
	Rc::new(ConstBehaviour { value })
}

/// A cheaply-`Clone`-able wrapper making a [`Beh<T>`] itself usable as a
/// [`Value`] — needed wherever a behaviour is carried *as data* by another
/// behaviour, e.g. [`join`](`crate::flatten::join`)'s `Beh<BehRef<T>>`
/// source. Equality is reference identity (`Rc::ptr_eq`): two `BehRef`s are
/// equal iff they wrap the exact same node, never by comparing values, since
/// `Beh<T>` (a `dyn` trait object) has no structural equality of its own.
pub struct BehRef<T: Value>(pub Beh<T>);

impl<T: Value> Clone for BehRef<T> {
	fn clone(&self) -> Self {
		Self(Rc::clone(&self.0))
	}
}

impl<T: Value> PartialEq for BehRef<T> {
	fn eq(&self, other: &Self) -> bool {
		Rc::ptr_eq(&self.0, &other.0)
	}
}
