//! A detachable passthrough behaviour, severed via its owning [`Session`].

use std::{
	cell::{Cell, RefCell},
	rc::{Rc, Weak},
};

use phloem::{Event, EventOps, Participant, Session, Wave};

use crate::{
	behaviour::{Beh, Behaviour},
	value::Value,
};

struct ProxyEventOps<T: Value> {
	peer: Beh<T>,
	attached: Cell<bool>,
	/// Every participant this proxy has personally forwarded to the peer via
	/// `add_correlated_node`, so `detach` can remove exactly those and no
	/// more — the peer's correlation count must return to its pre-proxy
	/// baseline, not drop below it if some other caller also correlated
	/// directly against the peer.
	forwarded: RefCell<Vec<Participant>>,
}

impl<T: Value> ProxyEventOps<T> {
	fn detach(&self) {
		if self.attached.replace(false) {
			for n in self.forwarded.borrow_mut().drain(..) {
				self.peer.change().remove_correlated_node(&n);
			}
		}
	}
}

impl<T: Value> EventOps for ProxyEventOps<T> {
	fn add_correlated_node(&self, n: &Participant) {
		if self.attached.get() {
			self.peer.change().add_correlated_node(n);
			self.forwarded.borrow_mut().push(n.clone());
		}
	}

	fn remove_correlated_node(&self, n: &Participant) {
		if !self.attached.get() {
			return;
		}
		let mut forwarded = self.forwarded.borrow_mut();
		if let Some(pos) = forwarded.iter().position(|p| p == n) {
			forwarded.swap_remove(pos);
			self.peer.change().remove_correlated_node(n);
		}
	}

	fn defer(&self, n: &Participant) {
		if self.attached.get() {
			self.peer.change().defer(n);
		}
	}

	fn defer_by(&self, n: &Participant, cb: Box<dyn FnOnce(&Wave)>) {
		if self.attached.get() {
			self.peer.change().defer_by(n, cb);
		} else {
			// Detached: no real dependency to wait on, but the callback must
			// still run so a consumer built on top of this proxy keeps making
			// progress rather than deadlocking on a link that's gone.
			n.invoke_before_resolve(move |wave| cb(wave));
		}
	}

	fn value(&self) -> bool {
		self.attached.get() && self.peer.change().value()
	}

	fn correlated_count(&self) -> usize {
		if self.attached.get() {
			self.forwarded.borrow().len()
		} else {
			0
		}
	}
}

/// A passthrough behaviour over a peer, detachable via a [`Session`].
///
/// Reading [`value`](Behaviour::value) always forwards to the peer, attached
/// or not — only the change [`Event`]'s correlation/defer/`value()` behavior
/// is affected by detachment.
#[derive(Clone)]
pub struct Proxy<T: Value>(Rc<ProxyEventOps<T>>);

impl<T: Value + 'static> Behaviour<T> for Proxy<T> {
	fn value(&self) -> T {
		self.0.peer.value()
	}
	fn change(&self) -> Event {
		Event::new(Rc::clone(&self.0) as Rc<dyn EventOps>)
	}
}

/// Wraps `b` in a proxy that forwards everything to it until `session` is
/// destroyed, at which point it detaches: its correlations to `b` are removed
/// and its change event goes permanently quiet.
pub fn proxy<T>(session: &Session, b: Beh<T>) -> Beh<T>
where
	T: Value + 'static,
{
	let ops = Rc::new(ProxyEventOps {
		peer: b,
		attached: Cell::new(true),
		forwarded: RefCell::new(Vec::new()),
	});
	let weak: Weak<ProxyEventOps<T>> = Rc::downgrade(&ops);
	session.add_detach(Box::new(move || {
		if let Some(ops) = weak.upgrade() {
			ops.detach();
		}
	}));
	Rc::new(Proxy(ops))
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::variable::variable;
	use phloem::Session as PhloemSession;

	#[test]
	fn forwards_value_and_change() {
		let session = PhloemSession::new();
		let v = variable(7);
		let p = proxy(&session, Rc::new(v.clone()) as Beh<i32>);
		assert_eq!(p.value(), 7);
		v.set(8);
		assert_eq!(p.value(), 8);
	}

	#[test]
	fn detaching_removes_exactly_the_correlations_it_added() {
		let session = PhloemSession::new();
		let v = variable(1);
		let peer: Beh<i32> = Rc::new(v.clone());
		let p = proxy(&session, peer.clone());

		let probe = Participant::inert();
		p.change().add_correlated_node(&probe);
		p.change().add_correlated_node(&probe);
		let baseline_plus_two = peer.change().correlated_count();
		assert_eq!(baseline_plus_two, 2);

		session.destroy();
		assert_eq!(peer.change().correlated_count(), 0);

		// After detach, the proxy's own change event reports no activity.
		v.set(2);
		assert!(!p.change().value());
		// ...but reading the peer's value directly still works.
		assert_eq!(p.value(), 2);
	}

	#[test]
	fn deferring_after_detach_still_runs_the_callback() {
		use phloem::{ParticipantCallbacks, Wave as PhloemWave};
		use std::rc::Weak as StdWeak;

		let session = PhloemSession::new();
		let v = variable(1);
		let p = proxy(&session, Rc::new(v.clone()) as Beh<i32>);
		session.destroy();

		struct Ran(Cell<bool>);
		impl ParticipantCallbacks for Ran {}
		let ran = Rc::new(Ran(Cell::new(false)));
		let weak: StdWeak<dyn ParticipantCallbacks> = Rc::downgrade(&ran) as StdWeak<_>;
		let participant = Participant::new(weak);

		PhloemWave::group(|wave| {
			participant.engage(wave);
			p.change().defer_by(&participant, |_wave| {
				ran.0.set(true);
			});
		});
		assert!(ran.0.get());
	}
}
