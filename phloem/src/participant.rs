//! Per-node wave participation: correlation, deferral, resolution, cleanup.

use std::{
	cell::RefCell,
	collections::VecDeque,
	rc::{Rc, Weak},
};

use crate::wave::{Wave, WaveInner, WavePhase};

/// A [`Participant`]'s position in the state machine READY → ENGAGED → RESOLVED.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParticipantPhase {
	/// Not currently taking part in any wave.
	Ready,
	/// Enrolled in the currently running wave, not yet resolved.
	Engaged,
	/// Resolved (its `onResolved` has run) for the currently running wave.
	Resolved,
}

/// User-supplied hooks a node implements to take part in wave propagation.
///
/// All three hooks default to doing nothing, so a leaf node (like a
/// `Variable`) only needs to override [`on_cleanup`](`ParticipantCallbacks::on_cleanup`).
pub trait ParticipantCallbacks {
	/// Runs once, when this participant's wave reaches the resolution phase,
	/// before the first resolve attempt. May call [`Participant::defer`] or
	/// [`Participant::invoke_before_resolve`] to declare scheduling edges.
	fn on_boot(&self, _wave: &Wave) {}

	/// Runs once, strictly after every dependency this participant deferred
	/// on has itself resolved, and strictly before this wave's cleanup phase.
	fn on_resolved(&self) {}

	/// Runs once per wave, after every participant's `on_resolved` has run.
	/// Should reset any per-wave flags (e.g. a `changed` flag) to their rest
	/// state.
	fn on_cleanup(&self) {}
}

struct ParticipantState {
	phase: ParticipantPhase,
	wave: Option<Rc<WaveInner>>,
	correlated: Vec<Participant>,
	downstream: Vec<Participant>,
	pending_deps: usize,
	pre_resolve: VecDeque<Box<dyn FnOnce(&Wave)>>,
	callbacks: Option<Weak<dyn ParticipantCallbacks>>,
}

/// The per-node wave participation handle: correlation, deferral,
/// resolution, cleanup.
///
/// Cheaply `Clone`-able (an `Rc` underneath); identity is by reference, not
/// by contents — two distinct `Participant`s are never "equal" even if their
/// state happens to match.
#[derive(Clone)]
pub struct Participant(Rc<RefCell<ParticipantState>>);

impl PartialEq for Participant {
	fn eq(&self, other: &Self) -> bool {
		Rc::ptr_eq(&self.0, &other.0)
	}
}
impl Eq for Participant {}

impl std::fmt::Debug for Participant {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let state = self.0.borrow();
		f.debug_struct("Participant")
			.field("phase", &state.phase)
			.field("pending_deps", &state.pending_deps)
			.finish_non_exhaustive()
	}
}

impl Participant {
	/// Creates a participant whose hooks are supplied by `callbacks`.
	///
	/// `callbacks` is a weak reference deliberately: the owning node holds a
	/// strong `Rc` to itself and to this `Participant`, so a strong reference
	/// back from the `Participant` to the node would be a cycle. Use
	/// `Rc::new_cyclic` at the call site to obtain the `Weak` before the
	/// node's own `Rc` exists.
	#[must_use]
	pub fn new(callbacks: Weak<dyn ParticipantCallbacks>) -> Self {
		Self(Rc::new(RefCell::new(ParticipantState {
			phase: ParticipantPhase::Ready,
			wave: None,
			correlated: Vec::new(),
			downstream: Vec::new(),
			pending_deps: 0,
			pre_resolve: VecDeque::new(),
			callbacks: Some(callbacks),
		})))
	}

	/// Creates a participant with no hooks and no way to ever be engaged.
	/// Used to back [`ConstFalseEvent`](`crate::event::ConstFalseEvent`).
	#[must_use]
	pub fn inert() -> Self {
		Self(Rc::new(RefCell::new(ParticipantState {
			phase: ParticipantPhase::Ready,
			wave: None,
			correlated: Vec::new(),
			downstream: Vec::new(),
			pending_deps: 0,
			pre_resolve: VecDeque::new(),
			callbacks: None,
		})))
	}

	/// Current state-machine phase.
	#[must_use]
	pub fn phase(&self) -> ParticipantPhase {
		self.0.borrow().phase
	}

	fn callbacks(&self) -> Option<Rc<dyn ParticipantCallbacks>> {
		self.0.borrow().callbacks.as_ref().and_then(Weak::upgrade)
	}

	/// Enrolls `self` as correlated to `self`, meaning: whenever `self` is
	/// engaged into a wave, `n` gets pulled in too (without any resolution
	/// ordering between them). Multiset semantics: `N` adds require `N`
	/// removes to fully sever the link.
	pub fn add_correlated_node(&self, n: &Participant) {
		self.0.borrow_mut().correlated.push(n.clone());
	}

	/// Removes one occurrence of a correlation previously added with
	/// [`add_correlated_node`](`Participant::add_correlated_node`). Removing
	/// a correlation that isn't present is a benign no-op.
	pub fn remove_correlated_node(&self, n: &Participant) {
		let mut state = self.0.borrow_mut();
		if let Some(pos) = state.correlated.iter().position(|p| p == n) {
			state.correlated.swap_remove(pos);
		}
	}

	/// Enrolls `self` into `wave`. Idempotent if already engaged in `wave`.
	///
	/// # Panics
	///
	/// Panics if `self` is already engaged in a *different* wave, or if
	/// `wave` is past its engagement phase.
	pub fn engage(&self, wave: &Wave) {
		let mut state = self.0.borrow_mut();
		if let Some(existing) = &state.wave {
			if Rc::ptr_eq(existing, wave.inner()) {
				return;
			}
			panic!("fatal: participant is already engaged in a different wave");
		}
		if wave.phase() != WavePhase::Engagement {
			panic!("fatal: cannot engage a participant after engagement has closed");
		}
		state.phase = ParticipantPhase::Engaged;
		state.wave = Some(Rc::clone(wave.inner()));
		drop(state);
		wave.push_engaged(self.clone());
	}

	/// Engages every node correlated to `self` into `wave`. Called once per
	/// engaged participant while the engagement queue drains.
	pub(crate) fn engage_complete(&self, wave: &Wave) {
		let correlated = self.0.borrow().correlated.clone();
		for p in correlated {
			p.engage(wave);
		}
	}

	/// Runs `on_boot`, then attempts an immediate resolution.
	pub(crate) fn boot(&self, wave: &Wave) {
		if let Some(cbs) = self.callbacks() {
			cbs.on_boot(wave);
		}
		self.try_resolve(wave);
	}

	/// Declares that resolving `self` must wait until `target` resolves.
	///
	/// If `target` is not currently engaged in the active wave (already
	/// resolved, or never engaged), this is a benign no-op — the dependency
	/// is treated as already satisfied.
	///
	/// # Panics
	///
	/// Panics if `self` is not itself engaged (deferring only makes sense
	/// from inside `self`'s own boot/pre-resolve callbacks).
	pub fn defer(&self, target: &Participant) {
		if self.0.borrow().phase != ParticipantPhase::Engaged {
			panic!("fatal: defer called from a participant that is not engaged");
		}
		if target.0.borrow().phase != ParticipantPhase::Engaged {
			return;
		}
		target.0.borrow_mut().downstream.push(self.clone());
		self.0.borrow_mut().pending_deps += 1;
	}

	/// Enqueues `cb` to run just before `self`'s next resolve attempt that
	/// finds `pending_deps == 0`. May itself call [`defer`](`Participant::defer`),
	/// delaying resolution further.
	pub fn invoke_before_resolve(&self, cb: impl FnOnce(&Wave) + 'static) {
		self.0.borrow_mut().pre_resolve.push_back(Box::new(cb));
	}

	/// Convenience: [`defer`](`Participant::defer`) on `target`, then
	/// [`invoke_before_resolve`](`Participant::invoke_before_resolve`) with `cb`.
	pub fn defer_cb(&self, target: &Participant, cb: impl FnOnce(&Wave) + 'static) {
		self.defer(target);
		self.invoke_before_resolve(cb);
	}

	/// A resolve attempt: drains due pre-resolve callbacks while
	/// `pending_deps == 0`, then resolves if the queue is also empty.
	pub(crate) fn try_resolve(&self, wave: &Wave) {
		loop {
			let due = {
				let mut state = self.0.borrow_mut();
				if state.pending_deps > 0 {
					return;
				}
				state.pre_resolve.pop_front()
			};
			match due {
				Some(cb) => cb(wave),
				None => break,
			}
		}
		{
			let mut state = self.0.borrow_mut();
			debug_assert_eq!(state.pending_deps, 0, "resolved with dependencies still pending");
			state.phase = ParticipantPhase::Resolved;
		}
		if let Some(cbs) = self.callbacks() {
			cbs.on_resolved();
		}
		wave.enqueue_resolved(self.clone());
	}

	/// Drains `self`'s downstream set (participants that deferred on
	/// `self`), decrementing each one's `pending_deps` and attempting to
	/// resolve it if that reaches zero. Iterative by construction: this
	/// never calls itself recursively, only enqueues further work onto
	/// `wave`'s resolve-notify queue via `try_resolve`.
	pub(crate) fn notify_deps(&self, wave: &Wave) {
		let downstream = std::mem::take(&mut self.0.borrow_mut().downstream);
		for dependent in downstream {
			let now_unblocked = {
				let mut state = dependent.0.borrow_mut();
				state.pending_deps -= 1;
				state.pending_deps == 0
			};
			if now_unblocked {
				dependent.try_resolve(wave);
			}
		}
	}

	/// Resets `self` to READY for the next wave, running `on_cleanup`.
	pub(crate) fn cleanup(&self) {
		{
			let mut state = self.0.borrow_mut();
			debug_assert_eq!(state.phase, ParticipantPhase::Resolved);
			debug_assert_eq!(state.pending_deps, 0);
			state.phase = ParticipantPhase::Ready;
			state.wave = None;
		}
		if let Some(cbs) = self.callbacks() {
			cbs.on_cleanup();
		}
	}

	/// The number of correlation links currently registered on `self`,
	/// counting multiplicity. Exposed mainly so tests (and reference-count
	/// fixtures for [`Proxy`](../bloom/struct.Proxy.html) detachment) can
	/// assert a correlation count returns to baseline.
	#[must_use]
	pub fn correlated_count(&self) -> usize {
		self.0.borrow().correlated.len()
	}
}
