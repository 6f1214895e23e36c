//! The Wave: one propagation transaction.

use std::{
	cell::{Cell, RefCell},
	collections::VecDeque,
	rc::Rc,
};

use scopeguard::guard;

use crate::participant::Participant;

/// A [`Wave`]'s position in the state machine
/// NEW → ENGAGEMENT → RESOLUTION → CLEANUP → DEAD.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WavePhase {
	/// Created, not yet accepting engagements (transient; advances to
	/// `Engagement` before any caller can observe it).
	New,
	/// Accepting new participants, either as seeds or via correlation.
	Engagement,
	/// Booting and resolving every engaged participant.
	Resolution,
	/// Running `on_cleanup` for every participant that resolved.
	Cleanup,
	/// Finished (successfully or by fatal failure). No further use is valid.
	Dead,
}

pub(crate) struct WaveInner {
	phase: Cell<WavePhase>,
	engagement_queue: RefCell<VecDeque<Participant>>,
	all_engaged: RefCell<Vec<Participant>>,
	resolve_notify_queue: RefCell<VecDeque<Participant>>,
	resolved_count: Cell<usize>,
}

thread_local! {
	static CURRENT_WAVE: RefCell<Option<Wave>> = const { RefCell::new(None) };
}

/// One propagation transaction, run in three strictly sequential phases:
/// engagement closes the participant set, resolution boots and resolves
/// every engaged participant in dependency order, and cleanup resets
/// per-wave state once every resolution has run.
///
/// Cheaply `Clone`-able (an `Rc` underneath); all clones refer to the same
/// transaction.
#[derive(Clone)]
pub struct Wave(Rc<WaveInner>);

impl Wave {
	fn new() -> Self {
		Self(Rc::new(WaveInner {
			phase: Cell::new(WavePhase::Engagement),
			engagement_queue: RefCell::new(VecDeque::new()),
			all_engaged: RefCell::new(Vec::new()),
			resolve_notify_queue: RefCell::new(VecDeque::new()),
			resolved_count: Cell::new(0),
		}))
	}

	pub(crate) fn inner(&self) -> &Rc<WaveInner> {
		&self.0
	}

	/// Current state-machine phase.
	#[must_use]
	pub fn phase(&self) -> WavePhase {
		self.0.phase.get()
	}

	/// The wave currently open on this thread, if any. Nested
	/// [`group`](`Wave::group`) calls join this wave rather than opening a
	/// new one.
	#[must_use]
	pub fn current() -> Option<Wave> {
		CURRENT_WAVE.with(|cell| cell.borrow().clone())
	}

	pub(crate) fn push_engaged(&self, p: Participant) {
		self.0.engagement_queue.borrow_mut().push_back(p.clone());
		self.0.all_engaged.borrow_mut().push(p);
	}

	pub(crate) fn enqueue_resolved(&self, p: Participant) {
		self.0.resolved_count.set(self.0.resolved_count.get() + 1);
		self.0.resolve_notify_queue.borrow_mut().push_back(p);
	}

	/// Creates a `Wave`, runs `body` with it to collect all variable writes,
	/// then runs the wave to completion. If a wave is already open on this
	/// thread, `body` simply joins it instead of opening a second one —
	/// reentrant writes during an active wave participate in the enclosing
	/// transaction.
	///
	/// # Panics
	///
	/// Propagates any fatal error raised while running the wave; on such
	/// failure the graph must be treated as corrupt.
	pub fn group<R>(body: impl FnOnce(&Wave) -> R) -> R {
		if let Some(active) = Self::current() {
			return body(&active);
		}

		let wave = Self::new();
		CURRENT_WAVE.with(|cell| *cell.borrow_mut() = Some(wave.clone()));
		let _clear_current = guard((), |()| {
			CURRENT_WAVE.with(|cell| *cell.borrow_mut() = None);
		});

		let result = body(&wave);
		wave.run();
		result
	}

	/// Adds `p` as one of this wave's initial (seed) participants. Used by
	/// `Variable::waved_set` to enroll itself the moment its value changes.
	pub fn seed(&self, p: &Participant) {
		p.engage(self);
	}

	fn run(&self) {
		self.drain_engagement();
		self.0.phase.set(WavePhase::Resolution);
		self.run_resolution();
		self.0.phase.set(WavePhase::Cleanup);
		self.run_cleanup();
		self.0.phase.set(WavePhase::Dead);
	}

	fn drain_engagement(&self) {
		loop {
			let next = self.0.engagement_queue.borrow_mut().pop_front();
			match next {
				Some(p) => p.engage_complete(self),
				None => break,
			}
		}
	}

	fn run_resolution(&self) {
		let engaged = self.0.all_engaged.borrow().clone();
		for p in &engaged {
			p.boot(self);
		}
		loop {
			let next = self.0.resolve_notify_queue.borrow_mut().pop_front();
			match next {
				Some(p) => p.notify_deps(self),
				None => break,
			}
		}
		let resolved = self.0.resolved_count.get();
		let total = engaged.len();
		if resolved != total {
			self.0.phase.set(WavePhase::Dead);
			panic!(
				"fatal: wave failed to converge ({resolved} of {total} participants resolved) — \
				 a dependency cycle was formed during resolution or an edge was dropped"
			);
		}
	}

	fn run_cleanup(&self) {
		for p in self.0.all_engaged.borrow().iter() {
			p.cleanup();
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::participant::ParticipantCallbacks;
	use std::{cell::RefCell as StdRefCell, rc::Weak};

	struct Recorder {
		log: StdRefCell<Vec<&'static str>>,
	}
	impl ParticipantCallbacks for Recorder {
		fn on_resolved(&self) {
			self.log.borrow_mut().push("resolved");
		}
		fn on_cleanup(&self) {
			self.log.borrow_mut().push("cleanup");
		}
	}

	#[test]
	fn single_leaf_resolves_and_cleans_up() {
		let recorder = Rc::new_cyclic(|_weak: &Weak<Recorder>| Recorder {
			log: StdRefCell::new(Vec::new()),
		});
		let weak: Weak<dyn ParticipantCallbacks> = Rc::downgrade(&recorder) as Weak<_>;
		let participant = Participant::new(weak);

		Wave::group(|wave| wave.seed(&participant));

		assert_eq!(*recorder.log.borrow(), vec!["resolved", "cleanup"]);
		assert_eq!(participant.phase(), crate::participant::ParticipantPhase::Ready);
	}

	#[test]
	fn nested_group_joins_the_active_wave() {
		let calls = Rc::new(StdRefCell::new(0));
		Wave::group(|outer| {
			assert_eq!(outer.phase(), WavePhase::Engagement);
			Wave::group(|inner| {
				assert!(Rc::ptr_eq(inner.inner(), outer.inner()));
				*calls.borrow_mut() += 1;
			});
		});
		assert_eq!(*calls.borrow(), 1);
	}

	#[test]
	#[should_panic(expected = "cannot engage a participant after engagement has closed")]
	fn late_engage_is_fatal() {
		struct LateEngager {
			target: RefCell<Option<Participant>>,
		}
		impl ParticipantCallbacks for LateEngager {
			fn on_resolved(&self) {
				if let Some(target) = self.target.borrow().as_ref() {
					// The wave has already moved to resolution; engaging now is illegal.
					let wave = Wave::current().expect("called during a wave");
					target.engage(&wave);
				}
			}
		}
		let late = Rc::new_cyclic(|_weak: &Weak<LateEngager>| LateEngager {
			target: RefCell::new(None),
		});
		let weak: Weak<dyn ParticipantCallbacks> = Rc::downgrade(&late) as Weak<_>;
		let participant = Participant::new(weak);
		let other = Participant::inert();
		*late.target.borrow_mut() = Some(other);
		Wave::group(|wave| wave.seed(&participant));
	}

	#[test]
	#[should_panic(expected = "already engaged in a different wave")]
	fn engaging_into_two_distinct_waves_is_fatal() {
		// `Wave::group` always joins the thread-local active wave, so two
		// genuinely distinct, simultaneously-live `Wave`s can only be
		// constructed directly, bypassing `group` — exactly what a
		// misbehaving embedding (not this crate's own API) could attempt.
		let wave_a = Wave::new();
		let wave_b = Wave::new();
		let participant = Participant::inert();
		participant.engage(&wave_a);
		participant.engage(&wave_b);
	}

	#[test]
	fn engage_is_idempotent_within_the_same_wave() {
		let wave = Wave::new();
		let participant = Participant::inert();
		participant.engage(&wave);
		participant.engage(&wave); // must not panic
		assert_eq!(
			wave.0.all_engaged.borrow().len(),
			1,
			"re-engaging the same participant in the same wave must not duplicate it"
		);
	}
}
