use std::rc::{Rc, Weak};

use smallvec::SmallVec;

use crate::addr::RcAddr;
use crate::{Derived, Source};

/// Ordered set of sources read during one evaluation, in the order
/// of their first read.
pub(crate) struct Dependencies {
	based_on: SmallVec<[RcAddr<dyn Source>; 4]>,
}

impl Default for Dependencies {
	fn default() -> Self {
		Dependencies::new()
	}
}

impl Dependencies {
	pub const fn new() -> Self {
		Self {
			based_on: SmallVec::new_const(),
		}
	}

	pub fn len(&self) -> usize {
		self.based_on.len()
	}

	pub fn contains(&self, addr: *const ()) -> bool {
		self.based_on.iter().any(|item| item.addr() == addr)
	}

	/// Returns `false` when the source was already recorded.
	pub fn based_on(&mut self, source: Rc<dyn Source>) -> bool {
		let source = RcAddr::new(source);
		if self.based_on.contains(&source) {
			return false;
		}

		self.based_on.push(source);
		true
	}

	pub fn drop(&mut self, parent: &Weak<dyn Derived>) {
		for item in &self.based_on {
			item.not_used_by(parent)
		}
	}

	/// Installs `next` as the current set: every source in `next` starts
	/// notifying `parent`, sources that are no longer read stop.
	pub fn swap(&mut self, next: Dependencies, parent: &Weak<dyn Derived>) {
		for item in &next.based_on {
			item.used_by(parent.clone());
		}

		let prev = std::mem::replace(&mut self.based_on, next.based_on);

		// Diff the keys
		prev.iter()
			.filter(|k| !self.based_on.contains(*k))
			.for_each(|k| k.not_used_by(parent));
	}
}
