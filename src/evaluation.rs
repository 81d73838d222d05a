//! Dependency discovery.
//!
//! Every compute pass runs inside an [`Evaluation`] frame pushed on a
//! thread-local stack. A tracked read registers the observable in the
//! innermost frame, so nested computations each collect their own
//! dependencies and the enclosing frame becomes current again once the
//! inner pass is over.

use std::cell::RefCell;
use std::rc::Rc;

use crate::dependencies::Dependencies;
use crate::Source;

thread_local! {
	static STACK: RefCell<Vec<Evaluation>> = const { RefCell::new(Vec::new()) };
}

pub(crate) struct Evaluation {
	owner: *const (),
	dependencies: Dependencies,
}

impl Evaluation {
	/// Runs `func` as the active computation of `owner` and returns its
	/// result together with every source read on the way.
	pub fn run<R>(owner: *const (), func: impl FnOnce() -> R) -> (R, Dependencies) {
		let frame = Frame::enter(owner);
		let result = func();
		(result, frame.exit())
	}

	/// Records `source` as a dependency of the innermost active
	/// computation, if there is one.
	pub fn track(source: Rc<dyn Source>) {
		STACK.with(|stack| {
			let mut stack = stack.borrow_mut();
			let Some(current) = stack.last_mut() else {
				return;
			};

			let addr = crate::addr::addr(Rc::as_ptr(&source));
			if current.owner == addr || current.dependencies.contains(addr) {
				return;
			}

			current.dependencies.based_on(source);
		})
	}

	pub fn is_active() -> bool {
		STACK.with(|stack| !stack.borrow().is_empty())
	}

	#[cfg(test)]
	fn depth() -> usize {
		STACK.with(|stack| stack.borrow().len())
	}
}

/// Pops its frame on drop, so a panicking compute function does not
/// leave a stale active computation behind.
struct Frame {
	depth: usize,
	done: bool,
}

impl Frame {
	fn enter(owner: *const ()) -> Self {
		let depth = STACK.with(|stack| {
			let mut stack = stack.borrow_mut();
			stack.push(Evaluation {
				owner,
				dependencies: Dependencies::new(),
			});
			stack.len()
		});

		Frame { depth, done: false }
	}

	fn exit(mut self) -> Dependencies {
		self.done = true;
		self.pop().map(|frame| frame.dependencies).unwrap_or_default()
	}

	fn pop(&self) -> Option<Evaluation> {
		STACK.with(|stack| {
			let mut stack = stack.borrow_mut();
			debug_assert_eq!(stack.len(), self.depth, "evaluation frames out of order");
			stack.pop()
		})
	}
}

impl Drop for Frame {
	fn drop(&mut self) {
		if !self.done {
			let _ = self.pop();
		}
	}
}

#[cfg(test)]
mod tests {
	use std::rc::Weak;

	use super::*;
	use crate::Derived;

	struct Leaf;

	impl Source for Leaf {
		fn used_by(&self, _: Weak<dyn Derived>) {}
		fn not_used_by(&self, _: &Weak<dyn Derived>) {}
	}

	fn ptr(leaf: &Rc<Leaf>) -> *const () {
		Rc::as_ptr(leaf) as *const ()
	}

	#[test]
	fn reads_outside_a_computation_are_ignored() {
		let leaf = Rc::new(Leaf);
		Evaluation::track(leaf);
		assert!(!Evaluation::is_active());
	}

	#[test]
	fn innermost_computation_takes_credit() {
		let a = Rc::new(Leaf);
		let b = Rc::new(Leaf);

		let (inner, outer) = Evaluation::run(std::ptr::null(), || {
			Evaluation::track(a.clone());
			let (_, inner) = Evaluation::run(std::ptr::null(), || {
				assert_eq!(Evaluation::depth(), 2);
				Evaluation::track(b.clone());
			});
			Evaluation::track(a.clone());
			inner
		});

		assert_eq!(outer.len(), 1);
		assert!(outer.contains(ptr(&a)));
		assert_eq!(inner.len(), 1);
		assert!(inner.contains(ptr(&b)));
		assert!(!Evaluation::is_active());
	}

	#[test]
	fn owner_never_depends_on_itself() {
		let a = Rc::new(Leaf);
		let (_, deps) = Evaluation::run(ptr(&a), || Evaluation::track(a.clone()));
		assert_eq!(deps.len(), 0);
	}

	#[test]
	fn panicking_computation_restores_the_stack() {
		let result = std::panic::catch_unwind(|| {
			Evaluation::run(std::ptr::null(), || panic!("compute failed"));
		});

		assert!(result.is_err());
		assert!(!Evaluation::is_active());
	}
}
