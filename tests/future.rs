use std::cell::RefCell;
use std::future::Future;
use std::rc::Rc;
use std::time::Duration;

use observe_lite::{computed_async, delay, CancellationToken, Error, Observable, Update};
use tokio::task::LocalSet;

mod mock;

async fn local<F: Future>(future: F) -> F::Output {
	LocalSet::new().run_until(future).await
}

async fn sleep(ms: u64) {
	tokio::time::sleep(Duration::from_millis(ms)).await
}

fn record<T: Clone + 'static>(observable: &Observable<T>) -> Rc<RefCell<Vec<(T, T)>>> {
	let seen = Rc::new(RefCell::new(Vec::new()));
	observable.subscribe({
		let seen = seen.clone();
		move |current: &T, previous: &T| seen.borrow_mut().push((current.clone(), previous.clone()))
	});
	seen
}

async fn after(ms: u64, value: i32) -> i32 {
	sleep(ms).await;
	value
}

#[tokio::test(start_paused = true)]
async fn latest_write_wins() {
	mock::init_tracing();
	local(async {
		let a = Observable::new(0);
		let seen = record(&a);

		a.set_async(after(100, 1));
		a.set_async(after(10, 2));
		assert_eq!(a.generation(), 2);
		assert_eq!(a.pending(), 2);
		assert_eq!(a.get(), 0);

		sleep(50).await;
		assert_eq!(a.get(), 2);
		assert_eq!(a.pending(), 1);

		sleep(100).await;
		assert_eq!(a.get(), 2);
		assert_eq!(a.pending(), 0);
		assert_eq!(*seen.borrow(), vec![(2, 0)]);
	})
	.await
}

#[tokio::test(start_paused = true)]
async fn immediate_write_settles_in_order() {
	local(async {
		let a = Observable::new(0);
		let seen = record(&a);

		a.set_async(after(10, 1));
		sleep(20).await;
		a.set_async(after(10, 2));
		sleep(20).await;

		assert_eq!(a.get(), 2);
		assert_eq!(*seen.borrow(), vec![(1, 0), (2, 1)]);
	})
	.await
}

#[tokio::test(start_paused = true)]
async fn rejected_write_is_not_published() {
	mock::init_tracing();
	local(async {
		let a = Observable::new(1);
		let seen = record(&a);

		a.set_future(async {
			sleep(10).await;
			Err::<i32, _>(Error::rejected("backend unavailable"))
		});
		assert_eq!(a.pending(), 1);

		sleep(20).await;
		assert_eq!(a.get(), 1);
		assert_eq!(a.pending(), 0);
		assert!(seen.borrow().is_empty());
	})
	.await
}

#[tokio::test(start_paused = true)]
async fn rejected_latest_write_keeps_older_value_out() {
	local(async {
		let a = Observable::new(0);

		a.set_async(after(5, 1));
		a.set_future(async {
			sleep(10).await;
			Err::<i32, _>(Error::rejected("timeout"))
		});

		sleep(20).await;
		assert_eq!(a.get(), 0);
	})
	.await
}

#[tokio::test(start_paused = true)]
async fn assign_dispatches_on_update_kind() {
	local(async {
		let a = Observable::new(0);
		a.assign(1);
		assert_eq!(a.get(), 1);

		a.assign(Update::later(after(10, 2)));
		assert_eq!(a.get(), 1);
		sleep(20).await;
		assert_eq!(a.get(), 2);
	})
	.await
}

#[tokio::test(start_paused = true)]
async fn compute_with_async_function() {
	local(async {
		let answer = Observable::computed_async(0, || async {
			delay(Duration::from_millis(100)).await?;
			Ok::<_, Error>(42)
		});
		assert_eq!(answer.get(), 0);

		sleep(150).await;
		assert_eq!(answer.get(), 42);

		answer.set(0);
		answer.compute();
		sleep(150).await;
		assert_eq!(answer.get(), 42);
	})
	.await
}

#[tokio::test(start_paused = true)]
async fn chained_async_computations() {
	local(async {
		let child = Observable::new(1);
		let parent = computed_async!(0, (child) => {
			let value = child.get();
			async move {
				sleep(10).await;
				Ok::<_, Error>(value + 1)
			}
		});
		let grandparent = computed_async!(0, (parent) => {
			let value = parent.get();
			async move {
				sleep(10).await;
				Ok::<_, Error>(value + 1)
			}
		});

		sleep(50).await;
		assert_eq!(parent.get(), 2);
		assert_eq!(grandparent.get(), 3);

		let seen = record(&grandparent);
		child.set(5);
		child.set(7);

		sleep(50).await;
		assert_eq!(parent.get(), 8);
		assert_eq!(grandparent.get(), 9);
		assert_eq!(*seen.borrow(), vec![(9, 3)]);
	})
	.await
}

#[tokio::test(start_paused = true)]
async fn slow_evaluation_is_discarded() {
	local(async {
		let input = Observable::new(100u64);
		let output = computed_async!(0, (input) => {
			let ms = input.get();
			async move {
				sleep(ms).await;
				Ok::<_, Error>(ms)
			}
		});

		input.set(10);
		sleep(200).await;
		assert_eq!(output.get(), 10);
	})
	.await
}

#[tokio::test(start_paused = true)]
async fn failed_evaluation_keeps_value() {
	mock::init_tracing();
	local(async {
		let input = Observable::new(1);
		let output = computed_async!(0, (input) => {
			let value = input.get();
			async move {
				if value < 0 {
					return Err(Error::rejected("negative input"));
				}
				Ok::<_, Error>(value * 10)
			}
		});

		sleep(1).await;
		assert_eq!(output.get(), 10);

		input.set(-1);
		sleep(1).await;
		assert_eq!(output.get(), 10);

		input.set(2);
		sleep(1).await;
		assert_eq!(output.get(), 20);
	})
	.await
}

#[tokio::test(start_paused = true)]
async fn derived_mixes_ready_and_pending() {
	local(async {
		let input = Observable::new(1);
		let output = Observable::derived(0, {
			let input = input.clone();
			move || {
				let value = input.get();
				if value % 2 == 0 {
					Update::Ready(value)
				} else {
					Update::later(after(10, value))
				}
			}
		});

		assert_eq!(output.get(), 0);
		sleep(20).await;
		assert_eq!(output.get(), 1);

		input.set(2);
		assert_eq!(output.get(), 2);
	})
	.await
}

#[tokio::test(start_paused = true)]
async fn cancelled_subscriber_misses_async_write() {
	local(async {
		let a = Observable::new(0);
		let token = CancellationToken::new();
		let seen = Rc::new(RefCell::new(Vec::new()));

		a.subscribe_until(
			{
				let seen = seen.clone();
				move |current: &i32, _: &i32| seen.borrow_mut().push(*current)
			},
			token.clone(),
		);

		a.set_async(after(10, 1));
		token.cancel();

		sleep(20).await;
		assert_eq!(a.get(), 1);
		assert!(seen.borrow().is_empty());
	})
	.await
}

#[tokio::test(start_paused = true)]
async fn dropped_observable_ignores_late_result() {
	local(async {
		let a = Observable::new(0);
		a.set_async(after(10, 1));
		drop(a);
		sleep(20).await;
	})
	.await
}

#[tokio::test(start_paused = true)]
async fn cancelled_delay_never_fires() {
	local(async {
		let a = Observable::new(0);
		let timer = Observable::<i32>::delay(Duration::from_millis(50));
		let cancel = timer.canceller();

		a.set_future(async move {
			timer.await?;
			Ok::<_, Error>(1)
		});

		sleep(10).await;
		cancel.cancel();
		sleep(100).await;

		assert_eq!(a.get(), 0);
		assert_eq!(a.pending(), 0);
	})
	.await
}
