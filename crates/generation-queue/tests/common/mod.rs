#![allow(dead_code)]

use std::{sync::Arc, time::Duration};

use sd_generation_queue::{Change, Job, JobState, Scheduler, Subscription};

use tokio::time::{sleep, timeout};

pub mod jobs;

const FIVE_SECONDS: Duration = Duration::from_secs(5);

/// Wait until the job reaches a state satisfying `pred`, returning that state.
pub async fn wait_for(job: &Arc<Job>, pred: impl Fn(JobState) -> bool) -> JobState {
	let mut states = job.subscribe();

	timeout(FIVE_SECONDS, async {
		loop {
			let state = job.state();
			if pred(state) {
				return state;
			}

			// Lagging is fine, we re-read the state on the next iteration anyway
			let _ = states.recv().await;
		}
	})
	.await
	.unwrap_or_else(|_| panic!("job <id='{}'> stuck at {}", job.id(), job.state()))
}

pub async fn wait_state(job: &Arc<Job>, expected: JobState) {
	wait_for(job, |state| state == expected).await;
}

pub async fn wait_terminal(job: &Arc<Job>) -> JobState {
	wait_for(job, JobState::is_terminal).await
}

/// Poll the active queue until it matches the expected job ids.
pub async fn wait_queue(scheduler: &Scheduler, expected: &[&Arc<Job>]) {
	let expected = expected.iter().map(|job| job.id()).collect::<Vec<_>>();

	timeout(FIVE_SECONDS, async {
		loop {
			let queued = scheduler
				.active_jobs()
				.await
				.iter()
				.map(|job| job.id())
				.collect::<Vec<_>>();

			if queued == expected {
				return;
			}

			sleep(Duration::from_millis(10)).await;
		}
	})
	.await
	.expect("active queue never matched the expected jobs");
}

pub async fn next_change(subscription: &mut Subscription) -> Change {
	timeout(FIVE_SECONDS, subscription.recv())
		.await
		.expect("no change notified in time")
		.expect("notifier unexpectedly closed")
}
