use sd_generation_client::{
	generation_job, Error, GeneratedImages, GenerationBackend, GenerationRequest,
};
use sd_generation_queue::{Job, JobOutput, JobState, Scheduler, SchedulerConfig};

use std::{
	sync::{
		atomic::{AtomicUsize, Ordering},
		Arc,
	},
	time::Duration,
};

use async_channel as chan;
use async_trait::async_trait;
use tokio::time::timeout;
use tracing_test::traced_test;

const FIVE_SECONDS: Duration = Duration::from_secs(5);

/// Answers every request with one image per batch entry. With `hold` set, the answer is held back
/// until its sender is dropped.
struct MockBackend {
	hold: Option<chan::Receiver<()>>,
	fail: bool,
	generate_calls: AtomicUsize,
	interrupt_calls: AtomicUsize,
}

impl MockBackend {
	fn new() -> Self {
		Self {
			hold: None,
			fail: false,
			generate_calls: AtomicUsize::new(0),
			interrupt_calls: AtomicUsize::new(0),
		}
	}
}

#[async_trait]
impl GenerationBackend for MockBackend {
	async fn generate(&self, request: &GenerationRequest) -> Result<GeneratedImages, Error> {
		self.generate_calls.fetch_add(1, Ordering::SeqCst);

		if let Some(hold) = &self.hold {
			hold.recv().await.ok();
		}

		if self.fail {
			return Err(Error::NoImages);
		}

		Ok(GeneratedImages {
			images: (0..request.batch_size)
				.map(|idx| format!("{}#{idx}", request.prompt).into_bytes())
				.collect(),
			info: serde_json::json!({ "seed": request.seed }),
		})
	}

	async fn interrupt(&self) -> Result<(), Error> {
		self.interrupt_calls.fetch_add(1, Ordering::SeqCst);
		Ok(())
	}
}

async fn wait_terminal(job: &Arc<Job>) -> JobState {
	let mut states = job.subscribe();

	timeout(FIVE_SECONDS, async {
		loop {
			let state = job.state();
			if state.is_terminal() {
				return state;
			}
			let _ = states.recv().await;
		}
	})
	.await
	.expect("job never reached a terminal state")
}

async fn wait_in_progress(job: &Arc<Job>) {
	let mut states = job.subscribe();

	timeout(FIVE_SECONDS, async {
		while job.state() != JobState::InProgress {
			let _ = states.recv().await;
		}
	})
	.await
	.expect("job never started");
}

#[tokio::test]
#[traced_test]
async fn generation_completes_with_images() {
	let scheduler = Scheduler::new(&SchedulerConfig::default());
	let backend = Arc::new(MockBackend::new());

	let job = generation_job(
		GenerationRequest {
			batch_size: 2,
			seed: 1234,
			..GenerationRequest::new("an owl reading")
		},
		backend.clone(),
	);

	scheduler.admit(Arc::clone(&job)).await.unwrap();

	assert_eq!(wait_terminal(&job).await, JobState::Completed);

	let Some(JobOutput::Out(out)) = job.take_output() else {
		panic!("completed generation must have an output");
	};
	let generated = out.downcast::<GeneratedImages>().unwrap();

	assert_eq!(
		generated.images,
		vec![b"an owl reading#0".to_vec(), b"an owl reading#1".to_vec()]
	);
	assert_eq!(generated.info["seed"], 1234);
	assert_eq!(backend.generate_calls.load(Ordering::SeqCst), 1);
	assert_eq!(backend.interrupt_calls.load(Ordering::SeqCst), 0);

	scheduler.shutdown().await;
}

#[tokio::test]
#[traced_test]
async fn backend_failure_ends_in_error() {
	let scheduler = Scheduler::new(&SchedulerConfig::default());
	let backend = Arc::new(MockBackend {
		fail: true,
		..MockBackend::new()
	});

	let job = generation_job(GenerationRequest::new("a broken robot"), backend);

	scheduler.admit(Arc::clone(&job)).await.unwrap();

	assert_eq!(wait_terminal(&job).await, JobState::Error);
	assert!(job.take_output().is_none());
	assert_eq!(
		job.failure().as_deref(),
		Some("generation backend returned no images")
	);

	scheduler.shutdown().await;
}

#[tokio::test]
#[traced_test]
async fn stopping_a_generation_interrupts_the_backend() {
	let scheduler = Scheduler::new(&SchedulerConfig::default());

	let (hold_tx, hold_rx) = chan::bounded(1);
	let slow_backend = Arc::new(MockBackend {
		hold: Some(hold_rx),
		..MockBackend::new()
	});
	let fast_backend = Arc::new(MockBackend::new());

	let slow = generation_job(GenerationRequest::new("a slow snail"), slow_backend.clone());
	let next = generation_job(GenerationRequest::new("a fast hare"), fast_backend.clone());

	scheduler.admit(Arc::clone(&slow)).await.unwrap();
	scheduler.admit(Arc::clone(&next)).await.unwrap();

	wait_in_progress(&slow).await;
	assert_eq!(next.state(), JobState::Idle);

	assert!(scheduler.stop(slow.id()).await);

	assert_eq!(wait_terminal(&slow).await, JobState::Stopped);
	assert_eq!(slow_backend.interrupt_calls.load(Ordering::SeqCst), 1);

	assert_eq!(wait_terminal(&next).await, JobState::Completed);
	assert_eq!(fast_backend.interrupt_calls.load(Ordering::SeqCst), 0);

	drop(hold_tx);

	scheduler.shutdown().await;
}
