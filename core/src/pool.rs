//! Fixed-size worker pool with a bounded job queue.
//!
//! The acceptor hands each accepted connection to `submit`, which blocks
//! once the queue is full rather than spawning unboundedly — a bounded
//! `sync_channel` plays the role `WaitGroup` plays in the async version
//! of this codebase: a single shared primitive the workers rendezvous on,
//! just built from `std::thread` and `std::sync::mpsc` instead of atomics
//! and a waker.

use std::sync::mpsc::{self, Receiver, SyncSender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

type Job = Box<dyn FnOnce() + Send + 'static>;

pub struct ThreadPool {
	sender: Option<SyncSender<Job>>,
	workers: Vec<JoinHandle<()>>,
}

impl ThreadPool {
	/// Spawns `thread_count` workers pulling from a queue bounded at
	/// `queue_depth`. `submit` blocks the caller once the queue is full,
	/// which is how the acceptor loop applies backpressure to new
	/// connections instead of accumulating unbounded threads.
	pub fn new(thread_count: usize, queue_depth: usize) -> Self {
		assert!(thread_count > 0, "thread pool needs at least one worker");
		let (sender, receiver) = mpsc::sync_channel::<Job>(queue_depth);
		let receiver = Arc::new(Mutex::new(receiver));

		let mut workers = Vec::with_capacity(thread_count);
		for id in 0..thread_count {
			let receiver = Arc::clone(&receiver);
			workers.push(thread::spawn(move || Self::run_worker(id, receiver)));
		}

		ThreadPool { sender: Some(sender), workers }
	}

	fn run_worker(id: usize, receiver: Arc<Mutex<Receiver<Job>>>) {
		loop {
			let job = {
				let receiver = receiver.lock().unwrap();
				receiver.recv()
			};
			match job {
				Ok(job) => job(),
				Err(_) => {
					log::debug!("worker {id} shutting down, queue closed");
					break;
				}
			}
		}
	}

	/// Blocks until the job is accepted onto the queue. Panics if called
	/// after `shutdown`.
	pub fn submit<F>(&self, job: F)
	where
		F: FnOnce() + Send + 'static,
	{
		self
			.sender
			.as_ref()
			.expect("submit called after shutdown")
			.send(Box::new(job))
			.expect("worker threads outlive the pool while it is open");
	}

	/// Closes the queue and waits for every in-flight and queued job to
	/// finish. Idempotent only up to the first call — a second call would
	/// panic on the already-taken sender, which is fine since the caller
	/// owns the pool by value past this point.
	pub fn shutdown(mut self) {
		drop(self.sender.take());
		for worker in self.workers.drain(..) {
			let _ = worker.join();
		}
	}
}
