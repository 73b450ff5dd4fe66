use clap::Parser;

#[derive(Debug, Parser)]
#[clap(name = "cape-server")]
pub struct Args {
	/// TCP port to listen on.
	#[clap(long)]
	pub port: u16,

	/// Per-connection idle timeout, in seconds.
	#[clap(long)]
	pub timeout: u64,

	/// Root directory every client path is resolved against.
	#[clap(long)]
	pub home: String,

	/// Worker thread count. Defaults to `max(4, available_parallelism())`.
	#[clap(long)]
	pub threads: Option<usize>,

	/// Bounded job queue depth.
	#[clap(long, default_value_t = cape_core::config::DEFAULT_QUEUE_DEPTH)]
	pub queue_depth: usize,
}
