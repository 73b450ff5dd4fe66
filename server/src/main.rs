use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use cape_core::ServerConfig;
use clap::Parser;
use simple_logger::SimpleLogger;

mod args;

use args::Args;

fn main() {
	SimpleLogger::new().with_level(log::LevelFilter::Info).init().unwrap();

	let args = Args::parse();
	let threads = args.threads.unwrap_or_else(ServerConfig::default_thread_count);
	let config = ServerConfig::new(args.port, args.timeout, PathBuf::from(args.home), threads, args.queue_depth);

	let shutdown = Arc::new(AtomicBool::new(false));
	let signal_flag = Arc::clone(&shutdown);
	if let Err(err) = ctrlc::set_handler(move || {
		log::info!("shutdown signal received");
		signal_flag.store(true, Ordering::Relaxed);
	}) {
		log::error!("failed to install signal handler: {err}");
		std::process::exit(1);
	}

	if let Err(err) = cape_core::run(config, shutdown) {
		log::error!("fatal error: {err:?}");
		std::process::exit(1);
	}
}
