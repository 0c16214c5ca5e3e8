use clap::Parser;
use key_shared_dispatch::config::DispatcherConfig;
use key_shared_dispatch::consumer::ConsumerTransport;
use key_shared_dispatch::dispatcher::KeySharedDispatcher;
use key_shared_dispatch::mock::{InMemoryLog, MockConsumerTransport};
use key_shared_dispatch::rate_limiter::NoRateLimiter;
use key_shared_dispatch::selector::RingSelector;
use std::sync::Arc;
use std::time::Duration;

/// Run a short Key_Shared dispatch session against an in-memory log and a
/// handful of mock consumers, to exercise the dispatcher end-to-end.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// number of entries to seed the log with before dispatching
    #[arg(long, default_value_t = 40)]
    entries: usize,
    /// number of mock consumers to run
    #[arg(long, default_value_t = 3)]
    consumers: usize,
    /// send permits each consumer starts with
    #[arg(long, default_value_t = 8)]
    permits: i64,
    /// max entries read per cursor batch
    #[arg(long, default_value_t = 10)]
    batch_size: usize,
    /// how long to let the dispatcher run before reporting results, in
    /// milliseconds
    #[arg(long, default_value_t = 200)]
    run_millis: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let args = Args::parse();
    let consumer_count = args.consumers.max(1);

    let log = InMemoryLog::new();
    for i in 0..args.entries {
        let key = format!("key-{}", i % consumer_count);
        log.append_one(key.into_bytes(), format!("payload-{i}").into_bytes());
    }

    let dispatcher = Arc::new(KeySharedDispatcher::new(
        log.cursor(),
        RingSelector::new(),
        NoRateLimiter,
        DispatcherConfig::default(),
    ));

    let mut transports = Vec::with_capacity(consumer_count);
    for i in 0..consumer_count {
        let transport = Arc::new(MockConsumerTransport::new(format!("consumer-{i}"), args.permits));
        dispatcher.add_consumer(transport.clone()).await;
        transports.push(transport);
    }

    log::info!(
        "seeded {} entries across {} consumers, starting dispatch",
        args.entries,
        consumer_count
    );

    let run = {
        let dispatcher = dispatcher.clone();
        tokio::spawn(async move { dispatcher.run_forever(args.batch_size).await })
    };

    tokio::time::sleep(Duration::from_millis(args.run_millis)).await;
    run.abort();

    println!(
        "entries still pending redelivery: {}",
        dispatcher.redelivery_len().await
    );
    println!(
        "consumers still behind a join barrier: {}",
        dispatcher.recently_joined_len().await
    );
    for transport in &transports {
        println!(
            "{}: received {} entries, {} permits remaining",
            transport.consumer_name(),
            transport.received().len(),
            transport.available_permits(),
        );
    }

    Ok(())
}
