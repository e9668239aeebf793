#![allow(dead_code)]

pub mod test_runtime {
    use brrtbus::runtime_config::parse_stack_size;
    use std::sync::Once;

    /// Ensures May coroutines are configured only once
    static MAY_INIT: Once = Once::new();

    pub fn setup_may_runtime() {
        MAY_INIT.call_once(|| {
            let size = std::env::var("BRRTB_STACK_SIZE")
                .ok()
                .and_then(|v| parse_stack_size(&v))
                .unwrap_or(0x8000);
            may::config().set_stack_size(size);
        });
    }
}

pub mod tracing_util {
    use tracing_subscriber::EnvFilter;

    /// Scoped subscriber writing through the test harness's capture.
    ///
    /// Only events emitted on the test's own thread are captured; pump and
    /// handler coroutines run on may worker threads.
    pub struct TestTracing {
        _guard: tracing::subscriber::DefaultGuard,
    }

    impl TestTracing {
        pub fn init() -> Self {
            let subscriber = tracing_subscriber::fmt()
                .with_env_filter(
                    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")),
                )
                .with_test_writer()
                .finish();
            Self {
                _guard: tracing::subscriber::set_default(subscriber),
            }
        }
    }
}

pub mod fixtures {
    use brrtbus::transport::LocalBus;
    use brrtbus::{Dispatcher, DispatcherConfig, Headers};
    use parking_lot::Mutex;
    use serde_json::Value;
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    pub const TEST_TIMEOUT: Duration = Duration::from_secs(3);
    pub const STACK_SIZE: usize = 0x8000;

    /// One hub and `spokes` spoke dispatchers on a fresh bus.
    pub fn hub_and_spokes(spokes: usize) -> (LocalBus, Dispatcher, Vec<Dispatcher>) {
        let bus = LocalBus::with_stack_size(STACK_SIZE);
        let hub = Dispatcher::new(
            bus.hub_link(),
            DispatcherConfig::hub()
                .with_invoke_timeout(TEST_TIMEOUT)
                .with_stack_size(STACK_SIZE),
        );
        let spokes = (0..spokes)
            .map(|_| {
                Dispatcher::new(
                    bus.connect_spoke(),
                    DispatcherConfig::spoke()
                        .with_invoke_timeout(TEST_TIMEOUT)
                        .with_stack_size(STACK_SIZE),
                )
            })
            .collect();
        (bus, hub, spokes)
    }

    /// One hub and one spoke.
    pub fn pair() -> (LocalBus, Dispatcher, Dispatcher) {
        let (bus, hub, mut spokes) = hub_and_spokes(1);
        let spoke = spokes.remove(0);
        (bus, hub, spoke)
    }

    /// What a listener saw on one call.
    #[derive(Debug, Clone)]
    pub struct Seen {
        pub tag: &'static str,
        pub headers: Headers,
        pub args: Vec<Value>,
    }

    pub type Recorder = Arc<Mutex<Vec<Seen>>>;

    pub fn recorder() -> Recorder {
        Arc::new(Mutex::new(Vec::new()))
    }

    /// Listener that appends what it sees to `rec` under `tag`.
    pub fn recording(rec: &Recorder, tag: &'static str) -> brrtbus::Listener {
        let rec = Arc::clone(rec);
        brrtbus::listener(move |headers, args| {
            rec.lock().push(Seen {
                tag,
                headers: headers.clone(),
                args: args.to_vec(),
            });
        })
    }

    /// Poll `cond` until it holds or `timeout` elapses.
    pub fn wait_until<F: Fn() -> bool>(timeout: Duration, cond: F) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        cond()
    }

    /// Wait until `rec` holds at least `n` entries.
    pub fn wait_for(rec: &Recorder, n: usize) -> bool {
        wait_until(TEST_TIMEOUT, || rec.lock().len() >= n)
    }
}
