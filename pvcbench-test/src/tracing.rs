use tracing_subscriber::EnvFilter;

const CRATE_NAMES: &[&str] = &["pvcbench_client", "stresstest"];

/// Initialize the logger for testing, with the pvcbench crates at `TRACE`.
///
/// This logs to the stdout registered by the Rust test runner; external
/// crates are filtered down to `ERROR`.
///
/// # Example
///
/// ```
/// pvcbench_test::tracing::init();
/// ```
pub fn init() {
    init_with_level("TRACE")
}

/// Initialize the logger with the given level for the pvcbench crates.
pub fn init_with_level(level: &str) {
    let env_filter = CRATE_NAMES
        .iter()
        .fold(EnvFilter::new("ERROR"), |filter, name| {
            filter.add_directive(format!("{name}={level}").parse().unwrap())
        });

    tracing_subscriber::fmt::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_test_writer()
        .compact()
        .try_init()
        .ok();
}
