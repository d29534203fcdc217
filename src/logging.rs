use std::sync::Once;

use log::debug;

static INIT: Once = Once::new();

/// Installs the `simple_logger` backend for the `log` facade. Safe to call
/// more than once; only the first call has any effect.
pub fn init_logging() {
    INIT.call_once(|| {
        // init() errs when the embedding binary installed a logger first;
        // keep using that one.
        let init_result = simple_logger::SimpleLogger::new()
            .with_level(log::LevelFilter::Info)
            .env()
            .init();
        if init_result.is_ok() {
            debug!("Logging initialized");
        }
    });
}
