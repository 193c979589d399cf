use std::backtrace::Backtrace;
use std::fs::OpenOptions;
use std::io::Write;
use std::panic::{PanicHookInfo, take_hook};
use std::path::{Path, PathBuf};
use std::thread;

use chrono::Local;

use crate::logging::LOG_FILE_PREFIX;

/// Log panics through `tracing`, and in `panic = "abort"` builds also append
/// the record straight to today's log file, since the non-blocking writer may
/// not flush before the process aborts.
pub fn install(log_dir: impl AsRef<Path>) {
    let log_dir = log_dir.as_ref().to_path_buf();
    let previous_hook = take_hook();

    std::panic::set_hook(Box::new(move |info: &PanicHookInfo<'_>| {
        let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let record = panic_record(info);
            tracing::error!(target: "media_fetch::panic", "{record}");
            if cfg!(panic = "abort") {
                let _ = append_to_log(&log_dir, &record);
            }
        }));
        previous_hook(info);
    }));
}

fn append_to_log(log_dir: &Path, record: &str) -> std::io::Result<()> {
    let name = format!("{LOG_FILE_PREFIX}.{}", Local::now().format("%Y-%m-%d"));
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(PathBuf::from(log_dir).join(name))?;
    writeln!(file, "{record}")?;
    file.flush()
}

fn panic_record(info: &PanicHookInfo<'_>) -> String {
    let payload = info
        .payload()
        .downcast_ref::<&'static str>()
        .map(|s| (*s).to_string())
        .or_else(|| info.payload().downcast_ref::<String>().cloned())
        .unwrap_or_else(|| info.to_string());
    let location = info
        .location()
        .map_or_else(|| "<unknown>".to_string(), |l| format!("{}:{}:{}", l.file(), l.line(), l.column()));
    let thread = thread::current().name().unwrap_or("<unnamed>").to_string();
    let ts = Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z");

    format!(
        "{ts} PANIC thread={thread} location={location} payload={payload}\nBacktrace:\n{}",
        Backtrace::force_capture()
    )
}
