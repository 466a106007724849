use std::fs::{self, OpenOptions};
use std::path::Path;

use env_logger::{Builder, Target};
use log::LevelFilter;

/// Route `log` output to a file. The terminal belongs to the TUI, so nothing
/// may be written to stderr while it runs. Reads `RUST_LOG`; defaults to info.
pub fn init_file_logger(path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new().create(true).append(true).open(path)?;

    let mut builder = Builder::new();
    builder.filter_level(LevelFilter::Info);
    builder.parse_default_env();
    builder.target(Target::Pipe(Box::new(file)));
    // a second init (tests, restarts) keeps the first logger
    let _ = builder.try_init();
    Ok(())
}
