pub mod archive;
pub mod data;
pub mod environment;
pub mod error;
pub mod instructions;
pub mod learn;
pub mod mutator;
pub mod program;
pub mod save;
pub mod tpg;

pub use error::Error;
pub use error::Result;

/// dimensional analysis types
pub type Bid = f64;
pub type Score = f64;
pub type Seed = u64;
pub type DataHash = u64;
pub type ActionId = u64;
pub type ActionClass = usize;

/// tolerance under which two program results are indistinguishable
/// for the behavioral uniqueness check against the archive.
pub const UNIQUENESS_TAU: f64 = 1e-4;

/// progress bar
pub fn progress(n: u64) -> indicatif::ProgressBar {
    let tick = std::time::Duration::from_secs(60);
    let style = "{spinner:.cyan} {elapsed} ~ {percent:>3}% {wide_bar:.cyan}";
    let style = indicatif::ProgressStyle::with_template(style).unwrap();
    let progress = indicatif::ProgressBar::new(n);
    progress.set_style(style);
    progress.enable_steady_tick(tick);
    progress
}

/// initialize logging
pub fn init() {
    let config = simplelog::ConfigBuilder::new()
        .set_location_level(log::LevelFilter::Off)
        .set_target_level(log::LevelFilter::Off)
        .set_thread_level(log::LevelFilter::Off)
        .build();
    let time = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("time moves slow")
        .as_secs();
    std::fs::create_dir_all("logs").expect("create logs directory");
    let file = simplelog::WriteLogger::new(
        log::LevelFilter::Debug,
        config.clone(),
        std::fs::File::create(format!("logs/{}.log", time)).expect("create log file"),
    );
    let term = simplelog::TermLogger::new(
        log::LevelFilter::Info,
        config.clone(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    );
    simplelog::CombinedLogger::init(vec![term, file]).expect("initialize logger");
}
