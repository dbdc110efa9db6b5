mod app;
mod cli;

use tracing::level_filters::LevelFilter;

fn main() {
    let cli = cli::parse();

    let level = if cli.verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::WARN
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    app::run(cli);
}
