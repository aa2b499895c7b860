use chrono::Local;
use clap::Parser;
use eastwood::cli::{run, Cli};
use env_logger::{Builder, Env};
use std::io::Write;

fn main() -> std::process::ExitCode {
    Builder::from_env(Env::default().default_filter_or("info"))
        .format(|buf, record| {
            writeln!(
                buf,
                "{} [{}] - {}",
                Local::now().format("%Y-%m-%dT%H:%M:%S%z"),
                record.level(),
                record.args()
            )
        })
        .init();

    run(Cli::parse())
}
