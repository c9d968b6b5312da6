use anyhow::Result;
use clap::Parser;
use log::LevelFilter;

mod cli;
mod commands;

fn init_logging(debug: bool) {
    let env = env_logger::Env::default().default_filter_or("info");
    let mut builder = env_logger::Builder::from_env(env);
    if debug {
        builder.filter_level(LevelFilter::Debug);
    }
    builder.format_timestamp_millis().init();
}

fn main() -> Result<()> {
    let args = cli::Cli::parse();
    init_logging(args.debug);
    match args.cmd {
        cli::Cmd::Info(opts) => commands::info(opts),
        cli::Cmd::Status(opts) => commands::status(opts),
        cli::Cmd::Run(opts) => commands::run(opts),
        cli::Cmd::Send(opts) => commands::send(opts),
    }
}
