use anyhow::Result;
use clap::Parser;
use imfind::Opts;
use imfind::cli::SubCommandExtend;
use imfind::config::SubCommand;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let opts = Opts::parse();
    match &opts.subcmd {
        SubCommand::Index(cmd) => cmd.run(&opts).await,
        SubCommand::Search(cmd) => cmd.run(&opts).await,
        SubCommand::Server(cmd) => cmd.run(&opts).await,
    }
}
