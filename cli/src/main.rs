mod commands;
mod terminal;

use commands::{CommandLine, Commands, hosts, interfaces, resolve, respond};
use lanshare_common::config::Config;
use lanshare_core::Category;
use terminal::{logging, print};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let commands = CommandLine::parse_args();

    logging::init_logging(commands.verbose, commands.quiet);

    let cfg: Config = commands.to_config();

    let result = match &commands.command {
        Commands::Interfaces => {
            print::header("broadcast targets", cfg.quiet);
            interfaces::interfaces(&cfg)
        }
        Commands::Hosts { json } => {
            if !json {
                print::header("probing local networks", cfg.quiet);
            }
            hosts::hosts(&cfg, *json).await
        }
        Commands::Resolve(args) => {
            if !args.json && args.mount_as.is_none() {
                print::header("resolving share", cfg.quiet);
            }
            resolve::resolve(args, &cfg).await
        }
        Commands::Respond(args) => {
            print::header("node status responder", cfg.quiet);
            respond::respond(args, cfg.port).await
        }
    };

    if let Err(err) = &result
        && let Some(err) = err.downcast_ref::<lanshare_core::Error>()
    {
        match err.category() {
            Category::CheckSharePath => {
                print::print_status("check the share path and the server name")
            }
            Category::Unresolvable => {
                print::print_status("local networking failed, the share cannot be resolved")
            }
        }
    }
    result
}
