use clap::Parser;
use cli::server::ServerArgs;

fn main() {
    let args = ServerArgs::parse();
    cli::init_tracing(args.verbose);
    std::process::exit(cli::server::run(args));
}
