use clap::Parser;
use cli::client::ClientArgs;

fn main() {
    let args = ClientArgs::parse();
    cli::init_tracing(args.verbose);
    std::process::exit(cli::client::run(args));
}
