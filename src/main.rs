use clap::Parser;
use docs2pdf::cli;
use tracing::error;

fn main() {
    let args = cli::Args::parse();
    match cli::dispatch(args) {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            error!("{:#}", err);
            std::process::exit(1);
        }
    }
}
