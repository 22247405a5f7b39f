//! Main entry point for the stylenet binary.

fn main() {
    if let Err(err) = sn_cli::cli::Cli::parse_args().run() {
        eprintln!("Error: {err:?}");
        std::process::exit(1);
    }
}
