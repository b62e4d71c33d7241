pub mod cli;
pub mod config;
pub mod logging;

pub fn main() {
    logging::init();
    if let Err(error) = cli::main() {
        eprintln!("{}", cli::report(&error));
        std::process::exit(1);
    }
}
