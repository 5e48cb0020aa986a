//! Command-line entry point (native).

#[cfg(feature = "native")]
fn main() {
    use clap::Parser;

    env_logger::init();

    let cli = vectra_app::Cli::parse();
    log::debug!("Running {:?}", cli.command);
    match cli.command.execute() {
        Ok(output) => println!("{output}"),
        Err(e) => {
            log::error!("{e}");
            eprintln!("{e}");
            std::process::exit(1);
        }
    }
}

#[cfg(not(feature = "native"))]
fn main() {
    panic!("Native feature not enabled. Use `cargo run --features native`");
}
