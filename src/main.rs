mod app;

use std::env;

use tiny_raster::config::{Params, USAGE};
use tiny_raster::logging::{init_logging, LoggingConfig};

#[cfg_attr(feature = "preview", show_image::main)]
fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().skip(1).collect();
    if args.iter().any(|arg| arg == "-h" || arg == "--help") {
        println!("{}", USAGE);
        return Ok(());
    }

    let params = match Params::from_args(args) {
        Ok(params) => params,
        Err(e) => {
            eprintln!("{}\n{}", e, USAGE);
            std::process::exit(2);
        }
    };
    init_logging(LoggingConfig { filter: None, verbose: params.verbose });

    app::run(params)?;

    return Ok(());
}
