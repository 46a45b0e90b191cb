// Build the native dlib library the bridge links against.
//
// No flags. Exits 0 when the library was built or a previous build exists,
// 1 on any failure.
use marsupial::orchestrator::{BuildConfig, BuildOrchestrator, BuildOutcome};
use std::error::Error;
use std::process;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let outcome = BuildConfig::from_env().and_then(|config| BuildOrchestrator::new(config).run());

    match outcome {
        Ok(BuildOutcome::AlreadyBuilt) => {
            println!("DLib already built");
            process::exit(0);
        }
        Ok(BuildOutcome::Built { artifact }) => {
            println!("DLib built: {}", artifact.display());
            process::exit(0);
        }
        Err(err) => {
            let code = err
                .exit_code()
                .map_or_else(|| "none".to_string(), |c| c.to_string());
            println!("ERROR: {} (code: {})", err, code);

            let mut source = err.source();
            while let Some(cause) = source {
                println!("  caused by: {}", cause);
                source = cause.source();
            }
            println!("{:?}", err);
            process::exit(1);
        }
    }
}
