//! CLI subcommand implementations for the veriscope binary.

pub mod capture_cmd;
pub mod doctor;
pub mod serve;

/// Initialize tracing from the environment with a sensible default level.
pub fn init_tracing(verbose: bool) {
    let directive = if verbose {
        "veriscope=debug"
    } else {
        "veriscope=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(directive.parse().unwrap()),
        )
        .init();
}
