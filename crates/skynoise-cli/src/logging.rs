//! Subscriber setup for the command line tool.

use tracing_subscriber::filter::ParseError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_DIRECTIVES: [&str; 3] = ["skynoise=info", "skynoise_core=info", "skynoise_cli=info"];

/// `RUST_LOG` plus info-level output from every skynoise crate.
pub fn env_filter() -> Result<EnvFilter, ParseError> {
    let mut filter = EnvFilter::from_default_env();
    for directive in DEFAULT_DIRECTIVES {
        filter = filter.add_directive(directive.parse()?);
    }
    Ok(filter)
}

pub fn init() -> Result<(), ParseError> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(env_filter()?)
        .init();
    Ok(())
}
