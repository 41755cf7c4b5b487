// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
use tracing::error;

pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};
    let _ = fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .compact()
        .try_init();
}

/// Logs a fatal error together with every cause in its chain.
pub fn report_fatal(err: &anyhow::Error) {
    error!("fatal: {err}");
    for cause in err.chain().skip(1) {
        error!("  caused by: {cause}");
    }
}
