//! Cooperative shutdown.
//! The frame loop checks a `CancellationToken` once per iteration; Ctrl-C
//! or SIGTERM cancel it.

use tokio_util::sync::CancellationToken;
use tracing::info;

/// Owns the root token handed to the scheduler.
#[derive(Clone, Default)]
pub struct ShutdownSignal {
    token: CancellationToken,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    /// Cancel the token on SIGINT/SIGTERM. May only be installed once per
    /// process.
    pub fn install_handler(&self) -> Result<(), ctrlc::Error> {
        let token = self.token.clone();
        ctrlc::set_handler(move || {
            info!("shutdown signal received");
            token.cancel();
        })
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}
