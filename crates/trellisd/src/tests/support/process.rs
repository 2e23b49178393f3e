//! Doubles for driving the full daemon launch sequence.

use std::net::TcpListener;
use std::path::Path;
use std::sync::{Arc, Condvar, Mutex, PoisonError};

use camino::Utf8PathBuf;
use trellis_config::Config;

use crate::process::{ShutdownError, ShutdownSignal};

/// Shutdown signal released by [`TestShutdownSignal::trigger`].
#[derive(Debug, Clone, Default)]
pub struct TestShutdownSignal {
    state: Arc<(Mutex<bool>, Condvar)>,
}

impl TestShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// A signal that releases immediately.
    pub fn triggered() -> Self {
        let signal = Self::new();
        signal.trigger();
        signal
    }

    pub fn trigger(&self) {
        let (flag, condvar) = &*self.state;
        *flag.lock().unwrap_or_else(PoisonError::into_inner) = true;
        condvar.notify_all();
    }
}

impl ShutdownSignal for TestShutdownSignal {
    fn wait(&self) -> Result<(), ShutdownError> {
        let (flag, condvar) = &*self.state;
        let mut triggered = flag.lock().unwrap_or_else(PoisonError::into_inner);
        while !*triggered {
            triggered = condvar
                .wait(triggered)
                .unwrap_or_else(PoisonError::into_inner);
        }
        Ok(())
    }
}

/// Reserves a loopback port and releases it for the daemon to bind.
pub fn free_local_address() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind probe listener");
    let address = listener.local_addr().expect("probe address");
    address.to_string()
}

/// Configuration rooted at `data_dir` listening on `listen_address`, with
/// periodic refresh disabled.
pub fn test_config(data_dir: &Path, listen_address: &str) -> Config {
    Config {
        data_dir: Utf8PathBuf::from_path_buf(data_dir.to_path_buf()).expect("utf-8 temp dir"),
        listen_address: listen_address.to_owned(),
        registry_refresh_secs: 0,
        ..Config::default()
    }
}
