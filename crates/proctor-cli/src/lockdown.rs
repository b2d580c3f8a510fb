//! Focus lock for terminal sessions.
//!
//! A terminal cannot grab the screen the way a kiosk shell can. Lockdown
//! here means the session owns stdin and the candidate is told so; leaving
//! early goes through the session's abort path.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;

use proctor_core::traits::FocusLock;

#[derive(Debug, Default)]
pub struct TerminalLock {
    locked: AtomicBool,
}

impl TerminalLock {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FocusLock for TerminalLock {
    async fn enter_lockdown(&self) -> anyhow::Result<()> {
        if !self.locked.swap(true, Ordering::SeqCst) {
            eprintln!("[lockdown] session started; type q to abandon the assessment");
            tracing::info!("terminal lockdown entered");
        }
        Ok(())
    }

    async fn exit_lockdown(&self) -> anyhow::Result<()> {
        if self.locked.swap(false, Ordering::SeqCst) {
            tracing::info!("terminal lockdown released");
        }
        Ok(())
    }

    async fn quit(&self) -> anyhow::Result<()> {
        self.exit_lockdown().await
    }
}
