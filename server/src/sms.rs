//! SMS boundary. The OTP flow and matchmaker never speak to a carrier
//! gateway directly — they depend on this trait; a concrete HTTP client for
//! a real SMS provider is out of scope. [`SandboxSmsSender`] logs the
//! message instead of sending it, which is enough for local runs and tests.

use async_trait::async_trait;
use tracing::info;
use wager_core::Result;

#[async_trait]
pub trait SmsSender: Send + Sync {
    async fn send(&self, phone: &str, body: &str) -> Result<()>;
}

pub struct SandboxSmsSender;

#[async_trait]
impl SmsSender for SandboxSmsSender {
    async fn send(&self, phone: &str, body: &str) -> Result<()> {
        info!(phone, body, "sandbox sms dispatched");
        Ok(())
    }
}
