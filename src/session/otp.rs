//! OTP collaborator
//!
//! When a backend asks for a one-time passcode, login suspends on an
//! [`OtpPrompter`] until a human supplies a code or gives up. Prompters
//! never time out on their own; the caller bounds the wait.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::oneshot;

use crate::types::{PendingOtp, TenantId};

/// What the prompter is asked
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OtpRequest {
    pub tenant_id: TenantId,
    pub site_name: String,
    pub referer: String,
    pub operator_name: String,
    /// 1 for the first prompt of a login
    pub attempt: u32,
    /// Why the previous code was refused
    pub hint: Option<String>,
}

/// What the prompter answers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OtpOutcome {
    Code(String),
    Canceled,
}

/// Source of OTP codes
#[async_trait]
pub trait OtpPrompter: Send + Sync + std::fmt::Debug {
    async fn prompt(&self, request: OtpRequest) -> OtpOutcome;
}

/// Cancels every prompt; for unattended runs
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledPrompter;

#[async_trait]
impl OtpPrompter for DisabledPrompter {
    async fn prompt(&self, request: OtpRequest) -> OtpOutcome {
        tracing::warn!(
            "{} requires OTP but prompting is disabled",
            request.site_name
        );
        OtpOutcome::Canceled
    }
}

struct PendingEntry {
    seq: u64,
    info: PendingOtp,
    reply: oneshot::Sender<OtpOutcome>,
}

type PendingMap = HashMap<TenantId, PendingEntry>;

/// Prompter answered from outside, typically over the HTTP API.
///
/// Each prompt parks a pending entry per tenant until [`submit`] or
/// [`cancel`] resolves it. Dropping the waiting future withdraws the entry.
///
/// [`submit`]: ChannelPrompter::submit
/// [`cancel`]: ChannelPrompter::cancel
#[derive(Clone, Default)]
pub struct ChannelPrompter {
    pending: Arc<Mutex<PendingMap>>,
    next_seq: Arc<AtomicU64>,
}

impl std::fmt::Debug for ChannelPrompter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelPrompter")
            .field("pending", &self.lock().len())
            .finish()
    }
}

impl ChannelPrompter {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, PendingMap> {
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Prompts currently waiting for an answer
    pub fn pending(&self) -> Vec<PendingOtp> {
        let mut list: Vec<PendingOtp> = self.lock().values().map(|e| e.info.clone()).collect();
        list.sort_by_key(|p| p.tenant_id);
        list
    }

    /// Answer a pending prompt with a code; false if nothing was waiting
    pub fn submit(&self, tenant_id: TenantId, code: impl Into<String>) -> bool {
        self.resolve(tenant_id, OtpOutcome::Code(code.into()))
    }

    /// Cancel a pending prompt; false if nothing was waiting
    pub fn cancel(&self, tenant_id: TenantId) -> bool {
        self.resolve(tenant_id, OtpOutcome::Canceled)
    }

    fn resolve(&self, tenant_id: TenantId, outcome: OtpOutcome) -> bool {
        match self.lock().remove(&tenant_id) {
            Some(entry) => entry.reply.send(outcome).is_ok(),
            None => false,
        }
    }
}

/// Removes the pending entry when the waiting side goes away
struct PendingGuard {
    pending: Arc<Mutex<PendingMap>>,
    tenant_id: TenantId,
    seq: u64,
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        if pending
            .get(&self.tenant_id)
            .is_some_and(|entry| entry.seq == self.seq)
        {
            pending.remove(&self.tenant_id);
        }
    }
}

#[async_trait]
impl OtpPrompter for ChannelPrompter {
    async fn prompt(&self, request: OtpRequest) -> OtpOutcome {
        let (reply, answer) = oneshot::channel();
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let info = PendingOtp {
            tenant_id: request.tenant_id,
            site_name: request.site_name.clone(),
            referer: request.referer.clone(),
            operator_name: request.operator_name.clone(),
            attempt: request.attempt,
            hint: request.hint.clone(),
            requested_at: Utc::now(),
        };

        // A newer prompt for the same tenant supersedes the old one, whose
        // receiver then sees a closed channel and cancels.
        self.lock()
            .insert(request.tenant_id, PendingEntry { seq, info, reply });
        tracing::info!(
            "Waiting for OTP for {} (attempt {})",
            request.site_name,
            request.attempt
        );

        let guard = PendingGuard {
            pending: self.pending.clone(),
            tenant_id: request.tenant_id,
            seq,
        };
        let outcome = answer.await.unwrap_or(OtpOutcome::Canceled);
        drop(guard);
        outcome
    }
}

/// Prompts on the terminal.
///
/// Concurrent prompts are asked one at a time.
#[derive(Debug, Default)]
pub struct TerminalPrompter {
    stdin: tokio::sync::Mutex<()>,
}

impl TerminalPrompter {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OtpPrompter for TerminalPrompter {
    async fn prompt(&self, request: OtpRequest) -> OtpOutcome {
        let _turn = self.stdin.lock().await;

        let mut stderr = tokio::io::stderr();
        let mut message = String::new();
        if let Some(hint) = &request.hint {
            message.push_str(&format!("{}\n", hint));
        }
        message.push_str(&format!(
            "OTP code for {} ({}), empty line to cancel: ",
            request.site_name, request.operator_name
        ));
        if stderr.write_all(message.as_bytes()).await.is_err() {
            return OtpOutcome::Canceled;
        }
        let _ = stderr.flush().await;

        let mut line = String::new();
        let mut reader = BufReader::new(tokio::io::stdin());
        match reader.read_line(&mut line).await {
            Ok(0) | Err(_) => OtpOutcome::Canceled,
            Ok(_) => match line.trim() {
                "" => OtpOutcome::Canceled,
                code => OtpOutcome::Code(code.to_string()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn request(tenant_id: TenantId) -> OtpRequest {
        OtpRequest {
            tenant_id,
            site_name: "PG688".to_string(),
            referer: "https://pg688.example".to_string(),
            operator_name: "ops".to_string(),
            attempt: 1,
            hint: None,
        }
    }

    async fn wait_for_pending(prompter: &ChannelPrompter, tenant_id: TenantId) {
        for _ in 0..100 {
            if prompter.pending().iter().any(|p| p.tenant_id == tenant_id) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("prompt for tenant {tenant_id} never became pending");
    }

    #[tokio::test]
    async fn test_disabled_prompter_cancels() {
        assert_eq!(
            DisabledPrompter.prompt(request(1)).await,
            OtpOutcome::Canceled
        );
    }

    #[tokio::test]
    async fn test_channel_prompter_submit() {
        let prompter = ChannelPrompter::new();
        let waiting = {
            let prompter = prompter.clone();
            tokio::spawn(async move { prompter.prompt(request(1)).await })
        };

        wait_for_pending(&prompter, 1).await;
        let listed = prompter.pending();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].site_name, "PG688");

        assert!(prompter.submit(1, "123456"));
        assert_eq!(
            waiting.await.unwrap(),
            OtpOutcome::Code("123456".to_string())
        );
        assert!(prompter.pending().is_empty());
    }

    #[tokio::test]
    async fn test_channel_prompter_cancel() {
        let prompter = ChannelPrompter::new();
        let waiting = {
            let prompter = prompter.clone();
            tokio::spawn(async move { prompter.prompt(request(4)).await })
        };

        wait_for_pending(&prompter, 4).await;
        assert!(prompter.cancel(4));
        assert_eq!(waiting.await.unwrap(), OtpOutcome::Canceled);
    }

    #[tokio::test]
    async fn test_resolve_without_pending_prompt() {
        let prompter = ChannelPrompter::new();
        assert!(!prompter.submit(9, "000000"));
        assert!(!prompter.cancel(9));
    }

    #[tokio::test]
    async fn test_abandoned_prompt_is_withdrawn() {
        let prompter = ChannelPrompter::new();
        let result =
            tokio::time::timeout(Duration::from_millis(20), prompter.prompt(request(2))).await;
        assert!(result.is_err());
        assert!(prompter.pending().is_empty());
    }

    #[tokio::test]
    async fn test_pending_prompts_are_independent() {
        let prompter = ChannelPrompter::new();
        let first = {
            let prompter = prompter.clone();
            tokio::spawn(async move { prompter.prompt(request(1)).await })
        };
        let second = {
            let prompter = prompter.clone();
            tokio::spawn(async move { prompter.prompt(request(2)).await })
        };

        wait_for_pending(&prompter, 1).await;
        wait_for_pending(&prompter, 2).await;

        assert!(prompter.submit(2, "222222"));
        assert_eq!(
            second.await.unwrap(),
            OtpOutcome::Code("222222".to_string())
        );
        assert_eq!(prompter.pending().len(), 1);

        assert!(prompter.cancel(1));
        assert_eq!(first.await.unwrap(), OtpOutcome::Canceled);
    }
}
